use std::collections::HashSet;

use super::{
    types::{AuthMethod, Config},
    ConfigError,
};

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Shared-secret auth has a secret
/// - Scheduler limits and intervals are positive
/// - Provider URL is set
/// - Pipeline templates are non-empty and uniquely named
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    if config.auth.method == AuthMethod::SharedSecret
        && config.auth.secret.as_deref().unwrap_or("").is_empty()
    {
        return Err(invalid(
            "auth.secret must be set when using shared_secret auth method",
        ));
    }
    if config.auth.header.trim().is_empty() {
        return Err(invalid("auth.header cannot be empty"));
    }

    let scheduler = &config.scheduler;
    if scheduler.max_concurrent_jobs == 0 {
        return Err(invalid("scheduler.max_concurrent_jobs must be at least 1"));
    }
    if scheduler.job_timeout_minutes == 0 {
        return Err(invalid("scheduler.job_timeout_minutes must be at least 1"));
    }
    if scheduler.tick_interval_ms == 0 {
        return Err(invalid("scheduler.tick_interval_ms cannot be 0"));
    }
    if scheduler.lease_ttl_secs == 0 {
        return Err(invalid("scheduler.lease_ttl_secs cannot be 0"));
    }
    if scheduler.provider_call_timeout_secs == 0 {
        return Err(invalid("scheduler.provider_call_timeout_secs cannot be 0"));
    }

    if config.provider.url.trim().is_empty() {
        return Err(invalid("provider.url cannot be empty"));
    }

    let mut names = HashSet::new();
    for template in &config.pipelines {
        if template.steps.is_empty() {
            return Err(invalid(format!(
                "pipeline '{}' must have at least one step",
                template.name
            )));
        }
        if template.steps.iter().any(|s| s.method.trim().is_empty()) {
            return Err(invalid(format!(
                "pipeline '{}' has a step without a method",
                template.name
            )));
        }
        if !names.insert(template.name.as_str()) {
            return Err(invalid(format!(
                "duplicate pipeline name '{}'",
                template.name
            )));
        }
    }

    Ok(())
}
