use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::scheduler::SchedulerConfig;
use crate::steps::PipelineTemplate;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub provider: ProviderConfig,
    /// Pipeline templates (`[[pipelines]]`).
    #[serde(default)]
    pub pipelines: Vec<PipelineTemplate>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Authentication of tick triggers
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    /// Shared secret expected from triggers (required for `shared_secret`).
    #[serde(default)]
    pub secret: Option<String>,
    /// Header carrying the secret. `Authorization: Bearer` is accepted too.
    #[serde(default = "default_secret_header")]
    pub header: String,
}

fn default_secret_header() -> String {
    "x-cron-secret".to_string()
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    SharedSecret,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::None => "none",
            AuthMethod::SharedSecret => "shared_secret",
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("stepline.db")
}

/// Execution provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Provider base URL (e.g., "https://provider.example")
    pub url: String,
    /// Bearer token sent with every call
    #[serde(default)]
    pub api_token: String,
    /// HTTP request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

fn default_timeout() -> u32 {
    30
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub provider: SanitizedProviderConfig,
    pub pipelines: Vec<SanitizedPipeline>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: String,
    pub header: String,
    pub secret_configured: bool,
}

/// Sanitized provider config (token hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedProviderConfig {
    pub url: String,
    pub api_token_configured: bool,
    pub timeout_secs: u32,
}

/// Template name and step methods; step parameters are left out.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedPipeline {
    pub name: String,
    pub steps: Vec<String>,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            auth: SanitizedAuthConfig {
                method: config.auth.method.as_str().to_string(),
                header: config.auth.header.clone(),
                secret_configured: config
                    .auth
                    .secret
                    .as_ref()
                    .is_some_and(|s| !s.is_empty()),
            },
            server: config.server.clone(),
            database: config.database.clone(),
            scheduler: config.scheduler.clone(),
            provider: SanitizedProviderConfig {
                url: config.provider.url.clone(),
                api_token_configured: !config.provider.api_token.is_empty(),
                timeout_secs: config.provider.timeout_secs,
            },
            pipelines: config
                .pipelines
                .iter()
                .map(|p| SanitizedPipeline {
                    name: p.name.clone(),
                    steps: p.steps.iter().map(|s| s.method.clone()).collect(),
                })
                .collect(),
        }
    }
}
