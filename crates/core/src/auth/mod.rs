mod none;
mod shared_secret;
mod traits;

pub use none::*;
pub use shared_secret::*;
pub use traits::*;

use crate::config::{AuthConfig, AuthMethod};

/// Factory function to create authenticator from config
pub fn create_authenticator(config: &AuthConfig) -> Result<Box<dyn Authenticator>, AuthError> {
    match config.method {
        AuthMethod::None => Ok(Box::new(NoneAuthenticator::new())),
        AuthMethod::SharedSecret => {
            let secret = config
                .secret
                .clone()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    AuthError::ConfigurationError(
                        "secret must be set when using shared_secret auth method".to_string(),
                    )
                })?;
            Ok(Box::new(SharedSecretAuthenticator::new(
                secret,
                &config.header,
            )))
        }
    }
}
