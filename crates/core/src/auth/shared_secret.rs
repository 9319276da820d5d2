//! Shared-secret authentication for tick triggers.

use async_trait::async_trait;

use super::{AuthError, AuthRequest, Authenticator, Identity};

/// Accepts triggers presenting the configured secret.
///
/// The secret is read from either:
/// - the configured header (default `x-cron-secret`)
/// - `Authorization: Bearer <secret>`
pub struct SharedSecretAuthenticator {
    secret: String,
    header: String,
}

impl SharedSecretAuthenticator {
    pub fn new(secret: String, header: &str) -> Self {
        Self {
            secret,
            header: header.to_ascii_lowercase(),
        }
    }

    fn extract_secret<'a>(&self, request: &'a AuthRequest) -> Option<&'a str> {
        if let Some(value) = request.headers.get(&self.header) {
            return Some(value.as_str());
        }

        let auth_header = request.headers.get("authorization")?;
        auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
    }
}

#[async_trait]
impl Authenticator for SharedSecretAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        let provided = self
            .extract_secret(request)
            .ok_or(AuthError::NotAuthenticated)?;

        if constant_time_eq(provided.as_bytes(), self.secret.as_bytes()) {
            Ok(Identity {
                caller: format!("trigger@{}", request.source_ip),
                method: "shared_secret".to_string(),
            })
        } else {
            Err(AuthError::InvalidCredentials("Invalid secret".to_string()))
        }
    }

    fn method_name(&self) -> &'static str {
        "shared_secret"
    }
}

/// Byte comparison whose duration does not depend on where inputs differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(headers: Vec<(&str, &str)>) -> AuthRequest {
        AuthRequest {
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v.to_string()))
                .collect(),
            source_ip: [127, 0, 0, 1].into(),
        }
    }

    fn authenticator() -> SharedSecretAuthenticator {
        SharedSecretAuthenticator::new("cron-secret".to_string(), "X-Cron-Secret")
    }

    #[tokio::test]
    async fn test_configured_header() {
        let request = make_request(vec![("X-Cron-Secret", "cron-secret")]);

        let identity = authenticator().authenticate(&request).await.unwrap();

        assert_eq!(identity.method, "shared_secret");
        assert_eq!(identity.caller, "trigger@127.0.0.1");
    }

    #[tokio::test]
    async fn test_bearer_token() {
        for value in ["Bearer cron-secret", "bearer cron-secret"] {
            let request = make_request(vec![("Authorization", value)]);
            assert!(authenticator().authenticate(&request).await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_wrong_secret() {
        let request = make_request(vec![("x-cron-secret", "guess")]);

        let result = authenticator().authenticate(&request).await;

        assert!(matches!(result, Err(AuthError::InvalidCredentials(_))));
    }

    #[tokio::test]
    async fn test_missing_secret() {
        let request = make_request(vec![("x-api-key", "cron-secret")]);

        let result = authenticator().authenticate(&request).await;

        assert!(matches!(result, Err(AuthError::NotAuthenticated)));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secre"));
        assert!(constant_time_eq(b"", b""));
    }
}
