//! Bearer token cache
//!
//! Tokens are obtained from `POST /api/tokens` with HTTP Basic credentials
//! and live for one hour on the server. The cached copy is treated as stale
//! one request timeout early, so a request started just before expiry
//! still completes with a valid token.

use super::types::TokenResponse;
use crate::error::{Error, Result};
use base64::Engine;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Server-side token lifetime
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
struct AuthToken {
    value: String,
    valid_until: Instant,
}

/// Owns the single cached token and its validity window
pub struct TokenManager {
    token_url: String,
    username: String,
    password: String,
    timeout: Duration,
    cached: Option<AuthToken>,
}

impl TokenManager {
    pub fn new(token_url: String, username: String, password: String, timeout: Duration) -> Self {
        Self {
            token_url,
            username,
            password,
            timeout,
            cached: None,
        }
    }

    /// Return a token that is valid now, authenticating only if needed
    pub async fn ensure_token(&mut self, http: &Client) -> Result<String> {
        if let Some(token) = self.current() {
            return Ok(token.to_string());
        }
        if self.cached.is_some() {
            info!("renewing auth token");
        }

        let start = Instant::now();
        let resp = http
            .post(&self.token_url)
            .timeout(self.timeout)
            .header(
                AUTHORIZATION,
                basic_credentials(&self.username, &self.password),
            )
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        debug!("token response {}: {}", status, body);

        if status.as_u16() != 200 {
            if status.is_server_error() {
                return Err(Error::Transient(format!(
                    "unable to authenticate: {}",
                    status.as_u16()
                )));
            }
            return Err(Error::PermanentAuth {
                status: status.as_u16(),
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            error!("invalid body: {}", body);
            Error::Protocol(format!("invalid response body: {}", e))
        })?;

        let valid_until = expiry(start, self.timeout);
        let wall_clock = chrono::Utc::now()
            + chrono::Duration::from_std(valid_until.saturating_duration_since(Instant::now()))
                .unwrap_or_else(|_| chrono::Duration::zero());
        info!("the token will expire at: {}", wall_clock.to_rfc3339());

        self.cached = Some(AuthToken {
            value: parsed.token.clone(),
            valid_until,
        });
        Ok(parsed.token)
    }

    /// Drop the cached token if it is still the one the server rejected
    ///
    /// A token refreshed by another upload in the meantime is kept.
    pub fn invalidate(&mut self, rejected: &str) {
        if self.cached.as_ref().is_some_and(|t| t.value == rejected) {
            self.cached = None;
        }
    }

    /// The cached token, if it is not yet stale
    fn current(&self) -> Option<&str> {
        self.cached
            .as_ref()
            .filter(|t| Instant::now() < t.valid_until)
            .map(|t| t.value.as_str())
    }
}

/// `Basic base64(username:password)`
pub fn basic_credentials(username: &str, password: &str) -> String {
    let encoded =
        base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", username, password));
    format!("Basic {}", encoded)
}

/// The instant a token requested at `start` stops being used
fn expiry(start: Instant, timeout: Duration) -> Instant {
    start + TOKEN_LIFETIME.saturating_sub(timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Nothing listens on port 1, so any network attempt fails fast.
    fn manager() -> TokenManager {
        TokenManager::new(
            "http://127.0.0.1:1/api/tokens".to_string(),
            "user".to_string(),
            "pass".to_string(),
            Duration::from_secs(10),
        )
    }

    #[test]
    fn test_basic_credentials() {
        assert_eq!(basic_credentials("user", "pass"), "Basic dXNlcjpwYXNz");
        assert_eq!(
            basic_credentials("Aladdin", "open sesame"),
            "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ=="
        );
    }

    #[test]
    fn test_expiry_subtracts_timeout() {
        let start = Instant::now();
        let until = expiry(start, Duration::from_secs(10));
        assert_eq!(until - start, Duration::from_secs(3590));
    }

    #[tokio::test]
    async fn test_cached_token_is_reused() {
        let mut tokens = manager();
        tokens.cached = Some(AuthToken {
            value: "cached".to_string(),
            valid_until: Instant::now() + Duration::from_secs(60),
        });
        assert_eq!(tokens.current(), Some("cached"));

        let token = tokens.ensure_token(&Client::new()).await.unwrap();
        assert_eq!(token, "cached");
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed() {
        let mut tokens = manager();
        tokens.cached = Some(AuthToken {
            value: "stale".to_string(),
            valid_until: Instant::now(),
        });
        assert_eq!(tokens.current(), None);

        // The refresh hits the network, which is unreachable here.
        let result = tokens.ensure_token(&Client::new()).await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[test]
    fn test_invalidate() {
        let mut tokens = manager();
        tokens.cached = Some(AuthToken {
            value: "abc".to_string(),
            valid_until: Instant::now() + Duration::from_secs(60),
        });
        tokens.invalidate("abc");
        assert_eq!(tokens.current(), None);
        assert!(tokens.cached.is_none());
    }

    #[test]
    fn test_invalidate_keeps_newer_token() {
        let mut tokens = manager();
        tokens.cached = Some(AuthToken {
            value: "fresh".to_string(),
            valid_until: Instant::now() + Duration::from_secs(60),
        });
        // A 401 for a token that was already replaced must not drop the new one.
        tokens.invalidate("old");
        assert_eq!(tokens.current(), Some("fresh"));
    }
}
