//! Batch uploader for the BME ingestion API
//!
//! Packets are sent in chunks of at most [`MAX_BATCH_SIZE`] to
//! `POST /api/packets/bulk`, each authorized with a bearer token from
//! [`TokenManager`].
//!
//! ## Status handling on upload
//! - `200`: chunk delivered
//! - `401`: token expired mid-flight. Drop it, re-authenticate and resend
//!   immediately. Does not count as a retry.
//! - `400`: the server will never accept this chunk. Logged and skipped,
//!   the rest of the batch continues.
//! - anything else, or a transport failure: retried up to [`RETRIES`] times
//!   with the configured delay between attempts.

pub mod token;
pub mod types;

use crate::config::BmeConfig;
use crate::error::{Error, Result};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

pub use token::TokenManager;
pub use types::{Satellite, MAX_BATCH_SIZE};

/// Retries allowed after the first attempt of a chunk
pub const RETRIES: u32 = 3;

/// Sent on every request
pub const USER_AGENT: &str = concat!("bme-client/", env!("CARGO_PKG_VERSION"));

/// Result of a single bulk POST that did not fail outright
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    Accepted,
    /// 400: permanently refused, do not resend
    Rejected,
    /// 401: bearer token no longer accepted
    TokenExpired,
}

/// How the retry loop for one chunk ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkResult {
    Delivered,
    Cancelled,
}

/// States of the per-chunk retry loop
#[derive(Debug)]
enum UploadState {
    Authenticating,
    Sending(String),
    Sleeping(Error),
    Done,
    Failed(Error),
}

/// Client for the BME ingestion API
///
/// Cheap to share by reference: uploads take `&self`, and the token cache
/// is guarded by a single lock so concurrent uploads never race on
/// refresh or invalidation.
pub struct BmeClient {
    http: Client,
    tokens: Mutex<TokenManager>,
    bulk_url: String,
    timeout: Duration,
    retry_delay: Duration,
    cancel: CancellationToken,
}

impl BmeClient {
    pub fn new(config: BmeConfig) -> Result<Self> {
        config.validate()?;

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(config.timeout())
            .build()?;

        let base = config.base_url();
        let tokens = TokenManager::new(
            format!("{}/api/tokens", base),
            config.username.clone(),
            config.password.clone(),
            config.timeout(),
        );

        info!("BME client created for {}", base);

        Ok(Self {
            http,
            tokens: Mutex::new(tokens),
            bulk_url: format!("{}/api/packets/bulk", base),
            timeout: config.timeout(),
            retry_delay: config.retry_delay(),
            cancel: CancellationToken::new(),
        })
    }

    /// Use an externally owned token to stop uploads, e.g. a shutdown signal
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle that stops in-progress and future uploads when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Upload all packets for one satellite
    ///
    /// Chunks are sent strictly in order. The first chunk that fails
    /// aborts the rest. Returns `Ok(())` without sending anything further
    /// if the client is cancelled.
    pub async fn upload_batch<P: AsRef<[u8]>>(
        &self,
        satellite: Satellite,
        packets: &[P],
    ) -> Result<()> {
        trace!("uploading: {} number of packets: {}", satellite, packets.len());
        if packets.is_empty() {
            return Ok(());
        }

        for chunk in packets.chunks(MAX_BATCH_SIZE) {
            if self.upload_chunk_with_retry(satellite, chunk).await? == ChunkResult::Cancelled {
                break;
            }
        }
        Ok(())
    }

    async fn upload_chunk_with_retry<P: AsRef<[u8]>>(
        &self,
        satellite: Satellite,
        chunk: &[P],
    ) -> Result<ChunkResult> {
        let body = types::serialize_chunk(satellite, chunk)?;
        debug!("request: {}", body);

        let mut attempt = 0u32;
        let mut state = UploadState::Authenticating;

        loop {
            if self.cancel.is_cancelled() {
                info!("upload of {} cancelled", satellite);
                return Ok(ChunkResult::Cancelled);
            }

            state = match state {
                UploadState::Authenticating => {
                    let token = tokio::select! {
                        _ = self.cancel.cancelled() => {
                            info!("authentication interrupted. exit");
                            return Ok(ChunkResult::Cancelled);
                        }
                        token = self.authenticate() => token,
                    };
                    match token {
                        Ok(token) => UploadState::Sending(token),
                        Err(e) if e.is_retryable() => UploadState::Sleeping(e),
                        Err(e) => UploadState::Failed(e),
                    }
                }
                UploadState::Sending(token) => {
                    let outcome = tokio::select! {
                        _ = self.cancel.cancelled() => {
                            info!("upload interrupted. exit");
                            return Ok(ChunkResult::Cancelled);
                        }
                        outcome = self.send_chunk(&body, &token) => outcome,
                    };
                    match outcome {
                        Ok(ChunkOutcome::Accepted) | Ok(ChunkOutcome::Rejected) => {
                            UploadState::Done
                        }
                        Ok(ChunkOutcome::TokenExpired) => {
                            info!("token expired. retry");
                            self.tokens.lock().await.invalidate(&token);
                            UploadState::Authenticating
                        }
                        Err(e) if e.is_retryable() => UploadState::Sleeping(e),
                        Err(e) => UploadState::Failed(e),
                    }
                }
                UploadState::Sleeping(e) => {
                    if attempt >= RETRIES {
                        warn!(
                            "unable to upload: {} after {} retries: {}",
                            satellite, RETRIES, e
                        );
                        UploadState::Failed(e)
                    } else {
                        attempt += 1;
                        info!(
                            "unable to upload: {} retry...{} error {}",
                            satellite, attempt, e
                        );
                        tokio::select! {
                            _ = self.cancel.cancelled() => {
                                info!("sleep interrupted. exit");
                                return Ok(ChunkResult::Cancelled);
                            }
                            _ = tokio::time::sleep(self.retry_delay) => UploadState::Authenticating,
                        }
                    }
                }
                UploadState::Done => return Ok(ChunkResult::Delivered),
                UploadState::Failed(e) => return Err(e),
            };
        }
    }

    async fn authenticate(&self) -> Result<String> {
        let mut tokens = self.tokens.lock().await;
        tokens.ensure_token(&self.http).await
    }

    /// POST one serialized chunk with the given bearer token
    pub async fn send_chunk(&self, body: &str, token: &str) -> Result<ChunkOutcome> {
        let resp = self
            .http
            .post(&self.bulk_url)
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .body(body.to_string())
            .send()
            .await?;

        let status = resp.status();
        let response_body = resp.text().await?;
        debug!("response: {}", response_body);

        match status.as_u16() {
            200 => Ok(ChunkOutcome::Accepted),
            401 => Ok(ChunkOutcome::TokenExpired),
            400 => {
                error!("invalid request. response: {}", response_body);
                Ok(ChunkOutcome::Rejected)
            }
            code => Err(Error::Transient(format!("invalid response code: {}", code))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BmeConfig {
        BmeConfig {
            host: "http://localhost".to_string(),
            port: 8000,
            timeout_ms: 1000,
            retry_delay_ms: 0,
            username: "user".to_string(),
            password: "pass".to_string(),
        }
    }

    #[test]
    fn test_client_creation() {
        let client = BmeClient::new(config()).unwrap();
        assert_eq!(client.bulk_url, "http://localhost:8000/api/packets/bulk");
        assert_eq!(client.timeout, Duration::from_secs(1));
        assert!(!client.cancellation_token().is_cancelled());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut c = config();
        c.port = 0;
        assert!(matches!(BmeClient::new(c), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_user_agent() {
        assert!(USER_AGENT.starts_with("bme-client/"));
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_requests() {
        // localhost:8000 is not expected to answer; an empty batch never asks.
        let client = BmeClient::new(config()).unwrap();
        let packets: Vec<Vec<u8>> = Vec::new();
        client.upload_batch(Satellite::Smogp, &packets).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_client_sends_nothing() {
        let cancel = CancellationToken::new();
        let client = BmeClient::new(config()).unwrap().with_cancellation(cancel.clone());
        cancel.cancel();
        client
            .upload_batch(Satellite::Smogp, &[vec![0xca, 0xfe]])
            .await
            .unwrap();
    }
}
