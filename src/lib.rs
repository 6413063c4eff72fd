//! BME ingestion client
//!
//! Uploads batches of raw satellite telemetry packets to a remote
//! ingestion API. Authentication uses short-lived bearer tokens obtained
//! with HTTP Basic credentials; tokens are cached until shortly before
//! they expire.
//!
//! ```no_run
//! # async fn run() -> anyhow::Result<()> {
//! use bme_client::{BmeClient, BmeConfig, Satellite};
//!
//! let config = BmeConfig::load(std::path::Path::new("bme.toml"))?;
//! let client = BmeClient::new(config)?;
//! client
//!     .upload_batch(Satellite::Smogp, &[vec![0xca, 0xfe]])
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod bme;
pub mod config;
pub mod error;

pub use bme::types::Satellite;
pub use bme::BmeClient;
pub use config::BmeConfig;
pub use error::{Error, Result};
