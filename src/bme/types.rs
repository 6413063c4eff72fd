//! Wire types for the BME ingestion API

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum number of packets sent in one bulk request
pub const MAX_BATCH_SIZE: usize = 30;

/// Satellites the ingestion API accepts packets for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Satellite {
    Smogp,
    Atl1,
    Smog1,
    Mrc100,
}

impl Satellite {
    /// Lowercase name used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Satellite::Smogp => "smogp",
            Satellite::Atl1 => "atl1",
            Satellite::Smog1 => "smog1",
            Satellite::Mrc100 => "mrc100",
        }
    }
}

impl fmt::Display for Satellite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Satellite {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "smogp" => Ok(Satellite::Smogp),
            "atl1" => Ok(Satellite::Atl1),
            "smog1" => Ok(Satellite::Smog1),
            "mrc100" => Ok(Satellite::Mrc100),
            _ => Err(Error::InvalidArgument(format!("unknown satellite: {}", s))),
        }
    }
}

/// One packet entry of a bulk upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketRecord {
    pub satellite: Satellite,
    /// Packet bytes, lowercase hex encoded
    pub packet: String,
}

/// Body of `POST /api/packets/bulk`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkUpload {
    pub packets: Vec<PacketRecord>,
}

impl BulkUpload {
    pub fn new<P: AsRef<[u8]>>(satellite: Satellite, chunk: &[P]) -> Self {
        let packets = chunk
            .iter()
            .map(|p| PacketRecord {
                satellite,
                packet: hex::encode(p.as_ref()),
            })
            .collect();
        Self { packets }
    }
}

/// Body of a successful `POST /api/tokens`
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Serialize one chunk into the bulk upload JSON body
pub fn serialize_chunk<P: AsRef<[u8]>>(satellite: Satellite, chunk: &[P]) -> Result<String> {
    Ok(serde_json::to_string(&BulkUpload::new(satellite, chunk))?)
}
