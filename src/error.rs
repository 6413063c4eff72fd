//! Error types for the ingestion client

/// Errors returned by [`crate::BmeClient`] and its helpers
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed call or construction parameters. Raised before any I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The token endpoint rejected the credentials
    #[error("unable to authenticate: status {status}")]
    PermanentAuth { status: u16 },

    /// Server-side failure worth retrying
    #[error("transient failure: {0}")]
    Transient(String),

    /// The server answered 200 but the body was not what the protocol expects
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Request body could not be encoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Connection, timeout or other transport-level failure
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl Error {
    /// Whether the retry loop may try the operation again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient(_) | Error::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Transient("503".into()).is_retryable());
        assert!(!Error::PermanentAuth { status: 401 }.is_retryable());
        assert!(!Error::Protocol("invalid response body".into()).is_retryable());
        assert!(!Error::InvalidArgument("port".into()).is_retryable());
        let encode_err = serde_json::from_str::<u8>("x").unwrap_err();
        assert!(!Error::from(encode_err).is_retryable());
    }

    #[test]
    fn test_display() {
        let e = Error::PermanentAuth { status: 403 };
        assert_eq!(e.to_string(), "unable to authenticate: status 403");
    }
}
