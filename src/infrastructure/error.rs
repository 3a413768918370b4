//! Transport-level errors raised by object sources

use thiserror::Error;

/// A remote query could not be completed.
///
/// Distinct from an empty result: "no children" is `Ok(vec![])`, never an
/// error. Every variant may be retried at the caller's discretion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("network failure: {message}")]
    Network { message: String },

    #[error("request rejected as unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("rate limited by remote endpoint")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("remote error {code}: {message}")]
    Remote { code: u16, message: String },

    #[error("cannot decode response: {message}")]
    Decode { message: String },
}

impl TransportError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn remote(code: u16, message: impl Into<String>) -> Self {
        Self::Remote {
            code,
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// True when an immediate retry can plausibly succeed without intervention.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::RateLimited { .. } | Self::Remote { .. }
        )
    }
}

/// Result type for object source operations.
pub type TransportResult<T> = Result<T, TransportError>;
