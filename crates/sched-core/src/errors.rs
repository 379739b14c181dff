use std::time::Duration;

/// Failure modes of a single outbound SMS send.
///
/// Every variant is terminal for that one send: broadcasts are best effort,
/// so nothing here is retried.
#[derive(Clone, Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("invalid gateway configuration: {0}")]
    Config(String),
}

impl GatewayError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Rejected { status, .. } if (400..500).contains(status) => "client_rejected",
            Self::Rejected { .. } => "server_rejected",
            Self::Network(_) => "network_error",
            Self::Timeout(_) => "timeout",
            Self::Config(_) => "config",
        }
    }

    /// HTTP status returned by the provider, if the request got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn from_status(status: u16, body: String) -> Self {
        Self::Rejected { status, body }
    }
}
