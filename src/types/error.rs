use super::constants::error_codes;
use thiserror::Error;

/// Errors that can occur while relaying a session.
#[derive(Error, Debug)]
pub enum RelayError {
    /// WebSocket protocol error on either transport
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Malformed inbound frame (recovered locally, surfaced as an error frame)
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Send attempted on a transport that is not open
    #[error("not connected")]
    NotConnected,

    /// Delivery queue bound exceeded (fatal to the session)
    #[error("delivery queue overflow (bound {0})")]
    QueueOverflow(usize),

    /// Credential fetch failed (fatal before any upstream transport opens)
    #[error("token provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Upstream handshake failed (fatal to session start)
    #[error("upstream rejected handshake: {0}")]
    UpstreamRejected(String),

    /// URL parsing error (malformed endpoint URL)
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error (bind, accept)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Stable code carried in error frames sent back to the client.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Parse(_) => error_codes::PROCESSING,
            Self::NotConnected => error_codes::NOT_CONNECTED,
            Self::QueueOverflow(_) => error_codes::QUEUE_OVERFLOW,
            Self::ProviderUnavailable(_) => error_codes::PROVIDER_UNAVAILABLE,
            Self::UpstreamRejected(_) => error_codes::UPSTREAM_REJECTED,
            _ => error_codes::PROCESSING,
        }
    }
}

/// Convenience type alias for `Result<T, RelayError>`.
pub type Result<T> = std::result::Result<T, RelayError>;
