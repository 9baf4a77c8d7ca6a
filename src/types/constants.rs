/// Inbound fields meaningful only to the local UI (magic strings layer).
///
/// Anything listed here is stripped from a message before it is forwarded
/// upstream. The upstream endpoint rejects unknown fields, so the strip
/// list is the auditable pass-through contract of the relay.
pub const INTERNAL_FIELDS: [&str; 1] = ["isProcessing"];

/// Event tag used for error frames sent back to the client.
pub const ERROR_EVENT: &str = "error";

/// Error `type` values carried inside an error frame.
pub mod error_types {
    pub const INVALID_REQUEST: &str = "invalid_request_error";
    pub const RELAY_ERROR: &str = "relay_error";
}

/// Error `code` values carried inside an error frame.
pub mod error_codes {
    pub const PROCESSING: &str = "processing_error";
    pub const NOT_CONNECTED: &str = "not_connected";
    pub const QUEUE_OVERFLOW: &str = "queue_overflow";
    pub const PROVIDER_UNAVAILABLE: &str = "provider_unavailable";
    pub const UPSTREAM_REJECTED: &str = "upstream_rejected";
}

/// Query parameter a client may use to bring its own ephemeral credential.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Header advertising the realtime beta surface on upstream connects.
pub const BETA_HEADER_NAME: &str = "openai-beta";
pub const BETA_HEADER_VALUE: &str = "realtime=v1";

/// Default bound on the per-session delivery queue.
pub const DEFAULT_QUEUE_BOUND: usize = 256;

/// Default listen address for the relay server.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3001";

/// Default upstream realtime endpoint.
pub const DEFAULT_UPSTREAM_URL: &str = "wss://api.openai.com/v1/realtime";

/// Default endpoint for minting ephemeral session credentials.
pub const DEFAULT_SESSIONS_URL: &str = "https://api.openai.com/v1/realtime/sessions";

/// Default model and voice identifiers.
pub const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview";
pub const DEFAULT_VOICE: &str = "verse";
