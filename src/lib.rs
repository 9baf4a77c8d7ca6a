//! # realtime-relay
//!
//! A WebSocket relay pairing voice UI clients with a third-party realtime
//! speech endpoint. Each accepted client connection becomes one session
//! with its own outbound upstream connection, a bounded FIFO delivery
//! queue for frames sent before the upstream is ready, and paired
//! teardown: either side closing closes the other.
//!
//! ## Example
//!
//! ```no_run
//! use realtime_relay::{RelayConfig, RelayServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RelayConfig::from_env()?;
//!     let server = RelayServer::bind(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod infrastructure;
pub mod server;
pub mod session;
pub mod transport;
pub mod types;

pub use config::RelayConfig;
pub use infrastructure::{
    EphemeralCredential, SessionsTokenProvider, StaticTokenProvider, TokenProvider,
};
pub use server::RelayServer;
pub use session::{DeliveryQueue, Session, SessionState};
pub use types::{RelayError, RelayMessage, Result};
