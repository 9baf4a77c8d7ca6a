pub mod connection;
pub mod upstream;

pub use connection::{ClientConnection, ConnectionManager, TransportState, UpstreamConnection};
pub use upstream::UpstreamConnector;
