pub mod constants;
pub mod error;
pub mod message;

pub use constants::DEFAULT_QUEUE_BOUND;
pub use error::{RelayError, Result};
pub use message::RelayMessage;
