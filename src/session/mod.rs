mod core;
mod queue;
mod state;

pub use core::Session;
pub use queue::DeliveryQueue;
pub use state::SessionState;
