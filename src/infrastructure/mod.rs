pub mod task_manager;
pub mod token;

pub use task_manager::TaskManager;
pub use token::{EphemeralCredential, SessionsTokenProvider, StaticTokenProvider, TokenProvider};
