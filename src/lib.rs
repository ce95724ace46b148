pub mod api;
pub mod config;
pub mod error;
pub mod state;
pub mod types;
pub mod util;

#[cfg(test)]
mod test_support;

pub use config::{Config, ResumeMode};
pub use error::SessionError;
pub use state::{SessionDriver, SessionPhase, SessionState, SessionSummary, SessionUpdate};
