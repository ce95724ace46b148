mod core;
mod state;


pub use state::{
    DecisionRequest, SessionCanceller, SessionDriver, SessionPhase, SessionSummary, SessionUpdate,
};
