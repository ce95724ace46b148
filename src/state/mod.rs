mod accumulator;
mod interrupt;
mod resume;
mod session;
mod session_state;

pub use accumulator::SessionAccumulator;
pub use interrupt::{detect, InterruptDetector, HUMAN_CHOICE_REQUIRED};
pub use resume::{HumanDecision, ResumeClient, ResumeOutcome, APPROVE_CONTENT, REJECT_CONTENT};
pub use session::{
    DecisionRequest, SessionCanceller, SessionDriver, SessionPhase, SessionSummary, SessionUpdate,
};
pub use session_state::{merge, SessionState};
