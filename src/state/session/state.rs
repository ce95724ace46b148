use crate::api::logging::emit_session_transition;
use crate::api::{PipelineClient, ThreadStateClient};
use crate::config::{Config, ResumeMode};
use crate::error::SessionError;
use crate::state::{InterruptDetector, ResumeClient, ResumeOutcome, SessionAccumulator, SessionState};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Streaming,
    AwaitingHumanFeedback,
    Closed,
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Streaming => "streaming",
            SessionPhase::AwaitingHumanFeedback => "awaiting_human_feedback",
            SessionPhase::Closed => "closed",
        }
    }
}

pub enum SessionUpdate {
    Started { generation: u64 },
    State(Arc<SessionState>),
    /// A frame carried an `error` that is not the human-choice signature.
    DomainError { message: String },
    DecisionRequired(DecisionRequest),
    Resumed(ResumeOutcome),
    ResumeFailed(String),
    Closed,
}

/// Asks the caller for the human decision. Sending `true` approves the
/// hypothesis; dropping the sender leaves the session waiting for
/// `SessionDriver::resume`.
pub struct DecisionRequest {
    pub thread_id: Option<String>,
    pub message: String,
    pub response_tx: oneshot::Sender<bool>,
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub generation: u64,
    pub state: Arc<SessionState>,
    pub thread_id: Option<String>,
    pub frames: usize,
    pub awaiting_human_feedback: bool,
    pub cancelled: bool,
}

/// Aborts the driver's in-flight stream from another task. The state merged
/// so far stays readable; later frames of that stream are refused.
#[derive(Clone)]
pub struct SessionCanceller {
    live_generation: Arc<AtomicU64>,
    cancel_slot: Arc<Mutex<CancellationToken>>,
}

impl SessionCanceller {
    pub fn cancel(&self) {
        self.live_generation.fetch_add(1, Ordering::SeqCst);
        self.cancel_slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }
}

pub struct SessionDriver {
    pub(super) client: Arc<PipelineClient>,
    pub(super) resume_client: ResumeClient,
    pub(super) detector: InterruptDetector,
    pub(super) resume_mode: ResumeMode,
    pub(super) idle_timeout: Duration,
    pub(super) accumulator: SessionAccumulator,
    pub(super) live_generation: Arc<AtomicU64>,
    pub(super) cancel_slot: Arc<Mutex<CancellationToken>>,
    pub(super) phase: SessionPhase,
    pub(super) thread_id: Option<String>,
    pub(super) awaiting_human_feedback: bool,
    pub(super) frames_applied: usize,
}

impl SessionDriver {
    pub fn new(client: PipelineClient, threads: ThreadStateClient, config: &Config) -> Self {
        let live_generation = Arc::new(AtomicU64::new(0));
        Self {
            client: Arc::new(client),
            resume_client: ResumeClient::new(threads, config.resume_as_node.clone()),
            detector: InterruptDetector::new(config.interrupt_message.clone()),
            resume_mode: config.resume_mode,
            idle_timeout: config.idle_timeout,
            accumulator: SessionAccumulator::new(Arc::clone(&live_generation)),
            live_generation,
            cancel_slot: Arc::new(Mutex::new(CancellationToken::new())),
            phase: SessionPhase::Idle,
            thread_id: None,
            awaiting_human_feedback: false,
            frames_applied: 0,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            PipelineClient::new(config),
            ThreadStateClient::new(config),
            config,
        )
    }

    pub fn canceller(&self) -> SessionCanceller {
        SessionCanceller {
            live_generation: Arc::clone(&self.live_generation),
            cancel_slot: Arc::clone(&self.cancel_slot),
        }
    }

    pub fn state(&self) -> Arc<SessionState> {
        self.accumulator.snapshot()
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn awaiting_human_feedback(&self) -> bool {
        self.awaiting_human_feedback
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn generation(&self) -> u64 {
        self.accumulator.generation()
    }

    /// Submits the human decision outside a running stream, e.g. after the
    /// run stream closed with the session still awaiting feedback.
    pub async fn resume(&mut self, approved: bool) -> Result<ResumeOutcome, SessionError> {
        let outcome = self
            .resume_client
            .resume(self.thread_id.as_deref(), approved)
            .await?;
        if outcome.is_resolved() {
            self.awaiting_human_feedback = false;
            if self.phase == SessionPhase::AwaitingHumanFeedback {
                self.transition(SessionPhase::Streaming);
            }
        }
        Ok(outcome)
    }

    /// Drops the session: state, thread id and the interrupt flag are cleared
    /// and any stream still tied to the old generation is refused.
    pub fn reset(&mut self) {
        self.cancel_slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
        self.accumulator.restart();
        self.thread_id = None;
        self.awaiting_human_feedback = false;
        self.frames_applied = 0;
        self.transition(SessionPhase::Idle);
    }

    pub(super) fn transition(&mut self, to: SessionPhase) {
        if self.phase == to {
            return;
        }
        emit_session_transition(self.accumulator.generation(), self.phase.as_str(), to.as_str());
        self.phase = to;
    }

    pub(super) fn summary(&self, cancelled: bool) -> SessionSummary {
        SessionSummary {
            generation: self.accumulator.generation(),
            state: self.accumulator.snapshot(),
            thread_id: self.thread_id.clone(),
            frames: self.frames_applied,
            awaiting_human_feedback: self.awaiting_human_feedback,
            cancelled,
        }
    }

    /// Installs a fresh cancellation token for the stream about to open.
    pub(super) fn arm_cancellation(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self
            .cancel_slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = token.clone();
        token
    }
}
