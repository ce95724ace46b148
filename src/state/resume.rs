use crate::api::logging::{emit_resume_skipped, emit_resume_submitted};
use crate::api::ThreadStateClient;
use crate::error::SessionError;
use crate::types::{ThreadState, ThreadStateUpdate};

/// Tool response content that continues the research.
pub const APPROVE_CONTENT: &str = "2";
/// Tool response content that regenerates the hypothesis.
pub const REJECT_CONTENT: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HumanDecision {
    Approve,
    Reject,
}

impl HumanDecision {
    pub fn from_approval(approved: bool) -> Self {
        if approved {
            HumanDecision::Approve
        } else {
            HumanDecision::Reject
        }
    }

    pub fn tool_content(self) -> &'static str {
        match self {
            HumanDecision::Approve => APPROVE_CONTENT,
            HumanDecision::Reject => REJECT_CONTENT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// No thread id was known; nothing was sent.
    NoThread,
    /// The thread has no tool call awaiting an answer.
    NoPendingToolCall { thread_id: String },
    /// The pending tool call was already answered; nothing was sent.
    AlreadyResolved {
        thread_id: String,
        tool_call_id: String,
    },
    Submitted {
        thread_id: String,
        tool_call_id: String,
        decision: HumanDecision,
    },
}

impl ResumeOutcome {
    /// True when the backend thread holds an answer for its pending call.
    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            ResumeOutcome::AlreadyResolved { .. } | ResumeOutcome::Submitted { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Submission {
    thread_id: String,
    tool_call_id: String,
    decision: HumanDecision,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingToolCall {
    tool_call_id: String,
    answered: bool,
}

/// Answers the backend's human-choice tool call with a synthetic tool
/// response.
pub struct ResumeClient {
    threads: ThreadStateClient,
    as_node: String,
    last_submission: Option<Submission>,
}

impl ResumeClient {
    pub fn new(threads: ThreadStateClient, as_node: impl Into<String>) -> Self {
        Self {
            threads,
            as_node: as_node.into(),
            last_submission: None,
        }
    }

    pub async fn resume(
        &mut self,
        thread_id: Option<&str>,
        approved: bool,
    ) -> Result<ResumeOutcome, SessionError> {
        let Some(thread_id) = thread_id.filter(|id| !id.trim().is_empty()) else {
            emit_resume_skipped(None, "no thread id");
            return Ok(ResumeOutcome::NoThread);
        };
        let decision = HumanDecision::from_approval(approved);

        let state = self.threads.get_state(thread_id).await?;
        let Some(pending) = pending_tool_call(&state) else {
            emit_resume_skipped(Some(thread_id), "no tool call in thread");
            return Ok(ResumeOutcome::NoPendingToolCall {
                thread_id: thread_id.to_string(),
            });
        };

        let submission = Submission {
            thread_id: thread_id.to_string(),
            tool_call_id: pending.tool_call_id.clone(),
            decision,
        };
        if pending.answered || self.last_submission.as_ref() == Some(&submission) {
            emit_resume_skipped(Some(thread_id), "tool call already answered");
            return Ok(ResumeOutcome::AlreadyResolved {
                thread_id: submission.thread_id,
                tool_call_id: submission.tool_call_id,
            });
        }

        let update = ThreadStateUpdate::tool_response(
            pending.tool_call_id.as_str(),
            decision.tool_content(),
            self.as_node.as_str(),
        );
        self.threads.update_state(thread_id, &update).await?;
        emit_resume_submitted(thread_id, &pending.tool_call_id, decision.tool_content());

        self.last_submission = Some(submission.clone());
        Ok(ResumeOutcome::Submitted {
            thread_id: submission.thread_id,
            tool_call_id: submission.tool_call_id,
            decision,
        })
    }
}

/// First tool call of the most recent message that carries tool calls, and
/// whether a later tool message already answers it.
fn pending_tool_call(state: &ThreadState) -> Option<PendingToolCall> {
    let messages = state.messages();
    let (index, call) = messages
        .iter()
        .enumerate()
        .rev()
        .find_map(|(index, message)| message.tool_calls.first().map(|call| (index, call)))?;

    let answered = messages[index + 1..]
        .iter()
        .any(|message| message.tool_call_id.as_deref() == Some(call.id.as_str()));

    Some(PendingToolCall {
        tool_call_id: call.id.clone(),
        answered,
    })
}
