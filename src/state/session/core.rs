use super::{DecisionRequest, SessionDriver, SessionPhase, SessionSummary, SessionUpdate};
use crate::api::logging::emit_decision_dropped;
use crate::api::{ByteStream, FrameDecoder};
use crate::config::ResumeMode;
use crate::error::SessionError;
use crate::state::ResumeOutcome;
use crate::types::{RunRequest, StreamFrame};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

type UpdateSender<'a> = Option<&'a mpsc::UnboundedSender<SessionUpdate>>;

enum LoopEvent {
    Cancelled,
    Decision(Option<bool>),
    Chunk(Result<Option<bytes::Bytes>, SessionError>),
}

enum FrameOutcome {
    Merged,
    Decision(oneshot::Receiver<bool>),
    Stale,
}

impl SessionDriver {
    /// Starts a new session for `question` and drives its stream until it
    /// closes. A human decision requested on the way is read from the
    /// `DecisionRequest` sent through `update_tx`.
    pub async fn run(
        &mut self,
        question: impl Into<String>,
        database_reference: Option<String>,
        update_tx: UpdateSender<'_>,
    ) -> Result<SessionSummary, SessionError> {
        if self.awaiting_human_feedback {
            return Err(SessionError::DecisionPending);
        }

        let generation = self.accumulator.restart();
        let cancel = self.arm_cancellation();
        self.thread_id = None;
        self.frames_applied = 0;
        self.transition(SessionPhase::Streaming);
        emit_update(update_tx, SessionUpdate::Started { generation });

        let request = RunRequest {
            question: question.into(),
            database_reference,
        };
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            opened = self.client.create_run_stream(&request) => Some(opened),
        };
        let stream = match opened {
            None => return Ok(self.close(true, update_tx)),
            Some(Ok(stream)) => stream,
            Some(Err(error)) => return Err(self.fail(error, update_tx)),
        };

        self.consume(stream, generation, cancel, update_tx).await
    }

    /// Opens the resume stream for the current thread and keeps decoding into
    /// the same session. Used after `resume` resolved a decision outside a
    /// running stream.
    pub async fn continue_stream(
        &mut self,
        update_tx: UpdateSender<'_>,
    ) -> Result<SessionSummary, SessionError> {
        if self.awaiting_human_feedback {
            return Err(SessionError::DecisionPending);
        }
        let Some(thread_id) = self.thread_id.clone() else {
            return Err(SessionError::NoThread);
        };
        if !self.accumulator.is_current() {
            return Ok(self.summary(true));
        }

        let generation = self.accumulator.generation();
        let cancel = self.arm_cancellation();
        self.transition(SessionPhase::Streaming);

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            opened = self.client.create_resume_stream(&thread_id) => Some(opened),
        };
        let stream = match opened {
            None => return Ok(self.close(true, update_tx)),
            Some(Ok(stream)) => stream,
            Some(Err(error)) => return Err(self.fail(error, update_tx)),
        };

        self.consume(stream, generation, cancel, update_tx).await
    }

    async fn consume(
        &mut self,
        mut stream: ByteStream,
        generation: u64,
        cancel: CancellationToken,
        update_tx: UpdateSender<'_>,
    ) -> Result<SessionSummary, SessionError> {
        let mut decoder = FrameDecoder::new();
        let mut decision_rx: Option<oneshot::Receiver<bool>> = None;
        let mut stream_open = true;

        loop {
            if !stream_open && decision_rx.is_none() {
                return Ok(self.close(false, update_tx));
            }

            let idle_timeout = if decision_rx.is_some() {
                None
            } else {
                Some(self.idle_timeout)
            };
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => LoopEvent::Cancelled,
                decision = recv_decision(&mut decision_rx) => LoopEvent::Decision(decision),
                chunk = next_chunk(&mut stream, idle_timeout), if stream_open => LoopEvent::Chunk(chunk),
            };

            match event {
                LoopEvent::Cancelled => return Ok(self.close(true, update_tx)),
                LoopEvent::Chunk(Err(error)) => return Err(self.fail(error, update_tx)),
                LoopEvent::Chunk(Ok(Some(chunk))) => {
                    let decoded = decoder.process(&chunk);
                    for frame in decoded.frames {
                        let pending = decision_rx.is_some();
                        match self.apply_frame(generation, frame, pending, update_tx) {
                            FrameOutcome::Merged => {}
                            FrameOutcome::Decision(rx) => decision_rx = Some(rx),
                            FrameOutcome::Stale => return Ok(self.close(true, update_tx)),
                        }
                    }
                    if let Some(error) = decoded.error {
                        return Err(self.fail(error, update_tx));
                    }
                }
                LoopEvent::Chunk(Ok(None)) => {
                    match decoder.finish() {
                        Ok(Some(frame)) => {
                            let pending = decision_rx.is_some();
                            match self.apply_frame(generation, frame, pending, update_tx) {
                                FrameOutcome::Merged => {}
                                FrameOutcome::Decision(rx) => decision_rx = Some(rx),
                                FrameOutcome::Stale => return Ok(self.close(true, update_tx)),
                            }
                        }
                        Ok(None) => {}
                        Err(error) => return Err(self.fail(error, update_tx)),
                    }
                    stream_open = false;
                    let keep_waiting = self.resume_mode == ResumeMode::NewStream
                        && self.awaiting_human_feedback
                        && decision_rx.is_some();
                    if !keep_waiting {
                        return Ok(self.close(false, update_tx));
                    }
                }
                LoopEvent::Decision(None) => {
                    emit_decision_dropped(self.thread_id.as_deref());
                    decision_rx = None;
                }
                LoopEvent::Decision(Some(approved)) => {
                    decision_rx = None;
                    let thread_id = self.thread_id.clone();
                    let resolved = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        outcome = self.resume_client.resume(thread_id.as_deref(), approved) => Some(outcome),
                    };
                    let outcome = match resolved {
                        None => return Ok(self.close(true, update_tx)),
                        Some(Ok(outcome)) => outcome,
                        Some(Err(error)) => {
                            emit_update(update_tx, SessionUpdate::ResumeFailed(error.to_string()));
                            decision_rx = self.request_decision(update_tx);
                            continue;
                        }
                    };

                    let resolved = outcome.is_resolved();
                    emit_update(update_tx, SessionUpdate::Resumed(outcome.clone()));
                    if !resolved {
                        // The backend is not ready for this answer; the interrupt still stands.
                        decision_rx = self.request_decision(update_tx);
                        continue;
                    }
                    self.awaiting_human_feedback = false;
                    self.transition(SessionPhase::Streaming);

                    if self.resume_mode == ResumeMode::NewStream {
                        let (ResumeOutcome::Submitted { thread_id, .. }
                        | ResumeOutcome::AlreadyResolved { thread_id, .. }) = outcome
                        else {
                            continue;
                        };
                        let opened = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => None,
                            opened = self.client.create_resume_stream(&thread_id) => Some(opened),
                        };
                        match opened {
                            None => return Ok(self.close(true, update_tx)),
                            Some(Ok(resumed)) => {
                                stream = resumed;
                                decoder = FrameDecoder::new();
                                stream_open = true;
                            }
                            Some(Err(error)) => return Err(self.fail(error, update_tx)),
                        }
                    }
                }
            }
        }
    }

    fn apply_frame(
        &mut self,
        generation: u64,
        frame: StreamFrame,
        decision_pending: bool,
        update_tx: UpdateSender<'_>,
    ) -> FrameOutcome {
        let interrupt = self.detector.detect(&frame.data);
        let domain_error = if interrupt {
            None
        } else {
            frame.data.error_description()
        };

        let Some(snapshot) = self.accumulator.apply(generation, frame.data) else {
            return FrameOutcome::Stale;
        };
        self.frames_applied += 1;
        if let Some(thread_id) = frame.thread_id.filter(|id| !id.is_empty()) {
            self.thread_id = Some(thread_id);
        }

        emit_update(update_tx, SessionUpdate::State(snapshot));
        if let Some(message) = domain_error {
            emit_update(update_tx, SessionUpdate::DomainError { message });
        }

        // A repeated signature re-asks only when no request is outstanding.
        if !interrupt || (self.awaiting_human_feedback && decision_pending) {
            return FrameOutcome::Merged;
        }
        self.awaiting_human_feedback = true;
        self.transition(SessionPhase::AwaitingHumanFeedback);
        match self.request_decision(update_tx) {
            Some(rx) => FrameOutcome::Decision(rx),
            None => FrameOutcome::Merged,
        }
    }

    fn request_decision(&self, update_tx: UpdateSender<'_>) -> Option<oneshot::Receiver<bool>> {
        let tx = update_tx?;
        let (response_tx, response_rx) = oneshot::channel();
        let request = DecisionRequest {
            thread_id: self.thread_id.clone(),
            message: self.detector.signature().to_string(),
            response_tx,
        };
        tx.send(SessionUpdate::DecisionRequired(request)).ok()?;
        Some(response_rx)
    }

    fn close(&mut self, cancelled: bool, update_tx: UpdateSender<'_>) -> SessionSummary {
        self.transition(SessionPhase::Closed);
        emit_update(update_tx, SessionUpdate::Closed);
        self.summary(cancelled)
    }

    fn fail(&mut self, error: SessionError, update_tx: UpdateSender<'_>) -> SessionError {
        self.close(false, update_tx);
        error
    }
}

async fn recv_decision(decision_rx: &mut Option<oneshot::Receiver<bool>>) -> Option<bool> {
    match decision_rx {
        Some(rx) => rx.await.ok(),
        None => std::future::pending().await,
    }
}

async fn next_chunk(
    stream: &mut ByteStream,
    idle_timeout: Option<Duration>,
) -> Result<Option<bytes::Bytes>, SessionError> {
    let next = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
            Ok(next) => next,
            Err(_) => {
                return Err(SessionError::IdleTimeout { after: limit })
            }
        },
        None => stream.next().await,
    };
    next.transpose()
}

fn emit_update(update_tx: UpdateSender<'_>, update: SessionUpdate) {
    if let Some(tx) = update_tx {
        let _ = tx.send(update);
    }
}
