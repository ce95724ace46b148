use crate::api::client::{ByteStream, MockStreamProducer, StreamRequest};
use crate::api::threads::MockThreadBackend;
use crate::error::SessionError;
use crate::types::{ThreadMessage, ThreadState, ThreadStateUpdate, ToolCall};
use bytes::Bytes;
use futures::stream;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub type ChunkSender = mpsc::UnboundedSender<Result<Bytes, SessionError>>;

/// Formats one `data:` frame terminated by a blank line.
pub fn frame(data: Value, thread_id: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({ "data": data, "threadId": thread_id })
    )
}

pub enum MockResponse {
    /// Raw chunks, delivered as-is and then end of stream.
    Chunks(Vec<String>),
    /// Chunks pushed by the test through a `ChunkSender`; ends when it drops.
    Channel(mpsc::UnboundedReceiver<Result<Bytes, SessionError>>),
    Fail(SessionError),
}

impl MockResponse {
    pub fn channel() -> (ChunkSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, MockResponse::Channel(rx))
    }
}

#[derive(Clone)]
pub struct MockPipelineClient {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    requests: Arc<Mutex<Vec<StreamRequest>>>,
}

impl MockPipelineClient {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<StreamRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl MockStreamProducer for MockPipelineClient {
    fn create_mock_stream(&self, request: &StreamRequest) -> Result<ByteStream, SessionError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            None => Err(SessionError::Transport {
                url: "mock://pipeline".to_string(),
                message: "MockPipelineClient: no more responses configured".to_string(),
            }),
            Some(MockResponse::Fail(error)) => Err(error),
            Some(MockResponse::Chunks(chunks)) => {
                let items: Vec<Result<Bytes, SessionError>> =
                    chunks.into_iter().map(|s| Ok(Bytes::from(s))).collect();
                Ok(Box::pin(stream::iter(items)))
            }
            Some(MockResponse::Channel(rx)) => Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            }))),
        }
    }
}

/// In-memory thread state API. Answering a tool call appends the tool
/// message to the thread, the way the real backend advances.
#[derive(Clone, Default)]
pub struct MockThreadStore {
    threads: Arc<Mutex<HashMap<String, ThreadState>>>,
    updates: Arc<Mutex<Vec<(String, ThreadStateUpdate)>>>,
    get_calls: Arc<AtomicUsize>,
    failing_updates: Arc<AtomicUsize>,
}

impl MockThreadStore {
    pub fn with_pending_tool_call(thread_id: &str, tool_call_id: &str) -> Self {
        let store = Self::default();
        store.insert_thread(
            thread_id,
            vec![
                ThreadMessage {
                    kind: Some("human".to_string()),
                    content: Value::String("question".to_string()),
                    ..ThreadMessage::default()
                },
                ThreadMessage {
                    kind: Some("ai".to_string()),
                    content: Value::String(String::new()),
                    tool_calls: vec![ToolCall {
                        id: tool_call_id.to_string(),
                        name: Some("human_choice".to_string()),
                    }],
                    ..ThreadMessage::default()
                },
            ],
        );
        store
    }

    pub fn insert_thread(&self, thread_id: &str, messages: Vec<ThreadMessage>) {
        let mut state = ThreadState::default();
        state.values.messages = messages;
        self.threads
            .lock()
            .unwrap()
            .insert(thread_id.to_string(), state);
    }

    /// The next `count` updates fail with an HTTP 503.
    pub fn fail_next_updates(&self, count: usize) {
        self.failing_updates.store(count, Ordering::SeqCst);
    }

    pub fn updates(&self) -> Vec<(String, ThreadStateUpdate)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }
}

impl MockThreadBackend for MockThreadStore {
    fn get_state(&self, thread_id: &str) -> Result<ThreadState, SessionError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.threads
            .lock()
            .unwrap()
            .get(thread_id)
            .cloned()
            .ok_or_else(|| SessionError::ThreadState {
                thread_id: thread_id.to_string(),
                message: "unknown thread".to_string(),
            })
    }

    fn update_state(
        &self,
        thread_id: &str,
        update: &ThreadStateUpdate,
    ) -> Result<(), SessionError> {
        let failing = self.failing_updates.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_updates.store(failing - 1, Ordering::SeqCst);
            return Err(SessionError::HttpStatus {
                url: format!("mock://threads/{thread_id}/state"),
                status: 503,
            });
        }

        self.updates
            .lock()
            .unwrap()
            .push((thread_id.to_string(), update.clone()));
        let mut threads = self.threads.lock().unwrap();
        let state = threads.entry(thread_id.to_string()).or_default();
        for message in &update.values.messages {
            state.values.messages.push(ThreadMessage {
                kind: Some(message.kind.clone()),
                content: Value::String(message.content.clone()),
                tool_calls: Vec::new(),
                tool_call_id: Some(message.tool_call_id.clone()),
            });
        }
        Ok(())
    }
}
