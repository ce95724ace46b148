mod api;

pub use api::{
    ResumeStreamRequest, RunRequest, StreamFrame, ThreadMessage, ThreadState, ThreadStateUpdate,
    ThreadValues, ToolCall, ToolResponseMessage, ToolResponseValues, UploadResponse,
};
