/// Every way a session, resume, or upload call can fail.
///
/// Transport, decode and idle-timeout errors end the session; the rest are
/// returned from the operation that hit them and leave the session running.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("request to '{url}' failed: {message}")]
    Transport { url: String, message: String },

    #[error("endpoint '{url}' returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("endpoint '{url}' returned no stream body")]
    MissingBody { url: String },

    #[error("malformed frame: {source}")]
    Decode {
        payload: String,
        source: serde_json::Error,
    },

    #[error("no stream data received for {after:?}")]
    IdleTimeout { after: std::time::Duration },

    #[error("a human decision is pending; resume or reset before submitting another question")]
    DecisionPending,

    #[error("no backend thread is known for this session")]
    NoThread,

    #[error("thread state request for '{thread_id}' failed: {message}")]
    ThreadState { thread_id: String, message: String },

    #[error("upload failed: {0}")]
    Upload(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Errors that close the session they occur in.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::Transport { .. }
                | SessionError::HttpStatus { .. }
                | SessionError::MissingBody { .. }
                | SessionError::Decode { .. }
                | SessionError::IdleTimeout { .. }
        )
    }
}
