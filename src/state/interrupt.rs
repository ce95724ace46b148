use super::SessionState;

/// Error message the backend emits when its human-choice step is waiting for
/// a `'1'` / `'2'` answer.
pub const HUMAN_CHOICE_REQUIRED: &str = "Invalid choice. Please provide '1' or '2'.";

/// True iff `update.error.message` is exactly the human-choice signature.
pub fn detect(update: &SessionState) -> bool {
    InterruptDetector::default().detect(update)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterruptDetector {
    signature: String,
}

impl Default for InterruptDetector {
    fn default() -> Self {
        Self::new(HUMAN_CHOICE_REQUIRED)
    }
}

impl InterruptDetector {
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
        }
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn detect(&self, update: &SessionState) -> bool {
        update.error_message() == Some(self.signature.as_str())
    }
}
