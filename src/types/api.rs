use crate::state::SessionState;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunRequest {
    pub question: String,
    #[serde(rename = "databaseReference")]
    pub database_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResumeStreamRequest {
    #[serde(rename = "threadId")]
    pub thread_id: String,
}

/// One decoded `data: {...}` frame of the run stream.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StreamFrame {
    #[serde(default)]
    pub data: SessionState,
    #[serde(rename = "threadId", default)]
    pub thread_id: Option<String>,
}

/// Snapshot returned by the thread state API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThreadState {
    #[serde(default, deserialize_with = "null_as_default")]
    pub values: ThreadValues,
}

impl ThreadState {
    pub fn messages(&self) -> &[ThreadMessage] {
        &self.values.messages
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ThreadValues {
    #[serde(default, deserialize_with = "null_as_default")]
    pub messages: Vec<ThreadMessage>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ThreadMessage {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub content: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Body of the thread state update that answers a pending tool call.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ThreadStateUpdate {
    pub values: ToolResponseValues,
    pub as_node: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ToolResponseValues {
    pub messages: Vec<ToolResponseMessage>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ToolResponseMessage {
    pub tool_call_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
}

impl ThreadStateUpdate {
    pub fn tool_response(
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
        as_node: impl Into<String>,
    ) -> Self {
        Self {
            values: ToolResponseValues {
                messages: vec![ToolResponseMessage {
                    tool_call_id: tool_call_id.into(),
                    kind: "tool".to_string(),
                    content: content.into(),
                }],
            },
            as_node: as_node.into(),
        }
    }

    pub fn tool_message(&self) -> Option<&ToolResponseMessage> {
        self.values.messages.first()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub uuid: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
