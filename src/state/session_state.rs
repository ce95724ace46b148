use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Cumulative pipeline state for one session, and also the shape of each
/// partial update carried by a frame.
///
/// Every field is `None` until the backend emits that key. A key sent as
/// JSON `null` is still present and deserializes to `Some(Value::Null)`, so
/// it overwrites on merge. Keys without a dedicated field land in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub messages: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub hypothesis: Option<Value>,
    #[serde(
        default,
        alias = "processDecision",
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub process_decision: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub process: Option<Value>,
    #[serde(
        default,
        alias = "visualizationState",
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub visualization_state: Option<Value>,
    #[serde(
        default,
        alias = "searcherState",
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub searcher_state: Option<Value>,
    #[serde(
        default,
        alias = "codeState",
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub code_state: Option<Value>,
    #[serde(
        default,
        alias = "reportSection",
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub report_section: Option<Value>,
    #[serde(
        default,
        alias = "qualityReview",
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub quality_review: Option<Value>,
    #[serde(
        default,
        alias = "needsRevision",
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub needs_revision: Option<Value>,
    #[serde(
        default,
        alias = "lastSender",
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_sender: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Key-level last-write-wins merge.
///
/// Each key present in `update` replaces the value in `current`; every other
/// key is carried over. Nested values are replaced wholesale.
pub fn merge(mut current: SessionState, update: SessionState) -> SessionState {
    current.absorb(update);
    current
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// In-place form of [`merge`].
    pub fn absorb(&mut self, update: SessionState) {
        let SessionState {
            messages,
            hypothesis,
            process_decision,
            process,
            visualization_state,
            searcher_state,
            code_state,
            report_section,
            quality_review,
            needs_revision,
            last_sender,
            error,
            extra,
        } = update;

        overwrite(&mut self.messages, messages);
        overwrite(&mut self.hypothesis, hypothesis);
        overwrite(&mut self.process_decision, process_decision);
        overwrite(&mut self.process, process);
        overwrite(&mut self.visualization_state, visualization_state);
        overwrite(&mut self.searcher_state, searcher_state);
        overwrite(&mut self.code_state, code_state);
        overwrite(&mut self.report_section, report_section);
        overwrite(&mut self.quality_review, quality_review);
        overwrite(&mut self.needs_revision, needs_revision);
        overwrite(&mut self.last_sender, last_sender);
        overwrite(&mut self.error, error);
        self.extra.extend(extra);
    }

    pub fn is_empty(&self) -> bool {
        self == &SessionState::default()
    }

    /// The state as a JSON object keyed by wire names.
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    pub fn messages(&self) -> &[Value] {
        self.messages
            .as_ref()
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// `hypothesis.content`, or the hypothesis itself when the backend sent a
    /// bare string.
    pub fn hypothesis_content(&self) -> Option<&str> {
        match self.hypothesis.as_ref()? {
            Value::String(text) => Some(text),
            Value::Object(fields) => fields.get("content").and_then(Value::as_str),
            _ => None,
        }
    }

    pub fn needs_revision(&self) -> Option<bool> {
        self.needs_revision.as_ref().and_then(Value::as_bool)
    }

    /// Stage that produced the latest update; falls back to the backend's
    /// `sender` key.
    pub fn last_sender(&self) -> Option<&str> {
        self.last_sender
            .as_ref()
            .and_then(Value::as_str)
            .or_else(|| self.extra.get("sender").and_then(Value::as_str))
    }

    /// `error.message` when the error is a record carrying one.
    pub fn error_message(&self) -> Option<&str> {
        self.error
            .as_ref()?
            .as_object()?
            .get("message")
            .and_then(Value::as_str)
    }

    /// Human-readable text for any populated `error` value.
    pub fn error_description(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::Null => None,
            Value::String(text) => Some(text.clone()),
            other => Some(
                self.error_message()
                    .map(str::to_string)
                    .unwrap_or_else(|| other.to_string()),
            ),
        }
    }
}

fn overwrite(slot: &mut Option<Value>, incoming: Option<Value>) {
    if incoming.is_some() {
        *slot = incoming;
    }
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
