//! One-shot run state.
//!
//! A single question-answer run distills into an `AgentState` record:
//! the query, a coarse intent label, every successful tool payload, the
//! assistant's free text, and any failures the tools reported. The record
//! is what downstream consumers read instead of re-parsing a transcript.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use tabletalk_core::errors::PersistError;

use crate::atomic::write_atomic_or_plain;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Aggregation,
    TopN,
    Filter,
    Ambiguous,
    Error,
    Unknown,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentState {
    pub query: String,
    pub intent: Intent,
    /// Successful tool payloads, in observation order.
    pub results: Vec<Value>,
    pub insights: Vec<String>,
    /// Failed tool payloads (parsed), or `{"raw_text": ...}` for
    /// unparseable results.
    pub data_issues: Vec<Value>,
    pub timestamp: DateTime<Utc>,
}

impl AgentState {
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            intent: Intent::Unknown,
            results: Vec::new(),
            insights: Vec::new(),
            data_issues: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Folds one tool-result block into the state. `content` is the
    /// envelope content: a list of text parts whose text is the
    /// JSON-encoded payload. Failed payloads (`ok: false` or an error
    /// status) go to `data_issues` and never into `results`.
    pub fn observe_tool_result(&mut self, content: &Value) {
        let Some(payload) = unwrap_envelope(content) else {
            return;
        };

        if payload_failed(&payload) {
            debug!(payload = %payload, "tool reported a failure");
            self.data_issues.push(payload);
            return;
        }

        self.results.push(normalize_payload(payload));
    }

    pub fn push_insight(&mut self, insight: impl Into<String>) {
        self.insights.push(insight.into());
    }

    /// Derives the intent label from what the tools actually returned.
    /// Any recorded data issue forces `Error`; mixed result shapes give
    /// `Ambiguous`.
    pub fn classify_intent(&mut self) {
        if !self.data_issues.is_empty() {
            self.intent = Intent::Error;
            return;
        }

        let mut seen = Vec::new();
        for result in &self.results {
            let intent = if let Some(label) = result.get("intent").and_then(Value::as_str) {
                match label {
                    "aggregation" => Intent::Aggregation,
                    "top_n" => Intent::TopN,
                    "filter" => Intent::Filter,
                    _ => Intent::Unknown,
                }
            } else if result.get("total").is_some() && result.get("count").is_none() {
                Intent::Aggregation
            } else if result.get("count").is_some() || result.get("value").is_some() {
                Intent::Filter
            } else if result.get("n").is_some() || result.get("rows").is_some() {
                Intent::TopN
            } else {
                continue;
            };
            if !seen.contains(&intent) {
                seen.push(intent);
            }
        }

        self.intent = match seen.as_slice() {
            [] => Intent::Unknown,
            [single] => *single,
            _ => Intent::Ambiguous,
        };
    }

    /// Compact timestamp used in archived state filenames.
    pub fn timestamp_slug(&self) -> String {
        self.timestamp.format("%Y%m%dT%H%M%SZ").to_string()
    }

    /// Re-stamps the record with the current time. Called once when a run
    /// completes, so the archive filename and the stored timestamp agree.
    pub fn stamp(&mut self) {
        self.timestamp = Utc::now();
    }

    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        let mut body = serde_json::to_string_pretty(self)?;
        body.push('\n');
        write_atomic_or_plain(path, body.as_bytes())
    }

    pub fn load(path: &Path) -> Result<Self, PersistError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| PersistError::Read { path: path.to_path_buf(), source })?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Extracts the JSON payload from envelope content: the first text part
/// parsed as JSON. Non-JSON text is preserved as `{"raw_text": ...}`.
fn unwrap_envelope(content: &Value) -> Option<Value> {
    match content {
        Value::Array(parts) => {
            let text = parts
                .iter()
                .find(|part| part.get("type").and_then(Value::as_str) == Some("text"))
                .and_then(|part| part.get("text"))
                .and_then(Value::as_str)?;
            Some(
                serde_json::from_str(text)
                    .unwrap_or_else(|_| json!({ "raw_text": text })),
            )
        }
        Value::Object(_) => Some(content.clone()),
        Value::String(text) => Some(
            serde_json::from_str(text).unwrap_or_else(|_| json!({ "raw_text": text.clone() })),
        ),
        _ => None,
    }
}

fn payload_failed(payload: &Value) -> bool {
    if payload.get("ok").and_then(Value::as_bool) == Some(false) {
        return true;
    }
    matches!(
        payload.get("status").and_then(Value::as_str),
        Some("insufficient") | Some("error")
    )
}

/// Unwraps an inner `result` key when present and normalizes a bare
/// `total` into `{column, total}`.
fn normalize_payload(payload: Value) -> Value {
    let payload = match payload {
        Value::Object(mut object) => match object.remove("result") {
            Some(inner) => inner,
            None => Value::Object(object),
        },
        other => other,
    };

    match payload {
        Value::Object(ref object)
            if object.contains_key("total") && !object.contains_key("column") =>
        {
            let mut normalized = object.clone();
            normalized.insert("column".to_string(), json!("revenue"));
            Value::Object(normalized)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::{AgentState, Intent};

    fn envelope_of(payload: serde_json::Value) -> serde_json::Value {
        json!([{ "type": "text", "text": payload.to_string() }])
    }

    #[test]
    fn failed_tool_result_lands_in_data_issues_not_results() {
        let mut state = AgentState::new("total revenue");
        state.observe_tool_result(&envelope_of(json!({
            "ok": false,
            "status": "insufficient",
            "message": "Dataset contains missing values.",
        })));

        assert_eq!(state.results.len(), 0);
        assert_eq!(state.data_issues.len(), 1);
        assert_eq!(state.data_issues[0]["status"], "insufficient");
    }

    #[test]
    fn successful_tool_result_is_recorded() {
        let mut state = AgentState::new("total revenue");
        state.observe_tool_result(&envelope_of(json!({
            "ok": true, "column": "revenue", "total": 400.5
        })));

        assert!(state.data_issues.is_empty());
        assert_eq!(state.results[0]["total"], 400.5);
    }

    #[test]
    fn bare_total_is_normalized_with_a_column() {
        let mut state = AgentState::new("total revenue");
        state.observe_tool_result(&envelope_of(json!({ "ok": true, "total": 12.5 })));
        assert_eq!(state.results[0]["column"], "revenue");
    }

    #[test]
    fn non_json_text_is_kept_as_raw_text() {
        let mut state = AgentState::new("q");
        state.observe_tool_result(&json!([{ "type": "text", "text": "plain words" }]));
        assert_eq!(state.results[0]["raw_text"], "plain words");
    }

    #[test]
    fn total_result_classifies_as_aggregation() {
        let mut state = AgentState::new("total revenue");
        state.observe_tool_result(&envelope_of(json!({
            "ok": true, "column": "revenue", "total": 400.5
        })));
        state.classify_intent();
        assert_eq!(state.intent, Intent::Aggregation);
    }

    #[test]
    fn rows_result_classifies_as_top_n() {
        let mut state = AgentState::new("top products");
        state.observe_tool_result(&envelope_of(json!({ "ok": true, "n": 3, "rows": [] })));
        state.classify_intent();
        assert_eq!(state.intent, Intent::TopN);
    }

    #[test]
    fn count_result_classifies_as_filter() {
        let mut state = AgentState::new("widget revenue");
        state.observe_tool_result(&envelope_of(json!({
            "ok": true, "count": 2, "total": 150.0, "rows": []
        })));
        state.classify_intent();
        assert_eq!(state.intent, Intent::Filter);
    }

    #[test]
    fn explicit_intent_key_wins() {
        let mut state = AgentState::new("q");
        state.observe_tool_result(&envelope_of(json!({ "ok": true, "intent": "filter" })));
        state.classify_intent();
        assert_eq!(state.intent, Intent::Filter);
    }

    #[test]
    fn data_issue_forces_error_intent() {
        let mut state = AgentState::new("total revenue");
        state.observe_tool_result(&envelope_of(json!({ "ok": true, "total": 1.0 })));
        state.observe_tool_result(&envelope_of(json!({ "ok": false, "status": "error" })));
        state.classify_intent();
        assert_eq!(state.intent, Intent::Error);
    }

    #[test]
    fn no_results_classify_as_unknown() {
        let mut state = AgentState::new("tell me about the dataset");
        state.classify_intent();
        assert_eq!(state.intent, Intent::Unknown);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("agent_state.json");

        let mut state = AgentState::new("top 5 products");
        state.push_insight("Widget leads revenue.");
        state.save(&path).unwrap();

        let restored = AgentState::load(&path).unwrap();
        assert_eq!(restored.query, "top 5 products");
        assert_eq!(restored.insights, vec!["Widget leads revenue."]);
    }

    #[test]
    fn intent_serializes_snake_case() {
        let value = serde_json::to_value(Intent::TopN).unwrap();
        assert_eq!(value, "top_n");
    }
}
