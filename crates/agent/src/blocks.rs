//! Closed message/block model for streamed responses.
//!
//! Every unit coming back from the reasoning service is interpreted into
//! one of these variants before anything downstream touches it. Shapes the
//! service invents that we do not recognize land in `Unknown` instead of
//! failing the turn.

use serde::Serialize;
use serde_json::Value;

/// One content block inside a streamed message.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        input: Option<Value>,
    },
    ToolResult {
        content: Value,
    },
    Unknown {
        kind: String,
    },
}

impl Block {
    /// Defensive conversion from a raw wire value. Anything without a
    /// recognizable `type` tag becomes `Unknown`.
    pub fn from_value(raw: &Value) -> Self {
        let kind = raw.get("type").and_then(Value::as_str).unwrap_or("<untyped>");
        match kind {
            "text" => match raw.get("text").and_then(Value::as_str) {
                Some(text) => Self::Text { text: text.to_string() },
                None => Self::Unknown { kind: "text (missing text field)".to_string() },
            },
            "tool_use" => {
                let name = raw
                    .get("name")
                    .and_then(Value::as_str)
                    .or_else(|| raw.get("id").and_then(Value::as_str))
                    .unwrap_or("<unknown>")
                    .to_string();
                Self::ToolUse { name, input: raw.get("input").cloned() }
            }
            "tool_result" => {
                Self::ToolResult { content: raw.get("content").cloned().unwrap_or(Value::Null) }
            }
            other => Self::Unknown { kind: other.to_string() },
        }
    }
}

/// One unit of a streamed response, in arrival order. Later units may
/// overwrite state set by earlier ones; last write wins.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    /// The service reported the session identity for this conversation.
    Init { session_id: String },
    Assistant { blocks: Vec<Block> },
    User { blocks: Vec<Block> },
    #[serde(untagged)]
    Unknown { kind: String },
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::Block;

    #[test]
    fn text_block_round_trips() {
        let block = Block::from_value(&json!({ "type": "text", "text": "hello" }));
        assert_eq!(block, Block::Text { text: "hello".to_string() });
    }

    #[test]
    fn tool_use_keeps_structured_input() {
        let block = Block::from_value(&json!({
            "type": "tool_use",
            "id": "tu_1",
            "name": "calculate_total",
            "input": { "column": "revenue" }
        }));
        match block {
            Block::ToolUse { name, input } => {
                assert_eq!(name, "calculate_total");
                assert_eq!(input.unwrap()["column"], "revenue");
            }
            other => panic!("unexpected block: {other:?}"),
        }
    }

    #[test]
    fn unrecognized_type_becomes_unknown() {
        let block = Block::from_value(&json!({ "type": "thinking", "thinking": "..." }));
        assert_eq!(block, Block::Unknown { kind: "thinking".to_string() });
    }

    #[test]
    fn missing_type_tag_becomes_unknown() {
        let block = Block::from_value(&json!({ "text": "orphan" }));
        assert_eq!(block, Block::Unknown { kind: "<untyped>".to_string() });
    }

    #[test]
    fn text_block_without_text_field_is_unknown_not_panic() {
        let block = Block::from_value(&json!({ "type": "text" }));
        assert!(matches!(block, Block::Unknown { .. }));
    }
}
