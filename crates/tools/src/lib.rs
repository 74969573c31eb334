//! Analysis tools over the tabular dataset.
//!
//! Tools are stateless read queries invoked by the reasoning service. Each
//! one returns a JSON payload and never an `Err`: failures are encoded in
//! the payload (`{"ok": false, ...}`) so a bad tool call degrades the turn
//! instead of crashing the session.

pub mod analysis;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};

pub use analysis::{CalculateTotal, FilterByValue, GetTopN, ValidateData};

#[async_trait]
pub trait AnalysisTool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn input_schema(&self) -> Value;
    async fn execute(&self, input: Value) -> Value;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn AnalysisTool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: AnalysisTool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Tool definitions in the wire shape the reasoning service expects.
    pub fn definitions(&self) -> Vec<Value> {
        let mut definitions: Vec<_> = self
            .tools
            .values()
            .map(|tool| {
                json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "input_schema": tool.input_schema(),
                })
            })
            .collect();
        definitions.sort_by_key(|definition| definition["name"].as_str().unwrap_or("").to_string());
        definitions
    }

    pub async fn dispatch(&self, name: &str, input: Value) -> Value {
        match self.tools.get(name) {
            Some(tool) => tool.execute(input).await,
            None => {
                tracing::warn!(tool = name, "dispatch requested for unknown tool");
                json!({ "ok": false, "status": "error", "error": format!("unknown tool: {name}") })
            }
        }
    }
}

/// Wraps an inner tool payload in the response envelope consumed by the
/// session layer: one text part containing the JSON-encoded result.
pub fn envelope(inner: &Value) -> Value {
    json!({
        "content": [
            { "type": "text", "text": inner.to_string() }
        ]
    })
}
