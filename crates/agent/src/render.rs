//! Console + audit-log rendering for streamed response blocks.
//!
//! Contract: one malformed block never aborts the rest of the batch. Each
//! block renders inside its own failure boundary; a failure is logged and
//! skipped. Console output stays compact; full payloads (bounded) go to
//! the log file.

use std::io::{self, Write};

use serde_json::Value;
use tracing::{debug, info};

use tabletalk_core::errors::RenderError;

use crate::blocks::{Block, Message};

/// Preview cap for user-originated tool results.
pub const USER_PREVIEW_LIMIT: usize = 200;
/// Preview cap for assistant-originated results on the console.
pub const CONSOLE_PREVIEW_LIMIT: usize = 1000;
/// Preview cap for assistant-originated results in the audit log.
pub const LOG_PREVIEW_LIMIT: usize = 2000;

pub struct Renderer<W: Write> {
    out: W,
}

impl Renderer<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Renders every block of a message in arrival order, returning how
    /// many blocks failed. Never returns an error itself.
    pub fn render_message(&mut self, message: &Message) -> usize {
        match message {
            Message::Init { session_id } => {
                debug!(session_id, "session id observed in stream");
                0
            }
            Message::Assistant { blocks } => self.render_blocks(blocks, Origin::Assistant),
            Message::User { blocks } => self.render_blocks(blocks, Origin::User),
            Message::Unknown { kind } => {
                info!(kind, "unknown message kind in stream");
                self.render_failable(|out| {
                    writeln!(out, "[unknown message type: {kind}]").map_err(RenderError::from)
                })
            }
        }
    }

    fn render_blocks(&mut self, blocks: &[Block], origin: Origin) -> usize {
        blocks
            .iter()
            .map(|block| {
                self.render_failable(|out| match origin {
                    Origin::Assistant => render_assistant_block(out, block),
                    Origin::User => render_user_block(out, block),
                })
            })
            .sum()
    }

    /// The per-block failure boundary: a rendering failure becomes a log
    /// entry and a count of 1, and the caller moves on to the next block.
    fn render_failable(
        &mut self,
        render: impl FnOnce(&mut W) -> Result<(), RenderError>,
    ) -> usize {
        match render(&mut self.out) {
            Ok(()) => 0,
            Err(error) => {
                debug!(error = %error, "failed to render block; skipping");
                1
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Origin {
    Assistant,
    User,
}

fn render_assistant_block<W: Write>(out: &mut W, block: &Block) -> Result<(), RenderError> {
    match block {
        Block::Text { text } => {
            writeln!(out, "Claude: {text}")?;
            info!(text, "assistant text block");
        }
        Block::ToolUse { name, input } => {
            writeln!(out, "[Tool use] {name}")?;
            info!(tool = name.as_str(), "tool use requested");
            if let Some(input) = input {
                info!(input = %input, "tool input");
            }
        }
        Block::ToolResult { content } => {
            if content.is_object() || content.is_array() {
                let pretty =
                    serde_json::to_string_pretty(content).unwrap_or_else(|_| content.to_string());
                writeln!(out, "[Tool result]:")?;
                writeln!(out, "{}", truncate(&pretty, CONSOLE_PREVIEW_LIMIT))?;
                info!(result = %truncate(&pretty, LOG_PREVIEW_LIMIT), "tool result");
            } else {
                let scalar = scalar_preview(content, CONSOLE_PREVIEW_LIMIT);
                writeln!(out, "[Tool result]: {scalar}")?;
                info!(result = scalar.as_str(), "tool result (scalar)");
            }
        }
        Block::Unknown { kind } => {
            writeln!(out, "[unknown block type: {kind}]")?;
            info!(kind, "unknown block type");
        }
    }
    Ok(())
}

fn render_user_block<W: Write>(out: &mut W, block: &Block) -> Result<(), RenderError> {
    match block {
        Block::Text { text } => {
            writeln!(out, "User: {text}")?;
        }
        Block::ToolResult { content } => {
            // Tool results echoed back on the user side are log-only; the
            // console already saw the assistant's request.
            let preview = if content.is_object() || content.is_array() {
                serde_json::to_string_pretty(content).unwrap_or_else(|_| content.to_string())
            } else {
                scalar_preview(content, USER_PREVIEW_LIMIT)
            };
            info!(preview = %truncate(&preview, USER_PREVIEW_LIMIT), "user tool result preview");
        }
        Block::ToolUse { name, .. } => {
            info!(tool = name.as_str(), "tool use block on user message");
        }
        Block::Unknown { kind } => {
            writeln!(out, "[unknown block type: {kind}]")?;
            info!(kind, "unknown block type on user message");
        }
    }
    Ok(())
}

fn scalar_preview(content: &Value, limit: usize) -> String {
    let raw = match content {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    truncate(&raw, limit).into_owned()
}

fn truncate(text: &str, limit: usize) -> std::borrow::Cow<'_, str> {
    if text.len() <= limit {
        return std::borrow::Cow::Borrowed(text);
    }
    let mut end = limit;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    std::borrow::Cow::Owned(format!("{}...", &text[..end]))
}

#[cfg(test)]
mod tests {
    use std::io::{self, Write};

    use serde_json::json;

    use super::{truncate, Renderer, CONSOLE_PREVIEW_LIMIT};
    use crate::blocks::{Block, Message};

    #[test]
    fn assistant_text_is_printed_verbatim() {
        let mut renderer = Renderer::new(Vec::new());
        let failed = renderer.render_message(&Message::Assistant {
            blocks: vec![Block::Text { text: "Total revenue is 400.5.".to_string() }],
        });
        assert_eq!(failed, 0);
        let output = String::from_utf8(renderer.out).unwrap();
        assert_eq!(output, "Claude: Total revenue is 400.5.\n");
    }

    #[test]
    fn structured_tool_result_is_pretty_printed_and_capped() {
        let big: Vec<_> = (0..200).map(|i| json!({ "product": format!("p{i}"), "revenue": i })).collect();
        let mut renderer = Renderer::new(Vec::new());
        renderer.render_message(&Message::Assistant {
            blocks: vec![Block::ToolResult { content: json!(big) }],
        });
        let output = String::from_utf8(renderer.out).unwrap();
        assert!(output.starts_with("[Tool result]:\n"));
        // "[Tool result]:\n" + capped payload + "...\n"
        assert!(output.len() <= CONSOLE_PREVIEW_LIMIT + 32);
        assert!(output.contains("..."));
    }

    #[test]
    fn unknown_block_renders_marker() {
        let mut renderer = Renderer::new(Vec::new());
        renderer.render_message(&Message::Assistant {
            blocks: vec![Block::Unknown { kind: "thinking".to_string() }],
        });
        let output = String::from_utf8(renderer.out).unwrap();
        assert_eq!(output, "[unknown block type: thinking]\n");
    }

    /// Sink that fails the first write, then recovers.
    struct FlakySink {
        failures_left: usize,
        written: Vec<u8>,
    }

    impl Write for FlakySink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(io::Error::new(io::ErrorKind::Other, "sink full"));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failing_block_does_not_abort_subsequent_blocks() {
        let sink = FlakySink { failures_left: 1, written: Vec::new() };
        let mut renderer = Renderer::new(sink);

        let failed = renderer.render_message(&Message::Assistant {
            blocks: vec![
                Block::Text { text: "first".to_string() },
                Block::Text { text: "second".to_string() },
            ],
        });

        assert_eq!(failed, 1);
        let output = String::from_utf8(renderer.out.written).unwrap();
        assert_eq!(output, "Claude: second\n");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "héllo wörld";
        let cut = truncate(text, 2);
        assert!(cut.ends_with("..."));
        assert!(cut.len() <= 5);
    }
}
