//! Claude CLI `stream-json` decoding.
//!
//! The CLI writes one JSON event per line. [`LineBuffer`] turns arbitrary
//! stdout chunks into complete lines and [`StreamDemux`] maps each event to
//! at most one [`AgentStep`]. Lines that are not valid JSON, or are events
//! we do not model, produce nothing.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use super::{AgentStep, StepStatus, StepType};

/// Cap on `tool_output` carried in a step.
const MAX_TOOL_OUTPUT_CHARS: usize = 2_000;

// ── Wire events ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "assistant")]
    Assistant {
        message: MessageBody,
        #[serde(default)]
        session_id: String,
    },

    #[serde(rename = "user")]
    User {
        #[serde(default)]
        message: MessageBody,
    },

    #[serde(rename = "result")]
    Result {
        #[serde(default)]
        subtype: String,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        is_error: bool,
    },

    #[serde(rename = "system")]
    System {
        #[serde(default)]
        subtype: String,
        #[serde(default)]
        session_id: String,
    },

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessageBody {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "thinking")]
    Thinking {
        #[serde(default)]
        thinking: String,
    },

    #[serde(rename = "tool_use")]
    ToolUse {
        name: String,
        #[serde(default)]
        input: Value,
        #[serde(default)]
        id: String,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        #[serde(default)]
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: bool,
    },

    #[serde(rename = "text")]
    Text { text: String },

    #[serde(other)]
    Other,
}

// ── Line buffering ───────────────────────────────────────────────────

/// Accumulates raw bytes and yields complete newline-terminated lines.
///
/// Splitting happens on bytes, so a multi-byte character cut across two
/// reads is reassembled before decoding.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and drain every complete, non-blank line.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            let text = text.trim();
            if !text.is_empty() {
                lines.push(text.to_string());
            }
        }
        lines
    }

    /// The unterminated remainder, if any. Empties the buffer.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        let text = String::from_utf8_lossy(&rest).trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}

// ── Demultiplexer ────────────────────────────────────────────────────

/// Per-run state for turning events into steps.
#[derive(Debug, Default)]
pub struct StreamDemux {
    last_id: u64,
    /// tool_use id → tool name, cleared when the matching result arrives.
    pending_tools: HashMap<String, String>,
    text: Vec<String>,
    result_text: Option<String>,
    error: Option<String>,
    session_id: Option<String>,
}

impl StreamDemux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one line. Invalid JSON is ignored.
    pub fn process_line(&mut self, line: &str) -> Option<AgentStep> {
        let event: StreamEvent = serde_json::from_str(line).ok()?;
        self.process_event(event)
    }

    pub fn process_event(&mut self, event: StreamEvent) -> Option<AgentStep> {
        match event {
            StreamEvent::Assistant {
                message,
                session_id,
            } => {
                self.note_session(session_id);
                message
                    .content
                    .into_iter()
                    .find_map(|block| self.assistant_block(block))
            }
            StreamEvent::User { message } => message
                .content
                .into_iter()
                .find_map(|block| self.tool_result_block(block)),
            StreamEvent::Result {
                result, is_error, subtype,
            } => {
                if is_error {
                    let message = result
                        .filter(|r| !r.trim().is_empty())
                        .unwrap_or_else(|| format!("Claude CLI reported an error ({})", subtype));
                    self.error = Some(message.clone());
                    Some(self.step(StepType::Error, message, Some(StepStatus::Failed)))
                } else {
                    self.result_text = result;
                    None
                }
            }
            StreamEvent::System { session_id, .. } => {
                self.note_session(session_id);
                None
            }
            StreamEvent::Unknown => None,
        }
    }

    fn assistant_block(&mut self, block: ContentBlock) -> Option<AgentStep> {
        match block {
            ContentBlock::Thinking { thinking } if !thinking.trim().is_empty() => {
                Some(self.step(StepType::Thinking, thinking, None))
            }
            ContentBlock::ToolUse { name, input, id } => {
                let description = describe_tool_use(&name, &input);
                if !id.is_empty() {
                    self.pending_tools.insert(id, name.clone());
                }
                let mut step = self.step(StepType::ToolUse, description, Some(StepStatus::Running));
                step.tool_name = Some(name);
                step.tool_input = Some(input);
                Some(step)
            }
            ContentBlock::Text { text } if !text.trim().is_empty() => {
                self.text.push(text.clone());
                Some(self.step(StepType::Text, text, None))
            }
            _ => None,
        }
    }

    fn tool_result_block(&mut self, block: ContentBlock) -> Option<AgentStep> {
        let ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } = block
        else {
            return None;
        };
        let tool_name = self.pending_tools.remove(&tool_use_id);
        let output = truncate_chars(&flatten_tool_content(&content), MAX_TOOL_OUTPUT_CHARS);
        let (status, verb) = if is_error {
            (StepStatus::Failed, "failed")
        } else {
            (StepStatus::Completed, "finished")
        };
        let content = format!("{} {}", tool_name.as_deref().unwrap_or("Tool"), verb);
        let mut step = self.step(StepType::ToolResult, content, Some(status));
        step.tool_name = tool_name;
        step.tool_output = Some(output);
        Some(step)
    }

    /// Synthetic error step, e.g. for a timeout.
    pub fn error_step(&mut self, message: impl Into<String>) -> AgentStep {
        let message = message.into();
        self.error = Some(message.clone());
        self.step(StepType::Error, message, Some(StepStatus::Failed))
    }

    /// Terminal step emitted once the process has exited. `None` means the
    /// process was killed without an exit code.
    pub fn complete(&mut self, exit_code: Option<i32>) -> AgentStep {
        let (status, content) = match exit_code {
            Some(0) => (StepStatus::Completed, "Completed".to_string()),
            Some(code) => (StepStatus::Failed, format!("Exited with code {}", code)),
            None => (StepStatus::Failed, "Terminated".to_string()),
        };
        self.step(StepType::Complete, content, Some(status))
    }

    /// Final answer: the `result` event's text, else the streamed text.
    pub fn output(&self) -> String {
        match &self.result_text {
            Some(result) => result.clone(),
            None => self.text.join("\n"),
        }
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Tool calls that have not produced a result yet.
    pub fn pending_tool_count(&self) -> usize {
        self.pending_tools.len()
    }

    fn note_session(&mut self, session_id: String) {
        if !session_id.is_empty() && self.session_id.is_none() {
            self.session_id = Some(session_id);
        }
    }

    fn step(&mut self, step_type: StepType, content: String, status: Option<StepStatus>) -> AgentStep {
        self.last_id += 1;
        AgentStep {
            id: self.last_id,
            step_type,
            timestamp: chrono::Utc::now().to_rfc3339(),
            content,
            tool_name: None,
            tool_input: None,
            tool_output: None,
            status,
        }
    }
}

// ── Presentation helpers ─────────────────────────────────────────────

/// Extract a human-readable description from a tool use event.
pub fn describe_tool_use(name: &str, input: &Value) -> String {
    let str_arg = |key: &str| input.get(key).and_then(|v| v.as_str());
    let path = || str_arg("file_path").map(shorten_path).unwrap_or_else(|| "file".to_string());
    match name {
        "Read" => format!("Reading: {}", path()),
        "Write" => format!("Creating: {}", path()),
        "Edit" | "MultiEdit" => format!("Editing: {}", path()),
        "Bash" => format!(
            "Running: {}",
            str_arg("command").map(|s| truncate_chars(s, 40)).unwrap_or_else(|| "command".into())
        ),
        "Glob" => format!("Searching: {}", str_arg("pattern").unwrap_or("*")),
        "Grep" => format!(
            "Grep: {}",
            str_arg("pattern").map(|s| truncate_chars(s, 30)).unwrap_or_else(|| "pattern".into())
        ),
        "WebFetch" => format!("Fetching: {}", str_arg("url").unwrap_or("url")),
        "WebSearch" => format!("Searching web: {}", str_arg("query").unwrap_or("query")),
        "Task" => format!("Agent: {}", str_arg("description").unwrap_or("subagent")),
        _ => name.to_string(),
    }
}

/// Last two components of a path.
fn shorten_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() <= 2 {
        path.to_string()
    } else {
        parts[parts.len() - 2..].join("/")
    }
}

/// Truncate to `max_chars` characters, marking the cut with an ellipsis.
fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// Tool results arrive either as a string or as a list of text blocks.
fn flatten_tool_content(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOOL_USE: &str = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Read","input":{"file_path":"/Users/foo/project/src/main.rs"},"id":"toolu_1"}]},"session_id":"sess-1"}"#;
    const TOOL_RESULT: &str = r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"toolu_1","content":"fn main() {}"}]}}"#;

    #[test]
    fn test_line_buffer_keeps_partial_line() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"{\"a\":").is_empty());
        assert_eq!(buf.push(b"1}\n{\"b\""), vec!["{\"a\":1}".to_string()]);
        assert_eq!(buf.push(b":2}\n\n"), vec!["{\"b\":2}".to_string()]);
        assert!(buf.finish().is_none());
    }

    #[test]
    fn test_line_buffer_reassembles_split_utf8() {
        let bytes = "{\"text\":\"привет\"}\n".as_bytes();
        let mut buf = LineBuffer::new();
        // Split inside the first Cyrillic character.
        assert!(buf.push(&bytes[..10]).is_empty());
        let lines = buf.push(&bytes[10..]);
        assert_eq!(lines, vec!["{\"text\":\"привет\"}".to_string()]);
    }

    #[test]
    fn test_line_buffer_finish_returns_remainder() {
        let mut buf = LineBuffer::new();
        buf.push(b"one\r\ntrailing");
        assert_eq!(buf.finish().as_deref(), Some("trailing"));
        assert!(buf.finish().is_none());
    }

    #[test]
    fn test_tool_use_then_result_pairs_up() {
        let mut demux = StreamDemux::new();
        let step = demux.process_line(TOOL_USE).unwrap();
        assert_eq!(step.id, 1);
        assert_eq!(step.step_type, StepType::ToolUse);
        assert_eq!(step.content, "Reading: src/main.rs");
        assert_eq!(step.tool_name.as_deref(), Some("Read"));
        assert_eq!(step.status, Some(StepStatus::Running));
        assert_eq!(demux.pending_tool_count(), 1);
        assert_eq!(demux.session_id(), Some("sess-1"));

        let result = demux.process_line(TOOL_RESULT).unwrap();
        assert_eq!(result.id, 2);
        assert_eq!(result.step_type, StepType::ToolResult);
        assert_eq!(result.tool_name.as_deref(), Some("Read"));
        assert_eq!(result.tool_output.as_deref(), Some("fn main() {}"));
        assert_eq!(result.status, Some(StepStatus::Completed));
        assert_eq!(demux.pending_tool_count(), 0);
    }

    #[test]
    fn test_first_recognized_block_wins() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"image"},{"type":"text","text":"Plan ready"},{"type":"tool_use","name":"Bash","input":{},"id":"t"}]}}"#;
        let mut demux = StreamDemux::new();
        let step = demux.process_line(line).unwrap();
        assert_eq!(step.step_type, StepType::Text);
        assert_eq!(step.content, "Plan ready");
        assert_eq!(demux.pending_tool_count(), 0);
    }

    #[test]
    fn test_thinking_block() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"thinking","thinking":"Consider the schema first"}]}}"#;
        let step = StreamDemux::new().process_line(line).unwrap();
        assert_eq!(step.step_type, StepType::Thinking);
        assert_eq!(step.content, "Consider the schema first");
    }

    #[test]
    fn test_invalid_and_unknown_lines_are_ignored() {
        let mut demux = StreamDemux::new();
        assert!(demux.process_line("not json at all").is_none());
        assert!(demux.process_line(r#"{"type":"rate_limit_event"}"#).is_none());
        assert!(demux.process_line(r#"{"type":"system","subtype":"init","session_id":"s"}"#).is_none());
        // Ids only advance for emitted steps.
        assert_eq!(demux.complete(Some(0)).id, 1);
    }

    #[test]
    fn test_result_event_sets_output() {
        let mut demux = StreamDemux::new();
        demux.process_line(r#"{"type":"assistant","message":{"content":[{"type":"text","text":"partial"}]}}"#);
        assert_eq!(demux.output(), "partial");
        let step = demux.process_line(r#"{"type":"result","subtype":"success","result":"Final answer","is_error":false}"#);
        assert!(step.is_none());
        assert_eq!(demux.output(), "Final answer");
    }

    #[test]
    fn test_error_result_emits_error_step() {
        let mut demux = StreamDemux::new();
        let step = demux
            .process_line(r#"{"type":"result","subtype":"error_max_turns","is_error":true}"#)
            .unwrap();
        assert_eq!(step.step_type, StepType::Error);
        assert!(step.content.contains("error_max_turns"));
        assert!(demux.error().is_some());
    }

    #[test]
    fn test_complete_status_follows_exit_code() {
        let mut demux = StreamDemux::new();
        assert_eq!(demux.complete(Some(0)).status, Some(StepStatus::Completed));
        let failed = demux.complete(Some(3));
        assert_eq!(failed.status, Some(StepStatus::Failed));
        assert_eq!(failed.content, "Exited with code 3");
        assert_eq!(demux.complete(None).status, Some(StepStatus::Failed));
    }

    #[test]
    fn test_tool_result_array_content_and_error() {
        let mut demux = StreamDemux::new();
        demux.process_line(r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Bash","input":{"command":"cargo test"},"id":"b1"}]}}"#);
        let step = demux
            .process_line(r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"b1","is_error":true,"content":[{"type":"text","text":"error[E0308]"}]}]}}"#)
            .unwrap();
        assert_eq!(step.status, Some(StepStatus::Failed));
        assert_eq!(step.content, "Bash failed");
        assert_eq!(step.tool_output.as_deref(), Some("error[E0308]"));
    }

    #[test]
    fn test_describe_tool_use() {
        let input = serde_json::json!({"file_path": "/Users/foo/project/src/main.rs"});
        assert_eq!(describe_tool_use("Read", &input), "Reading: src/main.rs");

        let input = serde_json::json!({"command": "cargo test --release"});
        assert_eq!(describe_tool_use("Bash", &input), "Running: cargo test --release");

        assert_eq!(describe_tool_use("Mystery", &Value::Null), "Mystery");
    }

    #[test]
    fn test_truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("ёёёёёёёёёё", 6), "ёёё...");
    }
}
