//! Transcript and summarization wire types for orcai.
//!
//! Shared by the capture engine and the CLI so the on-disk transcript format and the
//! chat-completions payload cannot drift apart. The engine builds a [`CaptureReport`];
//! everything that leaves the process is derived from it here.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const TRANSCRIPT_VERSION: u32 = 1;
pub const MAX_TRANSCRIPT_BYTES: usize = 16 * 1024 * 1024; // 16MB

pub const SYSTEM_PROMPT: &str = "You are a tool for generating Ansible playbooks.";

const PROMPT_PREAMBLE: &str = "Convert the following shell commands, file changes, and executed scripts into an Ansible playbook:";

/// Everything captured during one session, frozen at finalize time.
///
/// `file_changes` carries only the diff side of each tracked file; a path that was observed
/// once has a `None` diff. Maps are ordered so the rendered prompt is stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaptureReport {
    pub version: u32,
    pub started_at: String,
    pub finished_at: String,
    #[serde(default)]
    pub shell: Option<String>,
    pub commands: Vec<String>,
    pub file_changes: BTreeMap<String, Option<String>>,
    pub scripts: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl CaptureReport {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.file_changes.is_empty() && self.scripts.is_empty()
    }

    pub fn validate(&self) -> Result<(), ErrorInfo> {
        if self.version != TRANSCRIPT_VERSION {
            return Err(ErrorInfo::new(
                "unsupported_version",
                format!(
                    "transcript version {} is not supported (expected {})",
                    self.version, TRANSCRIPT_VERSION
                ),
            ));
        }
        require_timestamp(&self.started_at, "started_at")?;
        require_timestamp(&self.finished_at, "finished_at")?;

        if self.commands.iter().any(|command| command.trim().is_empty()) {
            return Err(ErrorInfo::new(
                "invalid_command",
                "commands must not contain blank entries",
            ));
        }

        Ok(())
    }

    /// Renders the user prompt sent to the summarization service.
    pub fn render_prompt(&self) -> String {
        let commands = pretty_json(&self.commands);
        let file_changes = pretty_json(&self.file_changes);
        let scripts = pretty_json(&self.scripts);

        format!(
            "{PROMPT_PREAMBLE}\n\nCommands:\n{commands}\n\nFile Changes:\n{file_changes}\n\nExecuted Scripts:\n{scripts}\n"
        )
    }
}

pub fn parse_transcript(data: &[u8]) -> Result<CaptureReport, ErrorInfo> {
    if data.len() > MAX_TRANSCRIPT_BYTES {
        return Err(ErrorInfo::new(
            "transcript_too_large",
            format!("transcript exceeds {} bytes", MAX_TRANSCRIPT_BYTES),
        ));
    }
    let report: CaptureReport = serde_json::from_slice(data).map_err(|err| {
        ErrorInfo::new(
            "invalid_transcript",
            format!("transcript is invalid JSON: {}", err),
        )
    })?;
    report.validate()?;
    Ok(report)
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat completions
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn for_report(report: &CaptureReport, model: &str, max_tokens: u32) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![
                ChatMessage {
                    role: Role::System,
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: Role::User,
                    content: report.render_prompt(),
                },
            ],
            max_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Extracts the artifact text from a successful chat-completions body.
pub fn parse_chat_response(body: &str) -> Result<String, ErrorInfo> {
    let response: ChatResponse = serde_json::from_str(body).map_err(|err| {
        ErrorInfo::new(
            "invalid_response",
            format!("response is not a chat completion: {}", err),
        )
    })?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| {
            ErrorInfo::new(
                "empty_response",
                format!("response carried no message content: {}", body),
            )
        })
}

fn pretty_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

fn require_timestamp(value: &str, field: &str) -> Result<(), ErrorInfo> {
    if DateTime::parse_from_rfc3339(value).is_err() {
        return Err(ErrorInfo::new(
            "invalid_timestamp",
            format!("{} must be RFC3339", field),
        ));
    }
    Ok(())
}
