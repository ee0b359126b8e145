use serde::{Deserialize, Serialize};

// ===================================================================
// Hook Input Types (received via stdin, snake_case JSON)
// ===================================================================

/// How a session was started (used by SessionStart).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStartSource {
    Startup,
    Resume,
    Clear,
    Compact,
}

/// Fields shared by all hook event inputs.
#[derive(Debug, Clone, Deserialize)]
pub struct CommonInput {
    pub session_id: String,
    pub transcript_path: String,
    pub cwd: String,
}

// --- Per-event input structs ---

#[derive(Debug, Deserialize)]
pub struct SessionStartInput {
    #[serde(flatten)]
    pub common: CommonInput,
    pub source: SessionStartSource,
}

#[derive(Debug, Deserialize)]
pub struct UserPromptSubmitInput {
    #[serde(flatten)]
    pub common: CommonInput,
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct PreToolUseInput {
    #[serde(flatten)]
    pub common: CommonInput,
    pub tool_name: String,
    pub tool_input: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct PostToolUseInput {
    #[serde(flatten)]
    pub common: CommonInput,
    pub tool_name: String,
    pub tool_input: serde_json::Value,
    pub tool_response: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct StopInput {
    #[serde(flatten)]
    pub common: CommonInput,
    pub stop_hook_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct SubagentStopInput {
    #[serde(flatten)]
    pub common: CommonInput,
    pub stop_hook_active: bool,
    #[serde(default)]
    pub agent_transcript_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionEndInput {
    #[serde(flatten)]
    pub common: CommonInput,
}

/// Top-level hook input, deserialized from stdin JSON.
///
/// Tagged by the `hook_event_name` field to determine which event fired.
#[derive(Debug, Deserialize)]
#[serde(tag = "hook_event_name")]
pub enum HookInput {
    SessionStart(SessionStartInput),
    UserPromptSubmit(UserPromptSubmitInput),
    PreToolUse(PreToolUseInput),
    PostToolUse(PostToolUseInput),
    Stop(StopInput),
    SubagentStop(SubagentStopInput),
    SessionEnd(SessionEndInput),
}

impl HookInput {
    /// Access the common fields shared by all hook events.
    pub fn common(&self) -> &CommonInput {
        match self {
            Self::SessionStart(e) => &e.common,
            Self::UserPromptSubmit(e) => &e.common,
            Self::PreToolUse(e) => &e.common,
            Self::PostToolUse(e) => &e.common,
            Self::Stop(e) => &e.common,
            Self::SubagentStop(e) => &e.common,
            Self::SessionEnd(e) => &e.common,
        }
    }
}

// ===================================================================
// Tool-Specific Input Types
// ===================================================================

/// Parsed tool call, matching `tool_name` to a typed `tool_input`.
/// Only the tools the monitors inspect get dedicated types.
#[derive(Debug)]
pub enum ToolCall {
    Bash(BashToolInput),
    Write(WriteToolInput),
    Edit(EditToolInput),
    Task(TaskToolInput),
    /// MCP or other tools — keeps the raw JSON.
    Other {
        tool_name: String,
        tool_input: serde_json::Value,
    },
}

impl ToolCall {
    pub fn parse(
        tool_name: &str,
        tool_input: &serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        match tool_name {
            "Bash" => Ok(Self::Bash(serde_json::from_value(tool_input.clone())?)),
            "Write" => Ok(Self::Write(serde_json::from_value(tool_input.clone())?)),
            "Edit" => Ok(Self::Edit(serde_json::from_value(tool_input.clone())?)),
            "Task" => Ok(Self::Task(serde_json::from_value(tool_input.clone())?)),
            other => Ok(Self::Other {
                tool_name: other.to_string(),
                tool_input: tool_input.clone(),
            }),
        }
    }

}

impl PreToolUseInput {
    pub fn tool_call(&self) -> Result<ToolCall, serde_json::Error> {
        ToolCall::parse(&self.tool_name, &self.tool_input)
    }
}

impl PostToolUseInput {
    pub fn tool_call(&self) -> Result<ToolCall, serde_json::Error> {
        ToolCall::parse(&self.tool_name, &self.tool_input)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BashToolInput {
    pub command: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WriteToolInput {
    pub file_path: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditToolInput {
    pub file_path: String,
    pub old_string: String,
    pub new_string: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskToolInput {
    pub prompt: String,
    pub description: String,
    pub subagent_type: String,
}

// ===================================================================
// Hook Output Types (written to stdout as JSON, camelCase)
// ===================================================================

/// Top-level hook output written to stdout on exit code 0.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookOutput {
    /// If `false`, Claude stops processing entirely after this hook.
    #[serde(rename = "continue", skip_serializing_if = "Option::is_none")]
    pub continue_processing: Option<bool>,

    /// Message shown to the user when `continue_processing` is `false`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,

    /// Warning or hint shown to the user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,

    /// Set to `"block"` to prevent the action.
    /// Used by UserPromptSubmit, PostToolUse, Stop, SubagentStop.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,

    /// Explanation shown to Claude when `decision` is `"block"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Event-specific output fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_specific_output: Option<HookSpecificOutput>,
}

/// Event-specific output, tagged by `hookEventName`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "hookEventName")]
pub enum HookSpecificOutput {
    SessionStart(AdditionalContextOutput),
    UserPromptSubmit(AdditionalContextOutput),
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalContextOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<String>,
}

impl HookOutput {
    /// A response that blocks the current action, with the reason shown to
    /// Claude.
    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            decision: Some("block".into()),
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    /// A response that lets the action proceed but surfaces a message to
    /// the user.
    pub fn hint(message: impl Into<String>) -> Self {
        Self {
            system_message: Some(message.into()),
            ..Default::default()
        }
    }
}
