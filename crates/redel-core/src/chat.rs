//! Chat message types for the kani conversation model.
//!
//! A [`ChatMessage`] carries either a legacy single `function_call` or the
//! newer `tool_call_id` + `tool_calls` pair, depending on the engine that
//! produced it. Field names match the kani wire format exactly.

use serde::{Deserialize, Serialize};

/// Speaker role of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// System prompt or injected instruction.
    System,
    /// End-user input.
    User,
    /// Model output.
    Assistant,
    /// Tool/function result.
    Function,
}

impl ChatRole {
    /// Canonical wire string (e.g. `"assistant"`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Function => "function",
        }
    }
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A function invocation requested by the model.
///
/// `arguments` is JSON *text*, not a parsed object — the server forwards it
/// verbatim from the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Function name.
    pub name: String,
    /// Raw JSON argument text.
    pub arguments: String,
}

/// A tool call emitted by the assistant (OpenAI-style).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique tool call ID.
    pub id: String,
    /// Call type discriminator (currently always `"function"`).
    #[serde(rename = "type")]
    pub call_type: String,
    /// The requested invocation.
    pub function: FunctionCall,
}

/// One message in a kani's chat history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Speaker role.
    pub role: ChatRole,
    /// Text content; `None` for pure tool-call messages.
    #[serde(default)]
    pub content: Option<String>,
    /// Function name (for `function` role messages).
    #[serde(default)]
    pub name: Option<String>,
    /// Legacy single function call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    /// ID of the tool call this message responds to.
    #[serde(default)]
    pub tool_call_id: Option<String>,
    /// Tool calls requested by this message.
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChatMessage {
    /// Create a plain-text message with the given role.
    #[must_use]
    pub fn text(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            name: None,
            function_call: None,
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::text(ChatRole::User, content)
    }

    /// Create an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(ChatRole::Assistant, content)
    }

    /// Whether this is an assistant message.
    #[must_use]
    pub fn is_assistant(&self) -> bool {
        self.role == ChatRole::Assistant
    }

    /// Whether this message carries pending tool calls.
    ///
    /// A non-empty `tool_calls` list or a legacy `function_call` both count.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        self.function_call.is_some()
            || self.tool_calls.as_ref().is_some_and(|tcs| !tcs.is_empty())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
