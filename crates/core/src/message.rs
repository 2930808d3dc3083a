//! Message domain types.
//!
//! A message is a tagged union over the four conversation roles. The
//! serialized form is a JSON object carrying a `role` tag, the same shape the
//! chat-completions wire format uses, so a persisted chat can be replayed
//! against a model without translation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ChatError;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,
    /// The end user
    User,
    /// The model
    Assistant,
    /// Tool execution result
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "tool" => Ok(Role::Tool),
            other => Err(ChatError::InvalidRole(other.to_string())),
        }
    }
}

/// A model-issued request to invoke a named tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique ID for this tool call (unique within its assistant message)
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a raw JSON string, exactly as the model produced them
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    /// Create a new assistant message with text and no tool calls.
    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    /// Create an assistant message that requests tool calls.
    pub fn assistant_with_tools(content: Option<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Message::Assistant {
            content,
            tool_calls,
        }
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Message::System { .. } => Role::System,
            Message::User { .. } => Role::User,
            Message::Assistant { .. } => Role::Assistant,
            Message::Tool { .. } => Role::Tool,
        }
    }

    /// The text content, or `""` for an assistant turn that carried none.
    pub fn content(&self) -> &str {
        match self {
            Message::System { content }
            | Message::User { content }
            | Message::Tool { content, .. } => content,
            Message::Assistant { content, .. } => content.as_deref().unwrap_or(""),
        }
    }

    /// Tool calls requested by this message (always empty for non-assistant roles).
    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        match self {
            Message::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls().is_empty()
    }

    /// The call ID a tool result answers.
    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Message::Tool { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        }
    }

    /// Rough token estimate (4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        self.content().len() / 4
    }
}

impl TryFrom<serde_json::Value> for Message {
    type Error = ChatError;

    /// Decode a role-tagged record, rejecting unknown roles before anything else.
    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        let role = value
            .get("role")
            .and_then(|r| r.as_str())
            .ok_or_else(|| ChatError::InvalidRole(String::from("<missing>")))?;
        role.parse::<Role>()?;

        serde_json::from_value(value).map_err(|e| ChatError::Malformed {
            index: 0,
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role(), Role::User);
        assert_eq!(msg.content(), "Hello, agent!");
        assert!(msg.tool_calls().is_empty());
    }

    #[test]
    fn assistant_tool_calls_exposed() {
        let msg = Message::assistant_with_tools(
            None,
            vec![ToolCallRequest::new("call_1", "search", r#"{"q":"acetone"}"#)],
        );
        assert!(msg.has_tool_calls());
        assert_eq!(msg.content(), "");
        assert_eq!(msg.tool_calls()[0].name, "search");
    }

    #[test]
    fn tool_result_references_call() {
        let msg = Message::tool_result("call_9", "42");
        assert_eq!(msg.role(), Role::Tool);
        assert_eq!(msg.tool_call_id(), Some("call_9"));
    }

    #[test]
    fn wire_shape_is_role_tagged() {
        let msg = Message::tool_result("call_1", "done");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"role": "tool", "tool_call_id": "call_1", "content": "done"})
        );

        let plain = serde_json::to_value(Message::assistant("hi")).unwrap();
        assert!(plain.get("tool_calls").is_none());
    }

    #[test]
    fn unknown_role_rejected() {
        let err = Message::try_from(json!({"role": "moderator", "content": "x"})).unwrap_err();
        assert!(matches!(err, ChatError::InvalidRole(ref r) if r == "moderator"));
    }

    #[test]
    fn missing_role_rejected() {
        let err = Message::try_from(json!({"content": "x"})).unwrap_err();
        assert!(matches!(err, ChatError::InvalidRole(_)));
    }

    #[test]
    fn role_parses_all_four() {
        for role in [Role::System, Role::User, Role::Assistant, Role::Tool] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }
}
