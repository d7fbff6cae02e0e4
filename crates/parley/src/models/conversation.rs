use super::value::GenericValue;

/// Role recorded for messages that carry no usable `role` field.
pub const UNKNOWN_ROLE: &str = "";

pub const USER_ROLE: &str = "user";
pub const TEXT_ITEM_TYPE: &str = "text";
pub const TOOL_RESULT_ITEM_TYPE: &str = "tool_result";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    pub id: Option<String>,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: String,
    pub content: Vec<ContentItem>,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            role: UNKNOWN_ROLE.to_string(),
            content: Vec::new(),
        }
    }
}

impl Message {
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.role == USER_ROLE
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentItem {
    Text { text: String },
    ToolResult { run: ToolRun },
    Other { raw: GenericValue },
}

impl ContentItem {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::ToolResult { .. } => "tool_result",
            Self::Other { .. } => "other",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolRun {
    pub result: ResultPayload,
}

/// Shape of a tool run's `result`. A list-shaped result never carries
/// extractable content.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultPayload {
    Structured { content: Option<String> },
    Listlike { raw: Vec<GenericValue> },
}

impl Default for ResultPayload {
    fn default() -> Self {
        Self::Structured { content: None }
    }
}

impl ResultPayload {
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Structured { content } => content.as_deref(),
            Self::Listlike { .. } => None,
        }
    }

    #[must_use]
    pub const fn shape(&self) -> &'static str {
        match self {
            Self::Structured { .. } => "structured",
            Self::Listlike { .. } => "listlike",
        }
    }
}
