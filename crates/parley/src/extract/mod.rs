use crate::models::{ContentItem, Conversation, ResultPayload};

pub use crate::utils::content::preview_lines;

/// Location and payload of the first tool result sent back by the user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolResultMatch<'a> {
    pub message_index: usize,
    pub item_index: usize,
    pub result: &'a ResultPayload,
}

impl<'a> ToolResultMatch<'a> {
    /// `None` both when the structured result has no content and when the
    /// result is list-shaped; list elements are never mined for content.
    #[must_use]
    pub fn content(&self) -> Option<&'a str> {
        self.result.content()
    }
}

/// Scans messages in order and stops at the first `user` message holding a
/// tool result.
#[must_use]
pub fn find_first_tool_result(conversation: &Conversation) -> Option<ToolResultMatch<'_>> {
    conversation
        .messages
        .iter()
        .enumerate()
        .filter(|(_, message)| message.is_user())
        .find_map(|(message_index, message)| {
            message
                .content
                .iter()
                .enumerate()
                .find_map(|(item_index, item)| match item {
                    ContentItem::ToolResult { run } => Some(ToolResultMatch {
                        message_index,
                        item_index,
                        result: &run.result,
                    }),
                    _ => None,
                })
        })
}

#[must_use]
pub fn first_tool_result_content(conversation: &Conversation) -> Option<&str> {
    find_first_tool_result(conversation).and_then(|found| found.content())
}

/// Text of the first item of the first message, when that message comes from
/// the user and the item is text.
#[must_use]
pub fn first_user_text(conversation: &Conversation) -> Option<&str> {
    let first = conversation.messages.first()?;
    if !first.is_user() {
        return None;
    }
    match first.content.first()? {
        ContentItem::Text { text } => Some(text),
        _ => None,
    }
}
