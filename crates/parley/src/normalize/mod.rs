//! Best-effort mapping from a parsed [`GenericValue`] tree onto the typed
//! [`Conversation`] model.
//!
//! Normalization is total: wrong or missing fields degrade to defaults and
//! leave an [`Anomaly`] behind. The raw tree stays the persisted source of
//! truth, so nothing here can lose data that gets stored.

use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::models::conversation::{TEXT_ITEM_TYPE, TOOL_RESULT_ITEM_TYPE};
use crate::models::{
    ContentItem, Conversation, GenericValue, Message, ResultPayload, ToolRun, UNKNOWN_ROLE,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Anomaly {
    pub path: String,
    pub message: String,
}

impl Display for Anomaly {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedConversation {
    pub conversation: Conversation,
    pub anomalies: Vec<Anomaly>,
}

#[must_use]
pub fn normalize_conversation(root: &GenericValue) -> NormalizedConversation {
    let mut anomalies = Vec::new();

    if root.as_mapping().is_none() {
        push_anomaly(
            &mut anomalies,
            "$",
            format!("document root is a {}, expected a mapping", root.kind_name()),
        );
        return NormalizedConversation {
            conversation: Conversation::default(),
            anomalies,
        };
    }

    let id = normalize_id(root.get("id"), &mut anomalies);
    let messages = match root.get("messages") {
        None | Some(GenericValue::Null) => Vec::new(),
        Some(GenericValue::Sequence(items)) => items
            .iter()
            .enumerate()
            .map(|(index, item)| normalize_message(&format!("messages[{index}]"), item, &mut anomalies))
            .collect(),
        Some(other) => {
            push_anomaly(
                &mut anomalies,
                "messages",
                format!("expected a sequence, found {}; treated as empty", other.kind_name()),
            );
            Vec::new()
        }
    };

    NormalizedConversation {
        conversation: Conversation { id, messages },
        anomalies,
    }
}

fn normalize_id(value: Option<&GenericValue>, anomalies: &mut Vec<Anomaly>) -> Option<String> {
    let coerced = match value? {
        GenericValue::Null => return None,
        GenericValue::String(text) => {
            if text.trim().is_empty() {
                push_anomaly(anomalies, "id", "id is blank; treated as missing");
                return None;
            }
            return Some(text.clone());
        }
        GenericValue::Number(number) => number.to_string(),
        GenericValue::Bool(value) => value.to_string(),
        GenericValue::Timestamp(timestamp) => timestamp.to_string(),
        other => {
            push_anomaly(
                anomalies,
                "id",
                format!("id is a {}; treated as missing", other.kind_name()),
            );
            return None;
        }
    };

    push_anomaly(anomalies, "id", format!("non-string id coerced to `{coerced}`"));
    Some(coerced)
}

fn normalize_message(path: &str, value: &GenericValue, anomalies: &mut Vec<Anomaly>) -> Message {
    if value.as_mapping().is_none() {
        push_anomaly(
            anomalies,
            path,
            format!("message is a {}, expected a mapping", value.kind_name()),
        );
        return Message::default();
    }

    let role = match value.get("role") {
        Some(GenericValue::String(role)) => role.clone(),
        None | Some(GenericValue::Null) => {
            push_anomaly(anomalies, &format!("{path}.role"), "missing role");
            UNKNOWN_ROLE.to_string()
        }
        Some(other) => {
            push_anomaly(
                anomalies,
                &format!("{path}.role"),
                format!("role is a {}, expected a string", other.kind_name()),
            );
            UNKNOWN_ROLE.to_string()
        }
    };

    let content_path = format!("{path}.content");
    let content = match value.get("content") {
        None | Some(GenericValue::Null) => Vec::new(),
        Some(GenericValue::Sequence(items)) => items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                classify_content_item(&format!("{content_path}[{index}]"), item, anomalies)
            })
            .collect(),
        Some(other) => {
            push_anomaly(
                anomalies,
                &content_path,
                format!("expected a sequence, found {}; treated as empty", other.kind_name()),
            );
            Vec::new()
        }
    };

    Message { role, content }
}

fn classify_content_item(
    path: &str,
    value: &GenericValue,
    anomalies: &mut Vec<Anomaly>,
) -> ContentItem {
    match value.get("type").and_then(GenericValue::as_str) {
        Some(TEXT_ITEM_TYPE) => match value.get("text").and_then(GenericValue::as_str) {
            Some(text) => ContentItem::Text {
                text: text.to_string(),
            },
            None => {
                push_anomaly(anomalies, path, "text item without a string `text`; kept raw");
                ContentItem::Other { raw: value.clone() }
            }
        },
        Some(TOOL_RESULT_ITEM_TYPE) => ContentItem::ToolResult {
            run: normalize_run(&format!("{path}.run"), value.get("run"), anomalies),
        },
        _ => ContentItem::Other { raw: value.clone() },
    }
}

fn normalize_run(
    path: &str,
    value: Option<&GenericValue>,
    anomalies: &mut Vec<Anomaly>,
) -> ToolRun {
    match value {
        Some(run @ GenericValue::Mapping(_)) => ToolRun {
            result: resolve_result(&format!("{path}.result"), run.get("result"), anomalies),
        },
        None | Some(GenericValue::Null) => {
            push_anomaly(anomalies, path, "tool_result without a run");
            ToolRun::default()
        }
        Some(other) => {
            push_anomaly(
                anomalies,
                path,
                format!("run is a {}, expected a mapping", other.kind_name()),
            );
            ToolRun::default()
        }
    }
}

fn resolve_result(
    path: &str,
    value: Option<&GenericValue>,
    anomalies: &mut Vec<Anomaly>,
) -> ResultPayload {
    match value {
        Some(result @ GenericValue::Mapping(_)) => {
            let content = match result.get("content") {
                Some(GenericValue::String(text)) => Some(text.clone()),
                None | Some(GenericValue::Null) => None,
                Some(other) => {
                    push_anomaly(
                        anomalies,
                        &format!("{path}.content"),
                        format!("content is a {}, expected a string", other.kind_name()),
                    );
                    None
                }
            };
            ResultPayload::Structured { content }
        }
        Some(GenericValue::Sequence(items)) => ResultPayload::Listlike { raw: items.clone() },
        None | Some(GenericValue::Null) => ResultPayload::default(),
        Some(other) => {
            push_anomaly(
                anomalies,
                path,
                format!("result is a {}, expected a mapping or sequence", other.kind_name()),
            );
            ResultPayload::default()
        }
    }
}

fn push_anomaly(anomalies: &mut Vec<Anomaly>, path: &str, message: impl Into<String>) {
    anomalies.push(Anomaly {
        path: path.to_string(),
        message: message.into(),
    });
}
