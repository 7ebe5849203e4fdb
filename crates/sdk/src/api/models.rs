//! Task and message models exchanged with the Soma server

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form metadata attached to messages and parts
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Submitted,
    Working,
    InputRequired,
    Completed,
    Canceled,
    Failed,
    Rejected,
    AuthRequired,
    Unknown,
}

impl TaskStatus {
    /// Check if the task can no longer make progress
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Canceled | Self::Failed | Self::Rejected
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Submitted => "submitted",
            Self::Working => "working",
            Self::InputRequired => "input-required",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
            Self::AuthRequired => "auth-required",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageRole {
    User,
    Agent,
}

/// Text part of a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// One part of a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum MessagePart {
    TextPart(TextPart),
}

impl MessagePart {
    /// Create a text part without metadata
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextPart(TextPart {
            text: text.into(),
            metadata: Metadata::new(),
        })
    }

    /// Text content of the part, if it is a text part
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::TextPart(part) => Some(&part.text),
        }
    }
}

/// A message stored in a task's timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub task_id: Uuid,
    #[serde(default)]
    pub reference_task_ids: Vec<Uuid>,
    pub role: MessageRole,
    #[serde(default)]
    pub metadata: Metadata,
    pub parts: Vec<MessagePart>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Concatenated text of all text parts
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(MessagePart::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Status change recorded in a timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusUpdateTaskTimelineItem {
    pub status: TaskStatus,
    pub status_message_id: Option<Uuid>,
}

/// Message recorded in a timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageTaskTimelineItem {
    pub message: Message,
}

/// Timeline item payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum TaskTimelineItemPayload {
    TaskStatusUpdate(TaskStatusUpdateTaskTimelineItem),
    Message(MessageTaskTimelineItem),
}

/// One entry of a task's ordered history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTimelineItem {
    pub id: Uuid,
    pub task_id: Uuid,
    pub event_payload: TaskTimelineItemPayload,
    pub created_at: DateTime<Utc>,
}

impl TaskTimelineItem {
    /// The message carried by this item, if any
    pub fn message(&self) -> Option<&Message> {
        match &self.event_payload {
            TaskTimelineItemPayload::Message(item) => Some(&item.message),
            TaskTimelineItemPayload::TaskStatusUpdate(_) => None,
        }
    }
}

/// Messages from a history snapshot, oldest first
pub fn messages(history: &[TaskTimelineItem]) -> impl Iterator<Item = &Message> {
    history.iter().filter_map(TaskTimelineItem::message)
}

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

/// Request to append a message to a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateMessageRequest {
    #[serde(default)]
    pub reference_task_ids: Vec<Uuid>,
    pub role: MessageRole,
    #[serde(default)]
    pub metadata: Metadata,
    pub parts: Vec<MessagePart>,
}

impl CreateMessageRequest {
    /// A single-part text message authored by the agent
    pub fn agent_text(text: impl Into<String>) -> Self {
        Self {
            reference_task_ids: Vec::new(),
            role: MessageRole::Agent,
            metadata: Metadata::new(),
            parts: vec![MessagePart::text(text)],
        }
    }

    /// A single-part text message authored by the user
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            ..Self::agent_text(text)
        }
    }
}

/// Response from creating a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateMessageResponse {
    pub message: Message,
    pub timeline_item: TaskTimelineItem,
}

/// Request to change a task's status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateTaskStatusRequest {
    pub status: TaskStatus,
    pub message: Option<CreateMessageRequest>,
}
