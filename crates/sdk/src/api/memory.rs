//! In-process implementation of the task/message API

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use super::models::*;
use super::SomaApi;
use crate::error::ApiError;

/// Task/message API kept entirely in memory
///
/// Tasks are created implicitly on first use. Call counters let tests
/// assert how often the server was actually reached (as opposed to
/// replayed from the journal).
#[derive(Default)]
pub struct InMemorySomaApi {
    timelines: RwLock<HashMap<Uuid, Vec<TaskTimelineItem>>>,
    statuses: RwLock<HashMap<Uuid, TaskStatus>>,
    history_calls: AtomicUsize,
    send_calls: AtomicUsize,
    status_calls: AtomicUsize,
}

impl InMemorySomaApi {
    /// Create an empty API
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a user message, as if the user had typed it
    pub fn push_user_message(&self, task_id: Uuid, text: impl Into<String>) -> Message {
        self.append_message(task_id, CreateMessageRequest::user_text(text))
            .message
    }

    /// Current timeline of a task
    pub fn timeline(&self, task_id: Uuid) -> Vec<TaskTimelineItem> {
        self.timelines
            .read()
            .get(&task_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Last status set on a task
    pub fn status(&self, task_id: Uuid) -> Option<TaskStatus> {
        self.statuses.read().get(&task_id).copied()
    }

    /// Number of `task_history` calls served
    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }

    /// Number of `send_message` calls served
    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    /// Number of `update_task_status` calls served
    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    fn append_message(
        &self,
        task_id: Uuid,
        request: CreateMessageRequest,
    ) -> CreateMessageResponse {
        let now = Utc::now();
        let message = Message {
            id: Uuid::now_v7(),
            task_id,
            reference_task_ids: request.reference_task_ids,
            role: request.role,
            metadata: request.metadata,
            parts: request.parts,
            created_at: now,
        };
        let timeline_item = TaskTimelineItem {
            id: Uuid::now_v7(),
            task_id,
            event_payload: TaskTimelineItemPayload::Message(MessageTaskTimelineItem {
                message: message.clone(),
            }),
            created_at: now,
        };

        self.timelines
            .write()
            .entry(task_id)
            .or_default()
            .push(timeline_item.clone());

        CreateMessageResponse {
            message,
            timeline_item,
        }
    }
}

#[async_trait]
impl SomaApi for InMemorySomaApi {
    async fn task_history(
        &self,
        task_id: Uuid,
        page_size: u32,
        next_page_token: Option<String>,
    ) -> Result<PaginatedResponse<TaskTimelineItem>, ApiError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);

        let offset = match next_page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| ApiError::InvalidResponse(format!("bad page token: {token}")))?,
            None => 0,
        };

        let timelines = self.timelines.read();
        let items = timelines.get(&task_id).map(Vec::as_slice).unwrap_or(&[]);
        let page: Vec<_> = items
            .iter()
            .skip(offset)
            .take(page_size as usize)
            .cloned()
            .collect();
        let end = offset + page.len();
        let next_page_token = (end < items.len()).then(|| end.to_string());

        Ok(PaginatedResponse {
            items: page,
            next_page_token,
        })
    }

    async fn send_message(
        &self,
        task_id: Uuid,
        request: CreateMessageRequest,
    ) -> Result<CreateMessageResponse, ApiError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.append_message(task_id, request))
    }

    async fn update_task_status(
        &self,
        task_id: Uuid,
        request: UpdateTaskStatusRequest,
    ) -> Result<(), ApiError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);

        let status_message_id = request
            .message
            .map(|message| self.append_message(task_id, message).message.id);

        self.statuses.write().insert(task_id, request.status);
        self.timelines
            .write()
            .entry(task_id)
            .or_default()
            .push(TaskTimelineItem {
                id: Uuid::now_v7(),
                task_id,
                event_payload: TaskTimelineItemPayload::TaskStatusUpdate(
                    TaskStatusUpdateTaskTimelineItem {
                        status: request.status,
                        status_message_id,
                    },
                ),
                created_at: Utc::now(),
            });
        Ok(())
    }
}
