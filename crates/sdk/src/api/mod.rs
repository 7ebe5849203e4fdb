//! Task/message API
//!
//! - [`SomaApi`] the operations pattern engines need from the server
//! - [`HttpSomaApi`] the reqwest-based client
//! - [`InMemorySomaApi`] an in-process implementation for tests and demos

mod http;
mod memory;
pub mod models;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ApiError;

pub use http::HttpSomaApi;
pub use memory::InMemorySomaApi;
pub use models::*;

/// Task/message operations consumed by the pattern engines
#[async_trait]
pub trait SomaApi: Send + Sync {
    /// Fetch one page of a task's timeline, oldest first
    async fn task_history(
        &self,
        task_id: Uuid,
        page_size: u32,
        next_page_token: Option<String>,
    ) -> Result<PaginatedResponse<TaskTimelineItem>, ApiError>;

    /// Append a message to a task
    async fn send_message(
        &self,
        task_id: Uuid,
        request: CreateMessageRequest,
    ) -> Result<CreateMessageResponse, ApiError>;

    /// Change a task's status, optionally with a message
    async fn update_task_status(
        &self,
        task_id: Uuid,
        request: UpdateTaskStatusRequest,
    ) -> Result<(), ApiError>;
}
