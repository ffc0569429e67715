//! Calendar events.

use std::time::SystemTime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServiceResult;

/// A calendar entry. `id` is assigned by the backend on create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_time: SystemTime,
    pub end_time: SystemTime,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub attendees: Vec<String>,
}

/// Filter for [`CalendarService::list_events`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEventsOptions {
    #[serde(default)]
    pub calendar_id: Option<String>,
    #[serde(default)]
    pub start_date: Option<SystemTime>,
    #[serde(default)]
    pub end_date: Option<SystemTime>,
    #[serde(default)]
    pub max_results: Option<usize>,
}

/// Calendar backend (`"calendar"`).
#[async_trait]
pub trait CalendarService: Send + Sync {
    async fn create_event(&self, event: CalendarEvent) -> ServiceResult<CalendarEvent>;

    async fn list_events(&self, options: ListEventsOptions) -> ServiceResult<Vec<CalendarEvent>>;

    async fn update_event(&self, id: &str, event: CalendarEvent) -> ServiceResult<CalendarEvent>;

    async fn delete_event(&self, id: &str) -> ServiceResult<()>;

    async fn get_event(&self, id: &str) -> ServiceResult<Option<CalendarEvent>>;
}
