//! Backend capability interfaces.
//!
//! Each trait is the boundary to an external integration (language model,
//! vector search, cache, …). Concrete backends live outside this crate and
//! are registered in a [`ServiceContainer`](crate::ServiceContainer) under
//! the trait's fixed name. Any of them may be absent; plugins declare what
//! they need and fail validation when it is missing.
//!
//! | name | trait |
//! |------|-------|
//! | `llm` | [`LlmService`] |
//! | `rag` | [`RagService`] |
//! | `cache` | [`CacheService`] |
//! | `data` | [`DataService`] |
//! | `auth` | [`AuthService`] |
//! | `storage` | [`StorageService`] |
//! | `calendar` | [`CalendarService`] |

pub mod auth;
pub mod cache;
pub mod calendar;
pub mod data;
pub mod llm;
pub mod memory;
pub mod rag;
pub mod storage;

pub use auth::{AuthService, UserProfile};
pub use cache::CacheService;
pub use calendar::{CalendarEvent, CalendarService, ListEventsOptions};
pub use data::{DataService, Document, FilterOp, QueryFilter};
pub use llm::{
    ChatMessage, ChatRole, FinishReason, GenerateOptions, LlmResponse, LlmService, ToolCall,
    ToolDefinition, ToolResponse,
};
pub use memory::{MemoryCache, MemoryDataStore};
pub use rag::{RagDocument, RagOptions, RagResult, RagService};
pub use storage::{SignedUrl, StorageService, StoredObject};

/// Fixed service names.
pub mod names {
    pub const LLM: &str = "llm";
    pub const RAG: &str = "rag";
    pub const CACHE: &str = "cache";
    pub const DATA: &str = "data";
    pub const AUTH: &str = "auth";
    pub const STORAGE: &str = "storage";
    pub const CALENDAR: &str = "calendar";

    /// All well-known names.
    pub const ALL: [&str; 7] = [LLM, RAG, CACHE, DATA, AUTH, STORAGE, CALENDAR];
}
