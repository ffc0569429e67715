//! # ATAC Core
//!
//! Shared building blocks of the ATAC multi-tenant event-dispatch core.
//!
//! - **Events**: the canonical inbound [`EventContext`] and the
//!   [`PluginResponse`] a plugin fills in
//! - **Tenants**: [`CustomerConfig`] and its ordered [`EventMapping`]s
//! - **Services**: the [`ServiceContainer`] and the backend capability
//!   traits in [`services`]
//! - **Errors**: the [`AtacError`] taxonomy with stable [`ErrorCode`]s
//!
//! Plugin lifecycle, routing and orchestration live in `atac-framework`.
//!
//! ```text
//! ┌───────────┐    ┌──────────────┐    ┌────────┐    ┌──────────────────┐
//! │ transport │───▶│ EventContext │───▶│ router │───▶│ plugin pipeline  │
//! └───────────┘    └──────────────┘    └────────┘    │ (services: llm…) │
//!                                                    └──────────────────┘
//! ```

pub mod container;
pub mod customer;
pub mod error;
pub mod event;
pub mod services;

pub use container::{ServiceArc, ServiceContainer};
pub use customer::{CustomerConfig, EventMapping};
pub use error::{AtacError, AtacResult, BoxError, ErrorCode, ServiceError, ServiceResult};
pub use event::{
    Attachment, Embed, EmbedField, EventContext, EventType, Payload, PluginResponse,
    UnknownEventType,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::container::ServiceContainer;
    pub use super::customer::{CustomerConfig, EventMapping};
    pub use super::error::{AtacError, AtacResult, BoxError, ErrorCode};
    pub use super::event::{EventContext, EventType, Payload, PluginResponse};
    pub use super::services::names;
}
