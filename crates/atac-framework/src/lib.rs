//! # ATAC Framework
//!
//! Plugin lifecycle, tenant routing and orchestration on top of `atac-core`.
//!
//! This layer provides:
//! - [`plugin`] - the [`Plugin`] trait, descriptors and the [`PluginLoader`]
//!   state machine (`unloaded → loading → loaded | error`)
//! - [`EventRouter`] - tenant registry and event-type → mapping resolution
//! - [`ContextManager`] - builds a [`PluginContext`] per mapping
//! - [`PipelineExecutor`] - validated single, sequential and parallel runs
//! - [`RateLimiter`] - fixed-window admission per user and per tenant
//! - [`Orchestrator`] - the `route_event` entry point tying it all together

pub mod context;
pub mod orchestrator;
pub mod pipeline;
pub mod plugin;
pub mod rate_limit;
pub mod router;

pub use context::{ContextManager, METADATA_KEY, PluginContext};
pub use orchestrator::{
    DeliveryPolicy, GENERIC_FAILURE_MESSAGE, OrchestrationResult, Orchestrator,
};
pub use pipeline::{PipelineExecutor, PipelineResult, PipelineStep};
pub use plugin::{
    Plugin, PluginDescriptor, PluginFactory, PluginLoadContext, PluginLoader, PluginMetadata,
    PluginStatus,
};
pub use rate_limit::{RateLimitSettings, RateLimiter, RateLimits};
pub use router::EventRouter;
