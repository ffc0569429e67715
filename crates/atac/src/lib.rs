//! # ATAC
//!
//! A multi-tenant event-dispatch core. Platform adapters turn inbound
//! activity into canonical events; ATAC resolves the tenant, applies rate
//! limits, finds the tenant's plugins for the event type and runs each one
//! against a shared set of backend services.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   EventContext   ┌──────────────┐  mappings  ┌─────────────┐
//! │ Transport │─────────────────▶│ Orchestrator │───────────▶│ EventRouter │
//! │ / Webhook │                  │  rate limits │            └─────────────┘
//! └───────────┘                  │              │  enrich    ┌────────────────┐
//!       ▲                        │              │───────────▶│ ContextManager │
//!       │  OrchestrationResult   │              │            └────────────────┘
//!       └────────────────────────│              │  execute   ┌──────────────────┐
//!                                └──────────────┘───────────▶│ PipelineExecutor │──▶ Plugin
//!                                       │ load / unload      └──────────────────┘      │
//!                                       ▼                                              ▼
//!                                ┌──────────────┐                           ┌──────────────────┐
//!                                │ PluginLoader │                           │ ServiceContainer │
//!                                └──────────────┘                           └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use atac::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = AtacRuntime::new();
//!     runtime.services().set::<dyn CacheService>(names::CACHE, Arc::new(MemoryCache::new()));
//!     runtime.register_builtin_plugins();
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use atac_core as core;
pub use atac_framework as framework;
pub use atac_runtime as runtime;

/// Commonly used types for embedding the dispatch core and writing plugins.
pub mod prelude {
    // Runtime - main entry point
    pub use atac_runtime::{AtacConfig, AtacRuntime, WebhookIngress, WebhookRoute};

    // Orchestration
    pub use atac_framework::{
        DeliveryPolicy, OrchestrationResult, Orchestrator, PluginContext, RateLimitSettings,
        RateLimits,
    };

    // Plugin authoring
    pub use atac_framework::{Plugin, PluginDescriptor, PluginLoadContext, PluginMetadata};

    // Data model and errors
    pub use atac_core::prelude::*;
    pub use atac_core::Embed;

    // Backend services
    pub use atac_core::services::{
        CacheService, DataService, LlmService, MemoryCache, MemoryDataStore, RagService,
    };

    pub use std::sync::Arc;
}
