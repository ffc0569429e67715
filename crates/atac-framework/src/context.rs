//! Per-invocation plugin context.
//!
//! - [`PluginContext`] - an [`EventContext`] plus the shared service
//!   container, the mapping's config bag and the response the plugin fills in.
//! - [`ContextManager`] - builds plugin contexts from events and provides
//!   copy-on-write helpers used when a context is branched (fan-out).

use std::sync::Arc;

use serde_json::Value;

use atac_core::{EventContext, EventMapping, Payload, PluginResponse, ServiceContainer};

/// Payload key under which context metadata is stored.
pub const METADATA_KEY: &str = "_metadata";

// =============================================================================
// PluginContext
// =============================================================================

/// What a plugin sees during one `execute` call.
#[derive(Debug, Clone)]
pub struct PluginContext {
    /// The inbound event, copied.
    pub event: EventContext,
    /// Shared service container.
    pub services: Arc<ServiceContainer>,
    /// Merged mapping config.
    pub config: Payload,
    /// Output populated by the plugin.
    pub response: PluginResponse,
}

impl PluginContext {
    /// Creates a context with an empty config and response.
    pub fn new(event: EventContext, services: Arc<ServiceContainer>) -> Self {
        Self {
            event,
            services,
            config: Payload::new(),
            response: PluginResponse::default(),
        }
    }

    /// Sets the response message text.
    pub fn reply(&mut self, message: impl Into<String>) {
        self.response.message = Some(message.into());
    }

    /// Returns a config entry as a string slice.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    /// Overlays `overrides` onto the config; later keys win.
    pub fn merge_config(&mut self, overrides: &Payload) {
        self.config
            .extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

// =============================================================================
// ContextManager
// =============================================================================

/// Turns inbound events into plugin contexts.
#[derive(Debug, Clone)]
pub struct ContextManager {
    services: Arc<ServiceContainer>,
}

impl ContextManager {
    pub fn new(services: Arc<ServiceContainer>) -> Self {
        Self { services }
    }

    /// Builds the context for one mapping: event fields copied, shared
    /// container attached, `config` taken from the mapping, empty response.
    pub fn enrich(&self, event: &EventContext, mapping: &EventMapping) -> PluginContext {
        PluginContext {
            event: event.clone(),
            services: Arc::clone(&self.services),
            config: mapping.config.clone(),
            response: PluginResponse::default(),
        }
    }

    /// Independent copy of `ctx`; mutating the copy leaves `ctx` untouched.
    pub fn clone_context(&self, ctx: &PluginContext) -> PluginContext {
        ctx.clone()
    }

    /// Returns a copy of `ctx` whose `payload._metadata` has `metadata` merged
    /// in. `ctx` itself is not modified.
    pub fn add_metadata(&self, ctx: &PluginContext, metadata: Payload) -> PluginContext {
        let mut merged = self.metadata(ctx);
        merged.extend(metadata);

        let mut branched = ctx.clone();
        branched
            .event
            .payload
            .insert(METADATA_KEY.to_string(), Value::Object(merged));
        branched
    }

    /// Metadata stored in `payload._metadata`, or an empty map.
    pub fn metadata(&self, ctx: &PluginContext) -> Payload {
        match ctx.event.payload.get(METADATA_KEY) {
            Some(Value::Object(map)) => map.clone(),
            _ => Payload::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atac_core::EventType;
    use serde_json::json;

    fn manager() -> ContextManager {
        ContextManager::new(Arc::new(ServiceContainer::new()))
    }

    #[test]
    fn test_enrich_copies_event_and_mapping_config() {
        let event = EventContext::new("acme", EventType::Slash)
            .with_user("u1")
            .with_payload("message", "hi");
        let mapping = EventMapping::new(EventType::Slash, "chat").with_config("use_rag", true);

        let ctx = manager().enrich(&event, &mapping);
        assert_eq!(ctx.event, event);
        assert_eq!(ctx.config["use_rag"], json!(true));
        assert!(ctx.response.is_empty());
    }

    #[test]
    fn test_add_metadata_is_copy_on_write() {
        let manager = manager();
        let event = EventContext::new("acme", EventType::Cron);
        let ctx = manager.enrich(&event, &EventMapping::new(EventType::Cron, "reminder"));

        let mut first = Payload::new();
        first.insert("attempt".into(), json!(1));
        let branched = manager.add_metadata(&ctx, first);

        let mut second = Payload::new();
        second.insert("source".into(), json!("retry"));
        let branched = manager.add_metadata(&branched, second);

        assert!(manager.metadata(&ctx).is_empty());
        let meta = manager.metadata(&branched);
        assert_eq!(meta["attempt"], json!(1));
        assert_eq!(meta["source"], json!("retry"));
    }

    #[test]
    fn test_clone_context_is_independent() {
        let manager = manager();
        let ctx = manager.enrich(
            &EventContext::new("acme", EventType::Slash),
            &EventMapping::new(EventType::Slash, "chat"),
        );
        let mut copy = manager.clone_context(&ctx);
        copy.reply("changed");
        copy.config.insert("k".into(), json!("v"));

        assert!(ctx.response.is_empty());
        assert!(ctx.config.is_empty());
        assert!(Arc::ptr_eq(&ctx.services, &copy.services));
    }
}
