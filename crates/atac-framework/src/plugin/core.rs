use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use atac_core::{BoxError, ServiceContainer};

use super::descriptor::PluginMetadata;
use crate::context::PluginContext;

// ─── PluginLoadContext ────────────────────────────────────────────────────────

/// Construction input handed to a plugin factory.
///
/// Carries the **reduced** service container (only the services the plugin
/// declared in [`PluginMetadata::required_services`] and that were present at
/// load time) and the optional JSON config section for this plugin.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(serde::Deserialize, Default)]
/// #[serde(default)]
/// struct ChatConfig { model: Option<String> }
///
/// let cfg: ChatConfig = ctx.get_config()?;
/// ```
#[derive(Clone, Debug)]
pub struct PluginLoadContext {
    plugin_id: String,
    services: Arc<ServiceContainer>,
    plugin_config: Option<Arc<Value>>,
}

impl PluginLoadContext {
    pub(crate) fn new(
        plugin_id: impl Into<String>,
        services: Arc<ServiceContainer>,
        plugin_config: Option<Value>,
    ) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            services,
            plugin_config: plugin_config.map(Arc::new),
        }
    }

    /// Id of the plugin being constructed.
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// The reduced service container.
    pub fn services(&self) -> &Arc<ServiceContainer> {
        &self.services
    }

    /// Raw config value, if one was supplied.
    pub fn raw_config(&self) -> Option<&Value> {
        self.plugin_config.as_deref()
    }

    /// Deserialise the config section into `T`.
    ///
    /// An absent config deserialises from an empty object, so `T` should use
    /// `#[serde(default)]` for optional fields.
    pub fn get_config<T>(&self) -> serde_json::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        match self.plugin_config.as_deref() {
            Some(value) => T::deserialize(value),
            None => T::deserialize(Value::Object(Default::default())),
        }
    }
}

// ─── Plugin ─────────────────────────────────────────────────────────────────

/// A capability unit bound to a set of required services.
///
/// Lifecycle, driven by [`PluginLoader`](super::PluginLoader) and the
/// pipeline:
///
/// ```text
/// factory ─► initialize ─► (validate_context ─► execute)* ─► cleanup
/// ```
///
/// `execute` writes its output into [`PluginContext::response`]; that is the
/// only side channel back to the caller.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Static metadata (id, version, required services).
    fn manifest(&self) -> &PluginMetadata;

    /// One-time asynchronous setup after construction.
    async fn initialize(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Checks that the context can serve this plugin.
    ///
    /// The default fails closed when any declared required service is absent
    /// from the context's container.
    async fn validate_context(&self, ctx: &PluginContext) -> Result<bool, BoxError> {
        let missing = missing_services(self.manifest(), ctx);
        if !missing.is_empty() {
            warn!(
                plugin = %self.manifest().id,
                missing = %missing.join(", "),
                "Missing services for plugin"
            );
            return Ok(false);
        }
        Ok(true)
    }

    /// Handles one event.
    async fn execute(&self, ctx: &mut PluginContext) -> Result<(), BoxError>;

    /// Releases resources before the instance is dropped.
    async fn cleanup(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Declared services of `manifest` that `ctx.services` does not hold.
pub fn missing_services(manifest: &PluginMetadata, ctx: &PluginContext) -> Vec<String> {
    manifest
        .required_services
        .iter()
        .filter(|name| !ctx.services.has(name))
        .cloned()
        .collect()
}
