//! Plugin descriptor: metadata plus a constructor.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use atac_core::BoxError;

use super::core::{Plugin, PluginLoadContext};

// ─── PluginMetadata ───────────────────────────────────────────────────────────

/// Descriptive metadata registered for every plugin id.
///
/// `required_services` names entries of the service container; only those are
/// visible to the plugin at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required_services: Vec<String>,
}

impl PluginMetadata {
    /// Creates metadata with version `0.0.0` and no required services.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: "0.0.0".into(),
            description: None,
            required_services: Vec::new(),
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declares required service names.
    pub fn requires<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_services
            .extend(services.into_iter().map(Into::into));
        self
    }
}

// ─── PluginDescriptor ─────────────────────────────────────────────────────────

/// Async constructor stored in a [`PluginDescriptor`].
pub type PluginFactory = Arc<
    dyn Fn(PluginLoadContext) -> BoxFuture<'static, Result<Arc<dyn Plugin>, BoxError>>
        + Send
        + Sync,
>;

/// Registry-driven handle that identifies and constructs a plugin.
///
/// Descriptors are collected into a table at startup and registered with the
/// [`PluginLoader`](super::PluginLoader); the loader calls the factory when
/// the plugin is loaded.
///
/// ```rust,ignore
/// let desc = PluginDescriptor::new(
///     PluginMetadata::new("echo", "Echo").requires(["cache"]),
///     |ctx| async move { Ok(Arc::new(EchoPlugin::new(ctx)) as Arc<dyn Plugin>) },
/// );
/// ```
#[derive(Clone)]
pub struct PluginDescriptor {
    pub metadata: PluginMetadata,
    factory: PluginFactory,
}

impl PluginDescriptor {
    pub fn new<F, Fut>(metadata: PluginMetadata, factory: F) -> Self
    where
        F: Fn(PluginLoadContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn Plugin>, BoxError>> + Send + 'static,
    {
        Self {
            metadata,
            factory: Arc::new(move |ctx| Box::pin(factory(ctx))),
        }
    }

    /// Plugin id.
    #[inline]
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    /// Runs the factory.
    pub async fn instantiate(&self, ctx: PluginLoadContext) -> Result<Arc<dyn Plugin>, BoxError> {
        (self.factory)(ctx).await
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}
