//! Plugin registry and lifecycle management.
//!
//! [`PluginLoader`] owns one [`PluginEntry`] per registered plugin id and
//! drives the per-plugin state machine:
//!
//! ```text
//! register() ──► Unloaded
//!     load() ──► Loading ──► Loaded     (factory succeeded)
//!                        └─► Error      (service resolution or factory failed)
//!   unload() ──► Unloaded               (Loaded → Unloaded, cleanup errors logged)
//! ```
//!
//! Load and unload of the same id are serialized on a per-entry async mutex.
//! The status is flipped to `Loading` before the factory runs and the instance
//! is published together with `Loaded` in a single write, so readers never
//! observe a `Loaded` entry without an instance.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use atac_core::{AtacError, AtacResult, ServiceContainer};

use super::core::{Plugin, PluginLoadContext};
use super::descriptor::{PluginDescriptor, PluginMetadata};

/// Lifecycle status of a registered plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginStatus {
    /// Registered, no instance.
    Unloaded,
    /// Factory in flight, no instance yet.
    Loading,
    /// Live instance available.
    Loaded,
    /// The last load failed, no instance.
    Error,
}

// =============================================================================
// PluginEntry (internal)
// =============================================================================

struct PluginEntry {
    descriptor: PluginDescriptor,
    status: PluginStatus,
    instance: Option<Arc<dyn Plugin>>,
    transition: Arc<AsyncMutex<()>>,
}

impl PluginEntry {
    fn new(descriptor: PluginDescriptor) -> Self {
        Self {
            descriptor,
            status: PluginStatus::Unloaded,
            instance: None,
            transition: Arc::new(AsyncMutex::new(())),
        }
    }
}

fn find<'a>(plugins: &'a [PluginEntry], plugin_id: &str) -> Option<&'a PluginEntry> {
    plugins.iter().find(|e| e.descriptor.id() == plugin_id)
}

fn find_mut<'a>(
    plugins: &'a mut [PluginEntry],
    plugin_id: &str,
) -> Option<&'a mut PluginEntry> {
    plugins.iter_mut().find(|e| e.descriptor.id() == plugin_id)
}

// =============================================================================
// PluginLoader
// =============================================================================

/// Registry of plugin descriptors and their live instances.
///
/// # Plugin configuration
///
/// `load(id, None)` falls back to the config registered through
/// [`set_config`](Self::set_config) (typically `plugins.<id>` from the
/// runtime configuration file).
pub struct PluginLoader {
    services: Arc<ServiceContainer>,
    plugins: RwLock<Vec<PluginEntry>>,
    plugin_configs: RwLock<HashMap<String, Value>>,
}

impl PluginLoader {
    /// Creates an empty loader resolving services from `services`.
    pub fn new(services: Arc<ServiceContainer>) -> Self {
        Self {
            services,
            plugins: RwLock::new(Vec::new()),
            plugin_configs: RwLock::new(HashMap::new()),
        }
    }

    // ─── Registration ────────────────────────────────────────────────────────

    /// Inserts or overwrites the entry for the descriptor's id in `Unloaded`
    /// state with no instance.
    ///
    /// Overwriting a loaded plugin drops its instance without running
    /// `cleanup`; call [`unload`](Self::unload) first.
    pub fn register(&self, descriptor: PluginDescriptor) {
        let id = descriptor.id().to_string();
        let mut plugins = self.plugins.write();
        match find_mut(&mut plugins, &id) {
            Some(entry) => {
                if entry.instance.is_some() {
                    warn!(plugin = %id, "Re-registering a loaded plugin; instance dropped");
                }
                *entry = PluginEntry::new(descriptor);
            }
            None => plugins.push(PluginEntry::new(descriptor)),
        }
        drop(plugins);
        info!(plugin = %id, "Plugin registered");
    }

    /// Stores the default config used when `load` is called without one.
    pub fn set_config(&self, plugin_id: impl Into<String>, config: Value) {
        self.plugin_configs.write().insert(plugin_id.into(), config);
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    /// Acquires the transition lock of `plugin_id`'s current entry.
    async fn lock_entry(
        &self,
        plugin_id: &str,
    ) -> Option<(Arc<AsyncMutex<()>>, OwnedMutexGuard<()>)> {
        loop {
            let transition = {
                let plugins = self.plugins.read();
                Arc::clone(&find(&plugins, plugin_id)?.transition)
            };
            let guard = Arc::clone(&transition).lock_owned().await;

            let current = {
                let plugins = self.plugins.read();
                find(&plugins, plugin_id).map(|e| Arc::clone(&e.transition))
            };
            match current {
                Some(current) if Arc::ptr_eq(&current, &transition) => {
                    return Some((transition, guard));
                }
                Some(_) => continue,
                None => return None,
            }
        }
    }

    /// Loads `plugin_id`.
    ///
    /// No-op when already `Loaded`. Resolves a reduced container holding only
    /// the declared required services that exist in the parent container,
    /// then runs the factory with it and `config`.
    ///
    /// # Errors
    ///
    /// - [`AtacError::PluginNotFound`] if no descriptor is registered
    /// - [`AtacError::PluginLoadFailed`] if a service or the factory failed;
    ///   the entry is left in `Error`
    pub async fn load(&self, plugin_id: &str, config: Option<Value>) -> AtacResult<()> {
        let not_found = || AtacError::PluginNotFound {
            plugin_id: plugin_id.to_string(),
        };
        let (transition, _guard) = self.lock_entry(plugin_id).await.ok_or_else(not_found)?;

        let descriptor = {
            let mut plugins = self.plugins.write();
            let entry = find_mut(&mut plugins, plugin_id).ok_or_else(not_found)?;
            if entry.status == PluginStatus::Loaded {
                debug!(plugin = %plugin_id, "Plugin already loaded");
                return Ok(());
            }
            entry.status = PluginStatus::Loading;
            entry.descriptor.clone()
        };
        let config = config.or_else(|| self.plugin_configs.read().get(plugin_id).cloned());

        info!(plugin = %plugin_id, "Loading plugin");

        let result = match self
            .required_services(&descriptor.metadata.required_services)
            .await
        {
            Ok(services) => descriptor
                .instantiate(PluginLoadContext::new(plugin_id, services, config))
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        let mut plugins = self.plugins.write();
        let entry = find_mut(&mut plugins, plugin_id)
            .filter(|e| Arc::ptr_eq(&e.transition, &transition));
        let Some(entry) = entry else {
            warn!(plugin = %plugin_id, "Plugin re-registered while loading; instance discarded");
            return Err(AtacError::PluginLoadFailed {
                plugin_id: plugin_id.to_string(),
                error: "plugin was re-registered while loading".into(),
            });
        };

        match result {
            Ok(instance) => {
                entry.instance = Some(instance);
                entry.status = PluginStatus::Loaded;
                info!(plugin = %plugin_id, "Plugin loaded");
                Ok(())
            }
            Err(error) => {
                entry.instance = None;
                entry.status = PluginStatus::Error;
                error!(plugin = %plugin_id, error = %error, "Plugin load failed");
                Err(AtacError::PluginLoadFailed {
                    plugin_id: plugin_id.to_string(),
                    error,
                })
            }
        }
    }

    /// Builds the container a plugin is constructed with.
    async fn required_services(&self, names: &[String]) -> AtacResult<Arc<ServiceContainer>> {
        let subset = ServiceContainer::new();
        for name in names {
            if self.services.has(name) {
                subset.set_raw(name.clone(), self.services.get_raw(name).await?);
            } else {
                debug!(service = %name, "Required service not registered; skipped");
            }
        }
        Ok(Arc::new(subset))
    }

    /// Runs the plugin's `initialize` hook.
    ///
    /// # Errors
    ///
    /// - [`AtacError::PluginNotLoaded`] if there is no live instance
    /// - [`AtacError::PluginInitFailed`] wrapping the hook's failure
    pub async fn initialize(&self, plugin_id: &str) -> AtacResult<()> {
        let instance = self.instance(plugin_id).ok_or_else(|| AtacError::PluginNotLoaded {
            plugin_id: plugin_id.to_string(),
        })?;

        info!(plugin = %plugin_id, "Initializing plugin");
        instance.initialize().await.map_err(|e| {
            error!(plugin = %plugin_id, error = %e, "Plugin initialization failed");
            AtacError::PluginInitFailed {
                plugin_id: plugin_id.to_string(),
                error: e.to_string(),
            }
        })?;
        info!(plugin = %plugin_id, "Plugin initialized");
        Ok(())
    }

    /// Runs `cleanup`, then clears the instance and resets to `Unloaded`.
    ///
    /// Does nothing for unknown ids or entries without an instance. A failing
    /// cleanup hook is logged; the unload still completes.
    pub async fn unload(&self, plugin_id: &str) {
        let Some((transition, _guard)) = self.lock_entry(plugin_id).await else {
            return;
        };
        let Some(instance) = self.instance(plugin_id) else {
            return;
        };

        info!(plugin = %plugin_id, "Unloading plugin");
        if let Err(e) = instance.cleanup().await {
            error!(plugin = %plugin_id, error = %e, "Plugin cleanup failed");
        }

        let mut plugins = self.plugins.write();
        if let Some(entry) = find_mut(&mut plugins, plugin_id)
            .filter(|e| Arc::ptr_eq(&e.transition, &transition))
        {
            entry.instance = None;
            entry.status = PluginStatus::Unloaded;
        }
        drop(plugins);
        info!(plugin = %plugin_id, "Plugin unloaded");
    }

    /// Unloads every registered plugin, in registration order.
    pub async fn unload_all(&self) {
        for plugin_id in self.registered_plugins() {
            self.unload(&plugin_id).await;
        }
    }

    // ─── Lookup ──────────────────────────────────────────────────────────────

    fn instance(&self, plugin_id: &str) -> Option<Arc<dyn Plugin>> {
        find(&self.plugins.read(), plugin_id).and_then(|e| e.instance.clone())
    }

    /// Returns the live instance.
    ///
    /// # Errors
    ///
    /// [`AtacError::PluginNotFound`] for unknown ids,
    /// [`AtacError::PluginNotLoaded`] when there is no instance.
    pub fn get(&self, plugin_id: &str) -> AtacResult<Arc<dyn Plugin>> {
        let plugins = self.plugins.read();
        let entry = find(&plugins, plugin_id).ok_or_else(|| AtacError::PluginNotFound {
            plugin_id: plugin_id.to_string(),
        })?;
        entry
            .instance
            .clone()
            .ok_or_else(|| AtacError::PluginNotLoaded {
                plugin_id: plugin_id.to_string(),
            })
    }

    /// Returns `true` if the plugin is `Loaded` with a live instance.
    pub fn is_loaded(&self, plugin_id: &str) -> bool {
        find(&self.plugins.read(), plugin_id)
            .is_some_and(|e| e.status == PluginStatus::Loaded && e.instance.is_some())
    }

    /// Returns the status of `plugin_id`, or `None` if unregistered.
    pub fn status(&self, plugin_id: &str) -> Option<PluginStatus> {
        find(&self.plugins.read(), plugin_id).map(|e| e.status)
    }

    /// Returns the registered metadata of `plugin_id`.
    pub fn metadata(&self, plugin_id: &str) -> Option<PluginMetadata> {
        find(&self.plugins.read(), plugin_id).map(|e| e.descriptor.metadata.clone())
    }

    /// Registered plugin ids, in registration order.
    pub fn registered_plugins(&self) -> Vec<String> {
        self.plugins
            .read()
            .iter()
            .map(|e| e.descriptor.id().to_string())
            .collect()
    }

    /// Number of registered plugins (in any state).
    pub fn len(&self) -> usize {
        self.plugins.read().len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.plugins.read().is_empty()
    }
}

impl std::fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let plugins = self.plugins.read();
        f.debug_struct("PluginLoader")
            .field(
                "plugins",
                &plugins
                    .iter()
                    .map(|e| (e.descriptor.id(), e.status))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use atac_core::BoxError;
    use tokio::sync::Notify;

    use crate::context::PluginContext;

    #[derive(Default)]
    struct Counters {
        constructed: AtomicUsize,
        cleanups: AtomicUsize,
    }

    struct Probe {
        metadata: PluginMetadata,
        fail_init: bool,
        fail_cleanup: bool,
        counters: Arc<Counters>,
    }

    #[async_trait]
    impl Plugin for Probe {
        fn manifest(&self) -> &PluginMetadata {
            &self.metadata
        }

        async fn initialize(&self) -> Result<(), BoxError> {
            if self.fail_init {
                return Err("warmup failed".into());
            }
            Ok(())
        }

        async fn execute(&self, ctx: &mut PluginContext) -> Result<(), BoxError> {
            ctx.reply("ok");
            Ok(())
        }

        async fn cleanup(&self) -> Result<(), BoxError> {
            self.counters.cleanups.fetch_add(1, Ordering::SeqCst);
            if self.fail_cleanup {
                return Err("socket already closed".into());
            }
            Ok(())
        }
    }

    fn probe(id: &str, counters: &Arc<Counters>) -> PluginDescriptor {
        probe_with(id, counters, false, false)
    }

    fn probe_with(
        id: &str,
        counters: &Arc<Counters>,
        fail_init: bool,
        fail_cleanup: bool,
    ) -> PluginDescriptor {
        let counters = Arc::clone(counters);
        PluginDescriptor::new(PluginMetadata::new(id, id), move |ctx| {
            let counters = Arc::clone(&counters);
            async move {
                counters.constructed.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(Probe {
                    metadata: PluginMetadata::new(ctx.plugin_id(), ctx.plugin_id()),
                    fail_init,
                    fail_cleanup,
                    counters,
                }) as Arc<dyn Plugin>)
            }
        })
    }

    fn loader() -> PluginLoader {
        PluginLoader::new(Arc::new(ServiceContainer::new()))
    }

    #[tokio::test]
    async fn test_load_unknown_plugin() {
        let err = loader().load("ghost", None).await.unwrap_err();
        assert_eq!(
            err,
            AtacError::PluginNotFound {
                plugin_id: "ghost".into()
            }
        );
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let counters = Arc::new(Counters::default());
        let loader = loader();
        loader.register(probe("chat", &counters));
        assert_eq!(loader.status("chat"), Some(PluginStatus::Unloaded));

        loader.load("chat", None).await.unwrap();
        loader.load("chat", None).await.unwrap();

        assert!(loader.is_loaded("chat"));
        assert_eq!(loader.status("chat"), Some(PluginStatus::Loaded));
        assert_eq!(counters.constructed.load(Ordering::SeqCst), 1);
        assert!(loader.get("chat").is_ok());
    }

    #[tokio::test]
    async fn test_factory_failure_sets_error() {
        let loader = loader();
        loader.register(PluginDescriptor::new(
            PluginMetadata::new("broken", "Broken"),
            |_| async { Err::<Arc<dyn Plugin>, BoxError>("missing api key".into()) },
        ));

        let err = loader.load("broken", None).await.unwrap_err();
        assert_eq!(err.code(), atac_core::ErrorCode::PluginLoadFailed);
        assert_eq!(err.details()["error"], "missing api key");
        assert_eq!(loader.status("broken"), Some(PluginStatus::Error));
        assert_eq!(
            loader.get("broken").err(),
            Some(AtacError::PluginNotLoaded {
                plugin_id: "broken".into()
            })
        );
    }

    #[tokio::test]
    async fn test_reduced_container_only_exposes_declared_services() {
        let services = Arc::new(ServiceContainer::new());
        services.set("llm", Arc::new(String::from("llm")));
        services.set("cache", Arc::new(String::from("cache")));
        let loader = PluginLoader::new(services);

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        loader.register(PluginDescriptor::new(
            PluginMetadata::new("chat", "Chat").requires(["llm", "rag"]),
            move |ctx| {
                *sink.lock() = ctx.services().registered_services();
                let counters = Arc::new(Counters::default());
                async move {
                    Ok(Arc::new(Probe {
                        metadata: PluginMetadata::new("chat", "Chat"),
                        fail_init: false,
                        fail_cleanup: false,
                        counters,
                    }) as Arc<dyn Plugin>)
                }
            },
        ));

        loader.load("chat", None).await.unwrap();
        assert_eq!(*seen.lock(), ["llm"]);
    }

    #[tokio::test]
    async fn test_config_fallback() {
        let loader = loader();
        loader.set_config("reminder", serde_json::json!({ "message": "stand-up" }));

        let seen = Arc::new(parking_lot::Mutex::new(None));
        let sink = Arc::clone(&seen);
        loader.register(PluginDescriptor::new(
            PluginMetadata::new("reminder", "Reminder"),
            move |ctx| {
                *sink.lock() = ctx.raw_config().cloned();
                let counters = Arc::new(Counters::default());
                async move {
                    Ok(Arc::new(Probe {
                        metadata: PluginMetadata::new("reminder", "Reminder"),
                        fail_init: false,
                        fail_cleanup: false,
                        counters,
                    }) as Arc<dyn Plugin>)
                }
            },
        ));

        loader.load("reminder", None).await.unwrap();
        assert_eq!(
            seen.lock().clone(),
            Some(serde_json::json!({ "message": "stand-up" }))
        );
    }

    #[tokio::test]
    async fn test_loading_is_never_observed_as_loaded() {
        let loader = Arc::new(loader());
        let gate = Arc::new(Notify::new());
        let entered = Arc::new(Notify::new());

        let (g, e) = (Arc::clone(&gate), Arc::clone(&entered));
        loader.register(PluginDescriptor::new(
            PluginMetadata::new("slow", "Slow"),
            move |_| {
                let (gate, entered) = (Arc::clone(&g), Arc::clone(&e));
                async move {
                    entered.notify_one();
                    gate.notified().await;
                    Ok(Arc::new(Probe {
                        metadata: PluginMetadata::new("slow", "Slow"),
                        fail_init: false,
                        fail_cleanup: false,
                        counters: Arc::new(Counters::default()),
                    }) as Arc<dyn Plugin>)
                }
            },
        ));

        let task = {
            let loader = Arc::clone(&loader);
            tokio::spawn(async move { loader.load("slow", None).await })
        };
        entered.notified().await;

        assert_eq!(loader.status("slow"), Some(PluginStatus::Loading));
        assert!(!loader.is_loaded("slow"));
        assert!(matches!(
            loader.get("slow"),
            Err(AtacError::PluginNotLoaded { .. })
        ));

        gate.notify_one();
        task.await.unwrap().unwrap();
        assert!(loader.is_loaded("slow"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_loads_construct_once() {
        let counters = Arc::new(Counters::default());
        let loader = Arc::new(loader());
        loader.register(probe("chat", &counters));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let loader = Arc::clone(&loader);
                tokio::spawn(async move { loader.load("chat", None).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(counters.constructed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_initialize() {
        let counters = Arc::new(Counters::default());
        let loader = loader();
        loader.register(probe_with("flaky", &counters, true, false));

        assert_eq!(
            loader.initialize("flaky").await.unwrap_err(),
            AtacError::PluginNotLoaded {
                plugin_id: "flaky".into()
            }
        );

        loader.load("flaky", None).await.unwrap();
        let err = loader.initialize("flaky").await.unwrap_err();
        assert_eq!(
            err,
            AtacError::PluginInitFailed {
                plugin_id: "flaky".into(),
                error: "warmup failed".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_unload_completes_when_cleanup_fails() {
        let counters = Arc::new(Counters::default());
        let loader = loader();
        loader.register(probe_with("voice", &counters, false, true));
        loader.load("voice", None).await.unwrap();

        loader.unload("voice").await;

        assert_eq!(counters.cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(loader.status("voice"), Some(PluginStatus::Unloaded));
        assert!(matches!(
            loader.get("voice"),
            Err(AtacError::PluginNotLoaded { .. })
        ));
    }

    #[tokio::test]
    async fn test_unload_all_survives_partial_failures() {
        let counters = Arc::new(Counters::default());
        let loader = loader();
        loader.register(probe_with("a", &counters, false, true));
        loader.register(probe("b", &counters));
        loader.register(probe("c", &counters));
        for id in ["a", "b"] {
            loader.load(id, None).await.unwrap();
        }

        loader.unload_all().await;

        assert_eq!(counters.cleanups.load(Ordering::SeqCst), 2);
        assert_eq!(loader.registered_plugins(), ["a", "b", "c"]);
        assert!(
            loader
                .registered_plugins()
                .iter()
                .all(|id| loader.status(id) == Some(PluginStatus::Unloaded))
        );

        // Reloading after unload constructs a fresh instance.
        loader.load("b", None).await.unwrap();
        assert_eq!(counters.constructed.load(Ordering::SeqCst), 3);
    }
}
