//! Runtime bootstrap.
//!
//! [`AtacRuntime`] turns an [`AtacConfig`] into a running dispatch core:
//! logging is installed, the service container and orchestrator are created,
//! webhook routes and per-plugin config are registered, and `start` loads
//! every configured tenant.
//!
//! ```rust,ignore
//! let runtime = AtacRuntime::builder()
//!     .config_file("deploy/atac.toml")
//!     .profile("production")
//!     .build()?;
//!
//! runtime.services().register(names::LLM, || async { /* ... */ });
//! runtime.register_builtin_plugins();
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::signal;
use tracing::{debug, info, warn};

use atac_core::{EventContext, ServiceContainer};
use atac_framework::plugin::builtin;
use atac_framework::{OrchestrationResult, Orchestrator, PluginDescriptor};

use crate::config::{AtacConfig, ConfigLoader, ConfigResult};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::webhook::WebhookIngress;

/// Period of the background sweep that drops closed rate-limit windows.
pub const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// The ATAC runtime.
pub struct AtacRuntime {
    config: AtacConfig,
    services: Arc<ServiceContainer>,
    orchestrator: Arc<Orchestrator>,
    webhooks: Arc<WebhookIngress>,
    running: AtomicBool,
}

impl AtacRuntime {
    /// Loads configuration from the current directory, falling back to
    /// defaults when loading fails.
    pub fn new() -> Self {
        let config = ConfigLoader::new()
            .with_current_dir()
            .load()
            .unwrap_or_else(|e| {
                eprintln!("Warning: Failed to load config ({e}), using defaults");
                AtacConfig::default()
            });

        Self::from_config(&config)
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from an already loaded configuration.
    pub fn from_config(config: &AtacConfig) -> Self {
        logging::init_from_config(&config.logging);

        let services = Arc::new(ServiceContainer::new());
        let orchestrator = Arc::new(Orchestrator::with_rate_limits(
            Arc::clone(&services),
            config.rate_limits,
        ));

        for (plugin_id, plugin_config) in &config.plugins {
            orchestrator
                .plugin_loader()
                .set_config(plugin_id.as_str(), plugin_config.clone());
        }

        let webhooks = Arc::new(WebhookIngress::new(Arc::clone(&orchestrator)));
        for route in &config.webhooks {
            webhooks.register_route(route.clone());
        }

        info!(
            log_level = %config.logging.level,
            customers = config.customers.len(),
            webhooks = config.webhooks.len(),
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
            services,
            orchestrator,
            webhooks,
            running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &AtacConfig {
        &self.config
    }

    /// Container backend services are registered in.
    pub fn services(&self) -> &Arc<ServiceContainer> {
        &self.services
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn webhooks(&self) -> &Arc<WebhookIngress> {
        &self.webhooks
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Plugins
    // =========================================================================

    pub fn register_plugin(&self, descriptor: PluginDescriptor) {
        self.orchestrator.register_plugin(descriptor);
    }

    pub fn register_plugins(&self, descriptors: impl IntoIterator<Item = PluginDescriptor>) {
        for descriptor in descriptors {
            self.register_plugin(descriptor);
        }
    }

    /// Registers `chat` and `reminder`.
    pub fn register_builtin_plugins(&self) {
        self.register_plugins(builtin::descriptors());
    }

    /// Routes one event through the orchestrator.
    pub async fn route_event(&self, event: &EventContext) -> OrchestrationResult {
        self.orchestrator.route_event(event).await
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Loads the configured tenants and their plugins and starts the
    /// rate-limit sweep.
    pub async fn start(&self) -> RuntimeResult<()> {
        if self.orchestrator.is_shut_down() {
            return Err(RuntimeError::Stopped);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Runtime is already running");
            return Ok(());
        }

        info!("Starting ATAC runtime");
        if let Err(e) = self
            .orchestrator
            .load_customer_configs(self.config.customers.iter().cloned())
            .await
        {
            self.running.store(false, Ordering::SeqCst);
            return Err(e.into());
        }

        self.spawn_rate_limit_sweep();
        info!(
            customers = self.config.customers.len(),
            plugins = self.orchestrator.registered_plugins().len(),
            "Runtime started"
        );
        Ok(())
    }

    fn spawn_rate_limit_sweep(&self) {
        let orchestrator = Arc::clone(&self.orchestrator);
        let shutdown = orchestrator.shutdown_token();

        self.orchestrator.spawn_background(async move {
            let mut ticker = tokio::time::interval(RATE_LIMIT_CLEANUP_INTERVAL);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = orchestrator.cleanup_rate_limits();
                        if removed > 0 {
                            debug!(removed, "Closed rate-limit windows dropped");
                        }
                    }
                }
            }
        });
    }

    /// Shuts the orchestrator down: background tasks drain, plugins unload.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Runtime is not running");
            return;
        }

        info!("Stopping ATAC runtime");
        self.orchestrator.shutdown().await;
        info!("Runtime stopped");
    }

    /// Runs until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.start().await?;
        info!("ATAC runtime is now running. Press Ctrl+C to stop.");

        let signal = wait_for_shutdown().await;
        self.stop().await;
        signal
    }

    /// Runs until `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        self.stop().await;
        Ok(())
    }
}

impl Default for AtacRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AtacRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtacRuntime")
            .field("orchestrator", &self.orchestrator)
            .field("webhooks", &self.webhooks)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Waits for Ctrl+C or, on unix, SIGTERM.
async fn wait_for_shutdown() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for an [`AtacRuntime`] with custom configuration sources.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    pub fn merge(mut self, config: AtacConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    pub fn build(self) -> ConfigResult<AtacRuntime> {
        let config = self.config_loader.load()?;
        Ok(AtacRuntime::from_config(&config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
