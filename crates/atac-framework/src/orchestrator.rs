//! Top-level event coordinator.
//!
//! [`Orchestrator`] wires the service container, plugin loader, event router,
//! context manager and pipeline executor together and exposes the single
//! entry point used by transport adapters:
//!
//! ```text
//! route_event(event)
//!   ├─ tenant registered?            ── no ──► CustomerNotFound
//!   ├─ user / customer rate limits   ── hit ─► AuthPermissionDenied
//!   ├─ router: matching mappings (declared order)
//!   └─ for each mapping:
//!        loader.get ─► context.enrich ─► pipeline.execute_plugin
//!        ok  ─► responses
//!        err ─► errors (remaining mappings still run)
//! ```
//!
//! `route_event` never returns an error; every failure is reported inside the
//! [`OrchestrationResult`].

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, info_span, warn};

use atac_core::{
    AtacError, AtacResult, CustomerConfig, EventContext, EventMapping, PluginResponse,
    ServiceContainer,
};

use crate::context::{ContextManager, PluginContext};
use crate::pipeline::PipelineExecutor;
use crate::plugin::{PluginDescriptor, PluginLoader, PluginStatus};
use crate::rate_limit::{RateLimiter, RateLimits};
use crate::router::EventRouter;

/// Message delivered in place of plugin output when every mapping failed.
pub const GENERIC_FAILURE_MESSAGE: &str =
    "Sorry, something went wrong while handling your request. Please try again later.";

// =============================================================================
// OrchestrationResult
// =============================================================================

/// Aggregate outcome of one [`Orchestrator::route_event`] call.
#[derive(Debug, Clone)]
pub struct OrchestrationResult {
    /// `false` as soon as any error was recorded.
    pub success: bool,
    /// One context per successfully executed mapping, in mapping order.
    pub responses: Vec<PluginContext>,
    pub errors: Vec<AtacError>,
}

impl Default for OrchestrationResult {
    fn default() -> Self {
        Self {
            success: true,
            responses: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl OrchestrationResult {
    fn record_error(&mut self, error: AtacError) {
        self.success = false;
        self.errors.push(error);
    }

    /// Responses to send back to the user under `policy`.
    ///
    /// Contexts whose plugin produced nothing are skipped. When there is no
    /// response at all but errors were recorded, a single
    /// [`GENERIC_FAILURE_MESSAGE`] is returned.
    pub fn deliveries(&self, policy: DeliveryPolicy) -> Vec<PluginResponse> {
        let mut produced = self
            .responses
            .iter()
            .map(|ctx| &ctx.response)
            .filter(|response| !response.is_empty());

        let deliveries: Vec<PluginResponse> = match policy {
            DeliveryPolicy::First => produced.next().cloned().into_iter().collect(),
            DeliveryPolicy::All => produced.cloned().collect(),
            DeliveryPolicy::Merge => {
                let mut merged = PluginResponse::default();
                let mut texts = Vec::new();
                for response in produced {
                    texts.extend(response.message.clone());
                    merged.embeds.extend(response.embeds.iter().cloned());
                    merged.attachments.extend(response.attachments.iter().cloned());
                }
                if !texts.is_empty() {
                    merged.message = Some(texts.join("\n\n"));
                }
                if merged.is_empty() {
                    Vec::new()
                } else {
                    vec![merged]
                }
            }
        };

        if deliveries.is_empty() && self.responses.is_empty() && !self.errors.is_empty() {
            return vec![PluginResponse::text(GENERIC_FAILURE_MESSAGE)];
        }
        deliveries
    }
}

/// How a transport turns several plugin responses into outbound messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryPolicy {
    /// Only the first non-empty response.
    #[default]
    First,
    /// Every non-empty response, in mapping order.
    All,
    /// One response: texts joined by a blank line, embeds and attachments
    /// concatenated.
    Merge,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Central coordinator for tenant routing, plugin execution and shutdown.
///
/// Shared as `Arc<Orchestrator>`; all methods take `&self`.
pub struct Orchestrator {
    services: Arc<ServiceContainer>,
    context_manager: ContextManager,
    plugin_loader: PluginLoader,
    event_router: EventRouter,
    pipeline: PipelineExecutor,
    user_limiter: RateLimiter,
    customer_limiter: RateLimiter,
    tasks: TaskTracker,
    shutdown_token: CancellationToken,
    /// Held while spawning and while closing the tracker.
    shut_down: Mutex<bool>,
}

impl Orchestrator {
    /// Creates an orchestrator with the default rate limits.
    pub fn new(services: Arc<ServiceContainer>) -> Self {
        Self::with_rate_limits(services, RateLimits::default())
    }

    /// Creates an orchestrator with explicit rate limits.
    pub fn with_rate_limits(services: Arc<ServiceContainer>, limits: RateLimits) -> Self {
        Self {
            context_manager: ContextManager::new(Arc::clone(&services)),
            plugin_loader: PluginLoader::new(Arc::clone(&services)),
            event_router: EventRouter::new(),
            pipeline: PipelineExecutor::new(),
            user_limiter: RateLimiter::new(limits.user),
            customer_limiter: RateLimiter::new(limits.customer),
            tasks: TaskTracker::new(),
            shutdown_token: CancellationToken::new(),
            shut_down: Mutex::new(false),
            services,
        }
    }

    // ─── Accessors ───────────────────────────────────────────────────────────

    pub fn services(&self) -> &Arc<ServiceContainer> {
        &self.services
    }

    pub fn plugin_loader(&self) -> &PluginLoader {
        &self.plugin_loader
    }

    pub fn event_router(&self) -> &EventRouter {
        &self.event_router
    }

    pub fn context_manager(&self) -> &ContextManager {
        &self.context_manager
    }

    pub fn pipeline(&self) -> &PipelineExecutor {
        &self.pipeline
    }

    // ─── Plugins ─────────────────────────────────────────────────────────────

    /// Registers a plugin descriptor with the loader.
    pub fn register_plugin(&self, descriptor: PluginDescriptor) {
        self.plugin_loader.register(descriptor);
    }

    pub fn registered_plugins(&self) -> Vec<String> {
        self.plugin_loader.registered_plugins()
    }

    pub fn plugin_status(&self, plugin_id: &str) -> Option<PluginStatus> {
        self.plugin_loader.status(plugin_id)
    }

    pub fn is_plugin_loaded(&self, plugin_id: &str) -> bool {
        self.plugin_loader.is_loaded(plugin_id)
    }

    // ─── Customers ───────────────────────────────────────────────────────────

    /// Registers each tenant with the router and loads, then initializes,
    /// every enabled feature that is not loaded yet.
    ///
    /// Stops at the first plugin that fails to load or initialize; tenants
    /// registered before the failure stay registered.
    pub async fn load_customer_configs<I>(&self, configs: I) -> AtacResult<()>
    where
        I: IntoIterator<Item = CustomerConfig>,
    {
        for config in configs {
            let features: Vec<String> = config.features.iter().cloned().collect();
            self.event_router.register_customer(config);

            for feature_id in features {
                if !self.plugin_loader.is_loaded(&feature_id) {
                    self.plugin_loader.load(&feature_id, None).await?;
                    self.plugin_loader.initialize(&feature_id).await?;
                }
            }
        }
        Ok(())
    }

    // ─── Routing ─────────────────────────────────────────────────────────────

    /// Routes one inbound event to every matching plugin of its tenant.
    pub async fn route_event(&self, event: &EventContext) -> OrchestrationResult {
        let span = info_span!(
            "route_event",
            event_type = %event.event_type,
            customer = %event.customer_id
        );
        self.dispatch(event).instrument(span).await
    }

    async fn dispatch(&self, event: &EventContext) -> OrchestrationResult {
        info!(user = %event.user_id, "Event received");
        let mut result = OrchestrationResult::default();

        let mappings = match self.admit(event) {
            Ok(mappings) => mappings,
            Err(e) => {
                self.handle_error(&e);
                result.record_error(e);
                return result;
            }
        };
        if mappings.is_empty() {
            return result;
        }

        info!(mappings = mappings.len(), "Event processing");
        for mapping in &mappings {
            match self.run_mapping(event, mapping).await {
                Ok(ctx) => result.responses.push(ctx),
                Err(e) => {
                    self.handle_error(&e);
                    result.record_error(e);
                }
            }
        }

        info!(
            responses = result.responses.len(),
            errors = result.errors.len(),
            "Event processed"
        );
        result
    }

    /// Tenant and rate-limit gate, then mapping resolution.
    fn admit(&self, event: &EventContext) -> AtacResult<Vec<EventMapping>> {
        if !self.event_router.has_customer(&event.customer_id) {
            return Err(AtacError::CustomerNotFound {
                customer_id: event.customer_id.clone(),
            });
        }
        if !self.user_limiter.is_allowed(&event.user_id) {
            return Err(AtacError::AuthPermissionDenied {
                reason: "Rate limit exceeded for user".into(),
                subject: event.user_id.clone(),
            });
        }
        if !self.customer_limiter.is_allowed(&event.customer_id) {
            return Err(AtacError::AuthPermissionDenied {
                reason: "Rate limit exceeded for customer".into(),
                subject: event.customer_id.clone(),
            });
        }
        self.event_router.get_event_mappings(event)
    }

    async fn run_mapping(
        &self,
        event: &EventContext,
        mapping: &EventMapping,
    ) -> AtacResult<PluginContext> {
        let plugin = self.plugin_loader.get(&mapping.feature_id)?;
        let ctx = self.context_manager.enrich(event, mapping);
        self.pipeline.execute_plugin(plugin.as_ref(), ctx).await
    }

    fn handle_error(&self, err: &AtacError) {
        if err.is_gate_rejection() {
            warn!(code = %err.code(), error = %err, "Event rejected");
        } else {
            error!(code = %err.code(), error = %err, "Event handling failed");
        }
    }

    /// Drops closed rate-limit windows. Returns the number removed.
    pub fn cleanup_rate_limits(&self) -> usize {
        self.user_limiter.cleanup() + self.customer_limiter.cleanup()
    }

    // ─── Background work & shutdown ──────────────────────────────────────────

    /// Spawns a task that [`shutdown`](Self::shutdown) waits for.
    ///
    /// Returns `None` once shutdown has begun. A task accepted here is always
    /// drained by `shutdown`. Long-running tasks should select on
    /// [`shutdown_token`](Self::shutdown_token) to exit promptly.
    pub fn spawn_background<F>(&self, task: F) -> Option<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let shut_down = self.shut_down.lock();
        if *shut_down {
            warn!("Background task rejected: orchestrator is shutting down");
            return None;
        }
        Some(self.tasks.spawn(task))
    }

    /// Token cancelled when shutdown begins.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.child_token()
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shut_down.lock()
    }

    /// Cancels the shutdown token, waits for background tasks to drain and
    /// unloads every plugin. Later calls do nothing.
    pub async fn shutdown(&self) {
        {
            let mut shut_down = self.shut_down.lock();
            if *shut_down {
                debug!("Shutdown already performed");
                return;
            }
            *shut_down = true;
            self.tasks.close();
        }

        info!("System stopping");
        self.shutdown_token.cancel();
        if !self.tasks.is_empty() {
            info!(tasks = self.tasks.len(), "Waiting for background tasks");
        }
        self.tasks.wait().await;

        self.plugin_loader.unload_all().await;
        info!("System stopped");
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("services", &self.services)
            .field("plugins", &self.plugin_loader)
            .field("customers", &self.event_router.registered_customers())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use atac_core::services::{
        DataService, FinishReason, GenerateOptions, LlmResponse, LlmService, MemoryDataStore, names,
    };
    use atac_core::{BoxError, ErrorCode, EventType, ServiceResult};

    use crate::plugin::{Plugin, PluginMetadata, builtin};
    use crate::rate_limit::RateLimitSettings;

    /// Replies `<id>:<message>`, or fails when built with `fail`.
    struct Echo {
        metadata: PluginMetadata,
        fail: bool,
        cleanups: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Plugin for Echo {
        fn manifest(&self) -> &PluginMetadata {
            &self.metadata
        }

        async fn execute(&self, ctx: &mut PluginContext) -> Result<(), BoxError> {
            if self.fail {
                return Err("backend offline".into());
            }
            let message = ctx.event.payload_str("message").unwrap_or_default();
            let reply = format!("{}:{message}", self.metadata.id);
            ctx.reply(reply);
            Ok(())
        }

        async fn cleanup(&self) -> Result<(), BoxError> {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn echo(id: &str, fail: bool, cleanups: &Arc<AtomicUsize>) -> PluginDescriptor {
        let cleanups = Arc::clone(cleanups);
        let id = id.to_string();
        PluginDescriptor::new(PluginMetadata::new(id.as_str(), id.as_str()), move |_| {
            let plugin = Arc::new(Echo {
                metadata: PluginMetadata::new(id.as_str(), id.as_str()),
                fail,
                cleanups: Arc::clone(&cleanups),
            });
            async move { Ok(plugin as Arc<dyn Plugin>) }
        })
    }

    fn slash(customer: &str, user: &str) -> EventContext {
        EventContext::new(customer, EventType::Slash)
            .with_user(user)
            .with_payload("message", "hi")
    }

    async fn orchestrator_with(
        plugins: &[(&str, bool)],
        customer: CustomerConfig,
        limits: RateLimits,
    ) -> (Orchestrator, Arc<AtomicUsize>) {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let services = Arc::new(ServiceContainer::new());
        let orchestrator = Orchestrator::with_rate_limits(services, limits);
        for (id, fail) in plugins {
            orchestrator.register_plugin(echo(id, *fail, &cleanups));
        }
        orchestrator.load_customer_configs([customer]).await.unwrap();
        (orchestrator, cleanups)
    }

    fn acme(features: &[&str]) -> CustomerConfig {
        features.iter().fold(CustomerConfig::new("acme", "Acme"), |config, id| {
            config.with_mapping(EventMapping::new(EventType::Slash, *id))
        })
    }

    #[tokio::test]
    async fn test_all_mappings_succeed_in_order() {
        let (orchestrator, _) = orchestrator_with(
            &[("a", false), ("b", false), ("c", false)],
            acme(&["c", "a", "b"]),
            RateLimits::default(),
        )
        .await;

        let result = orchestrator.route_event(&slash("acme", "u1")).await;
        assert!(result.success);
        assert!(result.errors.is_empty());
        let replies: Vec<_> = result
            .responses
            .iter()
            .filter_map(|ctx| ctx.response.message.as_deref())
            .collect();
        assert_eq!(replies, ["c:hi", "a:hi", "b:hi"]);
    }

    #[tokio::test]
    async fn test_no_matching_mapping_is_empty_success() {
        let (orchestrator, _) =
            orchestrator_with(&[("a", false)], acme(&["a"]), RateLimits::default()).await;

        let event = EventContext::new("acme", EventType::Webhook).with_user("u1");
        let result = orchestrator.route_event(&event).await;
        assert!(result.success);
        assert!(result.responses.is_empty());
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_customer_fails() {
        let (orchestrator, _) =
            orchestrator_with(&[("a", false)], acme(&["a"]), RateLimits::default()).await;

        let result = orchestrator.route_event(&slash("ghost", "u1")).await;
        assert!(!result.success);
        assert!(result.responses.is_empty());
        assert_eq!(
            result.errors,
            [AtacError::CustomerNotFound {
                customer_id: "ghost".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_failing_plugin_does_not_block_siblings() {
        let (orchestrator, _) = orchestrator_with(
            &[("a", false), ("broken", true), ("c", false)],
            acme(&["a", "broken", "c"]),
            RateLimits::default(),
        )
        .await;

        let result = orchestrator.route_event(&slash("acme", "u1")).await;
        assert!(!result.success);
        assert_eq!(result.responses.len(), 2);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code(), ErrorCode::PluginExecuteFailed);
        assert_eq!(result.errors[0].details()["plugin_id"], "broken");
    }

    #[tokio::test]
    async fn test_unregistered_plugin_reported_per_mapping() {
        let (orchestrator, _) =
            orchestrator_with(&[("a", false)], acme(&["a"]), RateLimits::default()).await;
        orchestrator.event_router().register_customer(
            CustomerConfig::new("acme", "Acme")
                .with_mapping(EventMapping::new(EventType::Slash, "ghost"))
                .with_mapping(EventMapping::new(EventType::Slash, "a")),
        );

        let result = orchestrator.route_event(&slash("acme", "u1")).await;
        assert_eq!(result.responses.len(), 1);
        assert_eq!(
            result.errors,
            [AtacError::PluginNotFound {
                plugin_id: "ghost".into()
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_rate_limit_window() {
        let limits = RateLimits {
            user: RateLimitSettings::new(2, 1_000),
            ..Default::default()
        };
        let (orchestrator, _) = orchestrator_with(&[("a", false)], acme(&["a"]), limits).await;

        for _ in 0..2 {
            assert!(orchestrator.route_event(&slash("acme", "u1")).await.success);
        }
        let blocked = orchestrator.route_event(&slash("acme", "u1")).await;
        assert!(!blocked.success);
        assert!(blocked.responses.is_empty());
        assert_eq!(blocked.errors[0].code(), ErrorCode::AuthPermissionDenied);
        assert_eq!(blocked.errors[0].details()["subject"], "u1");

        assert!(orchestrator.route_event(&slash("acme", "u2")).await.success);

        tokio::time::advance(Duration::from_millis(1_000)).await;
        assert!(orchestrator.route_event(&slash("acme", "u1")).await.success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_customer_rate_limit_window() {
        let limits = RateLimits {
            customer: RateLimitSettings::new(3, 500),
            ..Default::default()
        };
        let (orchestrator, _) = orchestrator_with(&[("a", false)], acme(&["a"]), limits).await;

        for user in ["u1", "u2", "u3"] {
            assert!(orchestrator.route_event(&slash("acme", user)).await.success);
        }
        let blocked = orchestrator.route_event(&slash("acme", "u4")).await;
        assert_eq!(
            blocked.errors,
            [AtacError::AuthPermissionDenied {
                reason: "Rate limit exceeded for customer".into(),
                subject: "acme".into(),
            }]
        );

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(orchestrator.route_event(&slash("acme", "u4")).await.success);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(orchestrator.cleanup_rate_limits(), 5);
    }

    #[tokio::test]
    async fn test_load_customer_configs_loads_once() {
        let constructed = Arc::new(AtomicUsize::new(0));
        let orchestrator = Orchestrator::new(Arc::new(ServiceContainer::new()));
        let counter = Arc::clone(&constructed);
        orchestrator.register_plugin(PluginDescriptor::new(
            PluginMetadata::new("a", "A"),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                let plugin = Arc::new(Echo {
                    metadata: PluginMetadata::new("a", "A"),
                    fail: false,
                    cleanups: Arc::new(AtomicUsize::new(0)),
                });
                async move { Ok(plugin as Arc<dyn Plugin>) }
            },
        ));

        let beta = CustomerConfig::new("beta", "Beta").with_feature("a");
        orchestrator
            .load_customer_configs([acme(&["a"]), beta])
            .await
            .unwrap();

        assert_eq!(constructed.load(Ordering::SeqCst), 1);
        assert!(orchestrator.is_plugin_loaded("a"));
        assert_eq!(orchestrator.plugin_status("a"), Some(PluginStatus::Loaded));

        let gamma = CustomerConfig::new("gamma", "Gamma").with_feature("ghost");
        let err = tokio_test::assert_err!(orchestrator.load_customer_configs([gamma]).await);
        assert_eq!(err.code(), ErrorCode::PluginNotFound);
    }

    struct CannedLlm;

    #[async_trait]
    impl LlmService for CannedLlm {
        async fn generate(&self, options: GenerateOptions) -> ServiceResult<LlmResponse> {
            Ok(LlmResponse {
                text: format!("you said: {}", options.messages[0].content),
                finish_reason: FinishReason::Stop,
            })
        }
    }

    #[tokio::test]
    async fn test_chat_scenario() {
        let services = Arc::new(ServiceContainer::new());
        services.register(names::LLM, || async {
            Ok(Arc::new(CannedLlm) as Arc<dyn LlmService>)
        });
        let orchestrator = Orchestrator::new(services);
        for desc in builtin::descriptors() {
            orchestrator.register_plugin(desc);
        }
        orchestrator
            .load_customer_configs([CustomerConfig::new("acme", "Acme")
                .with_mapping(EventMapping::new(EventType::Slash, "chat"))])
            .await
            .unwrap();

        let event: EventContext = serde_json::from_value(serde_json::json!({
            "type": "slash",
            "user_id": "u1",
            "customer_id": "acme",
            "payload": { "message": "hi" }
        }))
        .unwrap();

        let result = orchestrator.route_event(&event).await;
        assert!(result.success);
        assert_eq!(result.responses.len(), 1);
        assert_eq!(
            result.responses[0].response.message.as_deref(),
            Some("you said: hi")
        );

        orchestrator.plugin_loader().unload("chat").await;
        let result = orchestrator.route_event(&event).await;
        assert!(!result.success);
        assert!(result.responses.is_empty());
        assert_eq!(
            result.errors,
            [AtacError::PluginNotLoaded {
                plugin_id: "chat".into()
            }]
        );
        assert_eq!(
            result.deliveries(DeliveryPolicy::First),
            [PluginResponse::text(GENERIC_FAILURE_MESSAGE)]
        );
    }

    #[tokio::test]
    async fn test_chat_without_llm_reports_missing_services() {
        let orchestrator = Orchestrator::new(Arc::new(ServiceContainer::new()));
        orchestrator.register_plugin(builtin::chat::descriptor());
        orchestrator
            .load_customer_configs([CustomerConfig::new("acme", "Acme")
                .with_mapping(EventMapping::new(EventType::Slash, "chat"))])
            .await
            .unwrap();

        let result = orchestrator.route_event(&slash("acme", "u1")).await;
        assert_eq!(
            result.errors,
            [AtacError::PluginMissingServices {
                plugin_id: "chat".into(),
                missing: vec!["llm".into()],
            }]
        );
    }

    #[tokio::test]
    async fn test_shutdown_drains_and_is_idempotent() {
        let (orchestrator, cleanups) = orchestrator_with(
            &[("a", false), ("b", false)],
            acme(&["a", "b"]),
            RateLimits::default(),
        )
        .await;

        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        orchestrator
            .spawn_background(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                flag.store(true, Ordering::SeqCst);
            })
            .unwrap();

        let token = orchestrator.shutdown_token();
        let watcher = orchestrator
            .spawn_background(async move { token.cancelled().await })
            .unwrap();

        orchestrator.shutdown().await;
        assert!(finished.load(Ordering::SeqCst));
        assert!(watcher.is_finished());
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
        assert!(!orchestrator.is_plugin_loaded("a"));

        orchestrator.shutdown().await;
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
        assert!(orchestrator.spawn_background(async {}).is_none());
    }

    #[tokio::test]
    async fn test_attendance_routed_to_data_store() {
        let store = Arc::new(MemoryDataStore::new());
        let services = Arc::new(ServiceContainer::new());
        services.set::<dyn DataService>(names::DATA, store.clone());
        let orchestrator = Orchestrator::new(services);
        for desc in builtin::descriptors() {
            orchestrator.register_plugin(desc);
        }
        orchestrator
            .load_customer_configs([CustomerConfig::new("acme", "Acme").with_mapping(
                EventMapping::new(EventType::Slash, "attendance")
                    .with_config("collection_name", "shifts"),
            )])
            .await
            .unwrap();
        assert!(!orchestrator.is_plugin_loaded("calendar"));

        let event = EventContext::new("acme", EventType::Slash)
            .with_user("u1")
            .with_payload("subcommand", "checkin");
        let result = orchestrator.route_event(&event).await;

        assert!(result.success, "{:?}", result.errors);
        assert!(
            result.responses[0]
                .response
                .message
                .as_deref()
                .is_some_and(|m| m.starts_with("Check-in recorded at "))
        );
        assert_eq!(store.count("shifts"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_spawn_racing_shutdown_is_always_drained() {
        let (orchestrator, _) =
            orchestrator_with(&[], acme(&[]), RateLimits::default()).await;
        let orchestrator = Arc::new(orchestrator);
        let done = Arc::new(AtomicUsize::new(0));

        let spawner = {
            let orchestrator = Arc::clone(&orchestrator);
            let done = Arc::clone(&done);
            tokio::spawn(async move {
                let mut accepted = 0_usize;
                loop {
                    let done = Arc::clone(&done);
                    let handle = orchestrator.spawn_background(async move {
                        tokio::task::yield_now().await;
                        done.fetch_add(1, Ordering::SeqCst);
                    });
                    if handle.is_none() {
                        return accepted;
                    }
                    accepted += 1;
                    tokio::task::yield_now().await;
                }
            })
        };

        tokio::time::sleep(Duration::from_millis(5)).await;
        orchestrator.shutdown().await;
        let drained = done.load(Ordering::SeqCst);

        let accepted = spawner.await.unwrap();
        assert!(accepted > 0);
        assert_eq!(drained, accepted);
    }

    #[test]
    fn test_delivery_policies() {
        let services = Arc::new(ServiceContainer::new());
        let ctx = |text: Option<&str>| {
            let event = EventContext::new("acme", EventType::Slash);
            let mut ctx = PluginContext::new(event, Arc::clone(&services));
            if let Some(text) = text {
                ctx.reply(text);
            }
            ctx
        };
        let result = OrchestrationResult {
            success: false,
            responses: vec![ctx(None), ctx(Some("one")), ctx(Some("two"))],
            errors: vec![AtacError::PluginNotLoaded {
                plugin_id: "x".into(),
            }],
        };

        assert_eq!(
            result.deliveries(DeliveryPolicy::First),
            [PluginResponse::text("one")]
        );
        assert_eq!(result.deliveries(DeliveryPolicy::All).len(), 2);
        assert_eq!(
            result.deliveries(DeliveryPolicy::Merge),
            [PluginResponse::text("one\n\ntwo")]
        );
        assert!(OrchestrationResult::default()
            .deliveries(DeliveryPolicy::All)
            .is_empty());
    }
}
