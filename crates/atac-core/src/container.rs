//! Named service registry with lazy, memoized async construction.
//!
//! [`ServiceContainer`] maps a service name (`"llm"`, `"cache"`, …) to either
//! a factory or a pre-built instance. The first [`get`](ServiceContainer::get)
//! runs the factory; every later call returns the memoized instance.
//!
//! # Concurrency
//!
//! Each entry owns a [`tokio::sync::OnceCell`]. Concurrent first access to the
//! same name is serialized on that cell, so the factory runs exactly once.
//! A factory that fails leaves the cell empty and the next `get` retries.
//!
//! # Example
//!
//! ```rust,ignore
//! let services = ServiceContainer::new();
//! services.register("llm", || async {
//!     Ok(Arc::new(OpenAiLlm::connect().await?) as Arc<dyn LlmService>)
//! });
//!
//! let llm: Arc<dyn LlmService> = services.get("llm").await?;
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

use crate::error::{AtacError, AtacResult, BoxError};

/// Type-erased service instance.
///
/// The inner `dyn Any` is an `Arc<T>` (usually `Arc<dyn SomeService>`) upcast
/// to `Any`; [`ServiceContainer::get`] downcasts it back.
pub type ServiceArc = Arc<dyn Any + Send + Sync>;

type ServiceFactory = Arc<dyn Fn() -> BoxFuture<'static, Result<ServiceArc, BoxError>> + Send + Sync>;

struct ServiceEntry {
    factory: Option<ServiceFactory>,
    instance: Arc<OnceCell<ServiceArc>>,
}

impl ServiceEntry {
    fn is_initialized(&self) -> bool {
        self.instance.initialized()
    }
}

/// Registry of named backend services.
///
/// Shared as `Arc<ServiceContainer>`; all methods take `&self`.
#[derive(Default)]
pub struct ServiceContainer {
    services: RwLock<HashMap<String, Arc<ServiceEntry>>>,
}

impl ServiceContainer {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an async factory under `name`.
    ///
    /// Replaces any prior factory. If the prior entry was already
    /// instantiated its instance is kept; only the factory is swapped.
    pub fn register<T, F, Fut>(&self, name: impl Into<String>, factory: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<T>, BoxError>> + Send + 'static,
    {
        let name = name.into();
        info!(service = %name, "Registering service");

        let factory: ServiceFactory = Arc::new(move || {
            let fut = factory();
            Box::pin(async move { fut.await.map(|svc| Arc::new(svc) as ServiceArc) })
        });

        let mut services = self.services.write();
        let instance = match services.get(&name) {
            Some(prev) if prev.is_initialized() => {
                warn!(
                    service = %name,
                    "Service already instantiated; keeping the live instance"
                );
                Arc::clone(&prev.instance)
            }
            _ => Arc::new(OnceCell::new()),
        };
        services.insert(
            name.clone(),
            Arc::new(ServiceEntry {
                factory: Some(factory),
                instance,
            }),
        );
        drop(services);

        info!(service = %name, "Service registered");
    }

    /// Injects a pre-built instance under `name`.
    pub fn set<T>(&self, name: impl Into<String>, instance: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.set_raw(name, Arc::new(instance));
    }

    /// Injects a type-erased instance under `name`.
    pub fn set_raw(&self, name: impl Into<String>, instance: ServiceArc) {
        self.services.write().insert(
            name.into(),
            Arc::new(ServiceEntry {
                factory: None,
                instance: Arc::new(OnceCell::new_with(Some(instance))),
            }),
        );
    }

    /// Returns the type-erased instance, constructing it on first access.
    pub async fn get_raw(&self, name: &str) -> AtacResult<ServiceArc> {
        let entry = self
            .services
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| AtacError::ServiceNotRegistered {
                service_name: name.to_string(),
            })?;

        if let Some(instance) = entry.instance.get() {
            return Ok(Arc::clone(instance));
        }

        let Some(factory) = entry.factory.clone() else {
            return Err(AtacError::ServiceNotRegistered {
                service_name: name.to_string(),
            });
        };

        let instance = entry
            .instance
            .get_or_try_init(|| async {
                info!(service = %name, "Initializing service");
                match factory().await {
                    Ok(svc) => {
                        info!(service = %name, "Service initialized");
                        Ok(svc)
                    }
                    Err(e) => {
                        error!(service = %name, error = %e, "Service initialization failed");
                        Err(AtacError::ServiceInitFailed {
                            service_name: name.to_string(),
                            error: e.to_string(),
                        })
                    }
                }
            })
            .await?;

        Ok(Arc::clone(instance))
    }

    /// Returns the instance as `Arc<T>`, constructing it on first access.
    ///
    /// `T` must be the exact type the factory produced, typically a trait
    /// object such as `dyn LlmService`.
    pub async fn get<T>(&self, name: &str) -> AtacResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let raw = self.get_raw(name).await?;
        raw.downcast_ref::<Arc<T>>()
            .cloned()
            .ok_or(AtacError::ServiceTypeMismatch {
                service_name: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Returns `true` if a factory or instance exists under `name`.
    pub fn has(&self, name: &str) -> bool {
        self.services.read().contains_key(name)
    }

    /// Returns `true` if the service under `name` has been constructed.
    pub fn is_initialized(&self, name: &str) -> bool {
        self.services
            .read()
            .get(name)
            .is_some_and(|entry| entry.is_initialized())
    }

    /// Returns all registered service names, sorted.
    pub fn registered_services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Removes a service. Returns `true` if it existed.
    pub fn remove(&self, name: &str) -> bool {
        self.services.write().remove(name).is_some()
    }

    /// Removes every service.
    pub fn clear(&self) {
        self.services.write().clear();
    }

    /// Returns the number of registered services.
    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    /// Returns `true` if no service is registered.
    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }
}

impl std::fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("services", &self.registered_services())
            .finish()
    }
}
