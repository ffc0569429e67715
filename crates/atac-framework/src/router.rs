//! Per-tenant event routing table.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use atac_core::{AtacError, AtacResult, CustomerConfig, EventContext, EventMapping};

/// Maps `(customer, event type)` to the tenant's configured plugins.
///
/// Configs are stored as `Arc<CustomerConfig>`, so replacing a tenant never
/// disturbs a lookup already in progress for it.
#[derive(Debug, Default)]
pub struct EventRouter {
    customers: RwLock<HashMap<String, Arc<CustomerConfig>>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the config for `config.customer_id`.
    pub fn register_customer(&self, config: CustomerConfig) {
        let customer_id = config.customer_id.clone();
        info!(customer = %customer_id, "Loading customer");
        self.customers
            .write()
            .insert(customer_id.clone(), Arc::new(config));
        info!(customer = %customer_id, "Customer loaded");
    }

    /// Returns the tenant's config.
    ///
    /// # Errors
    ///
    /// [`AtacError::CustomerNotFound`] if the tenant is not registered.
    pub fn customer(&self, customer_id: &str) -> AtacResult<Arc<CustomerConfig>> {
        self.customers
            .read()
            .get(customer_id)
            .cloned()
            .ok_or_else(|| AtacError::CustomerNotFound {
                customer_id: customer_id.to_string(),
            })
    }

    pub fn has_customer(&self, customer_id: &str) -> bool {
        self.customers.read().contains_key(customer_id)
    }

    /// Mappings of the event's tenant whose event type matches, in the
    /// tenant's declared order. An empty result is logged, not an error.
    ///
    /// # Errors
    ///
    /// [`AtacError::CustomerNotFound`] if the tenant is not registered.
    pub fn get_event_mappings(&self, event: &EventContext) -> AtacResult<Vec<EventMapping>> {
        let config = self.customer(&event.customer_id)?;
        let mappings: Vec<EventMapping> = config.mappings_for(event.event_type).cloned().collect();

        if mappings.is_empty() {
            warn!(
                customer = %event.customer_id,
                event_type = %event.event_type,
                "Event mapping not found"
            );
        } else {
            debug!(
                customer = %event.customer_id,
                event_type = %event.event_type,
                count = mappings.len(),
                "Event mappings resolved"
            );
        }
        Ok(mappings)
    }

    /// Returns `true` if the tenant enables `feature_id`.
    pub fn has_feature(&self, customer_id: &str, feature_id: &str) -> bool {
        self.customers
            .read()
            .get(customer_id)
            .is_some_and(|config| config.features.contains(feature_id))
    }

    /// Enabled feature ids of the tenant, sorted; empty for unknown tenants.
    pub fn features(&self, customer_id: &str) -> Vec<String> {
        self.customers
            .read()
            .get(customer_id)
            .map(|config| config.features.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Registered tenant ids, sorted.
    pub fn registered_customers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.customers.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Removes a tenant. Returns `true` if it existed.
    pub fn remove_customer(&self, customer_id: &str) -> bool {
        self.customers.write().remove(customer_id).is_some()
    }

    /// Removes every tenant.
    pub fn clear(&self) {
        self.customers.write().clear();
    }
}
