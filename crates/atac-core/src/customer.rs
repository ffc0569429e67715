//! Per-tenant configuration.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::event::{EventType, Payload};

/// Tenant-declared association from an event type to a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMapping {
    /// Event type this mapping answers to.
    pub event_type: EventType,
    /// Plugin id invoked for matching events.
    pub feature_id: String,
    /// Plugin-specific invocation config.
    #[serde(default)]
    pub config: Payload,
}

impl EventMapping {
    /// Creates a mapping with an empty config.
    pub fn new(event_type: EventType, feature_id: impl Into<String>) -> Self {
        Self {
            event_type,
            feature_id: feature_id.into(),
            config: Payload::new(),
        }
    }

    /// Inserts a config entry.
    pub fn with_config(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}

/// The feature set and event mappings of one tenant.
///
/// `event_mappings` order is significant: it is the execution order when
/// several mappings match the same event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerConfig {
    pub customer_id: String,
    #[serde(default)]
    pub name: String,
    /// Enabled plugin ids.
    #[serde(default)]
    pub features: BTreeSet<String>,
    #[serde(default)]
    pub event_mappings: Vec<EventMapping>,
    /// Free-form tenant settings.
    #[serde(default)]
    pub settings: Payload,
}

impl CustomerConfig {
    /// Creates an empty configuration for `customer_id`.
    pub fn new(customer_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            name: name.into(),
            features: BTreeSet::new(),
            event_mappings: Vec::new(),
            settings: Payload::new(),
        }
    }

    /// Enables a feature.
    pub fn with_feature(mut self, feature_id: impl Into<String>) -> Self {
        self.features.insert(feature_id.into());
        self
    }

    /// Appends a mapping and enables its feature.
    pub fn with_mapping(mut self, mapping: EventMapping) -> Self {
        self.features.insert(mapping.feature_id.clone());
        self.event_mappings.push(mapping);
        self
    }

    /// Returns the mappings for `event_type`, in declared order.
    pub fn mappings_for(&self, event_type: EventType) -> impl Iterator<Item = &EventMapping> {
        self.event_mappings
            .iter()
            .filter(move |m| m.event_type == event_type)
    }
}
