//! Inbound webhook ingress.
//!
//! A [`WebhookRoute`] binds an externally visible route id to a tenant,
//! channel and feature. [`WebhookIngress::handle`] authenticates the raw body
//! against the route secret, converts the delivery into a `webhook`
//! [`EventContext`] and routes it through the orchestrator.
//!
//! Signatures are hex HMAC-SHA256 of the raw body, optionally prefixed with
//! `sha256=`, read from `x-signature` or `x-hub-signature-256`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;
use tracing::{info, warn};

use atac_core::{EventContext, EventType, Payload};
use atac_framework::{OrchestrationResult, Orchestrator};

type HmacSha256 = Hmac<Sha256>;

/// Headers checked for a signature, in order.
pub const SIGNATURE_HEADERS: [&str; 2] = ["x-signature", "x-hub-signature-256"];

/// `user_id` stamped on webhook events.
pub const WEBHOOK_USER_ID: &str = "webhook";

/// Binding from a route id to a tenant destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookRoute {
    pub route_id: String,
    pub customer_id: String,
    /// Sending system, e.g. `github`.
    pub source: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub guild_id: String,
    pub feature_id: String,
    /// Shared HMAC secret; unsigned deliveries are accepted when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl WebhookRoute {
    pub fn new(
        route_id: impl Into<String>,
        customer_id: impl Into<String>,
        source: impl Into<String>,
        feature_id: impl Into<String>,
    ) -> Self {
        Self {
            route_id: route_id.into(),
            customer_id: customer_id.into(),
            source: source.into(),
            channel_id: String::new(),
            guild_id: String::new(),
            feature_id: feature_id.into(),
            secret: None,
        }
    }

    pub fn with_channel(mut self, guild_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        self.guild_id = guild_id.into();
        self.channel_id = channel_id.into();
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }
}

/// Body of a webhook delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub source: String,
    pub event_type: String,
    #[serde(default)]
    pub data: Payload,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Why a delivery was refused before routing.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Missing signature header")]
    MissingSignature,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature, `sha256=` prefix allowed.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let signature = signature.trim();
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

fn header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Route table plus the orchestrator deliveries are routed into.
pub struct WebhookIngress {
    orchestrator: Arc<Orchestrator>,
    routes: RwLock<HashMap<String, WebhookRoute>>,
}

impl WebhookIngress {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            routes: RwLock::new(HashMap::new()),
        }
    }

    /// Adds or replaces a route.
    pub fn register_route(&self, route: WebhookRoute) {
        info!(route = %route.route_id, customer = %route.customer_id, "Webhook route registered");
        self.routes.write().insert(route.route_id.clone(), route);
    }

    pub fn remove_route(&self, route_id: &str) -> bool {
        self.routes.write().remove(route_id).is_some()
    }

    pub fn route(&self, route_id: &str) -> Option<WebhookRoute> {
        self.routes.read().get(route_id).cloned()
    }

    /// Registered route ids, sorted.
    pub fn registered_routes(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.routes.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Authenticates and routes one delivery.
    ///
    /// `body` is the raw request body; it is both the HMAC input and the
    /// JSON [`WebhookPayload`].
    pub async fn handle(
        &self,
        route_id: &str,
        body: &[u8],
        headers: &HashMap<String, String>,
    ) -> Result<OrchestrationResult, WebhookError> {
        let route = self
            .route(route_id)
            .ok_or_else(|| WebhookError::RouteNotFound(route_id.to_string()))?;

        if let Some(secret) = &route.secret {
            let signature = SIGNATURE_HEADERS
                .iter()
                .find_map(|name| header(headers, name))
                .ok_or(WebhookError::MissingSignature)?;
            if !verify_signature(secret, body, signature) {
                warn!(route = %route_id, "Webhook signature rejected");
                return Err(WebhookError::InvalidSignature);
            }
        }

        let payload: WebhookPayload = serde_json::from_slice(body)?;
        info!(route = %route_id, source = %payload.source, "Webhook received");

        let event = Self::event(&route, payload);
        Ok(self.orchestrator.route_event(&event).await)
    }

    fn event(route: &WebhookRoute, payload: WebhookPayload) -> EventContext {
        let timestamp = payload
            .timestamp
            .map(SystemTime::from)
            .unwrap_or_else(SystemTime::now);

        EventContext::new(route.customer_id.as_str(), EventType::Webhook)
            .with_user(WEBHOOK_USER_ID)
            .with_guild(route.guild_id.as_str())
            .with_channel(route.channel_id.as_str())
            .with_payload("route_id", route.route_id.as_str())
            .with_payload("source", payload.source)
            .with_payload("event_type", payload.event_type)
            .with_payload("data", Value::Object(payload.data))
            .with_payload("feature_id", route.feature_id.as_str())
            .with_timestamp(timestamp)
    }
}

impl std::fmt::Debug for WebhookIngress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookIngress")
            .field("routes", &self.registered_routes())
            .finish()
    }
}
