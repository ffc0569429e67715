//! Unified error types for the ATAC core.
//!
//! [`AtacError`] is the single taxonomy used across the dispatch pipeline.
//! Every variant carries the ids involved and, where a lower layer failed,
//! the wrapped cause message. Callers that need machine-readable output use
//! [`AtacError::code`] and [`AtacError::details`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Boxed error returned by plugin hooks and service factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// Error codes
// =============================================================================

/// Stable, machine-readable identifier for an [`AtacError`] kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    CustomerNotFound,
    AuthPermissionDenied,
    PluginNotFound,
    PluginNotLoaded,
    PluginLoadFailed,
    PluginInitFailed,
    PluginMissingServices,
    PluginExecuteFailed,
    ServiceNotRegistered,
    ServiceInitFailed,
    ServiceTypeMismatch,
}

impl ErrorCode {
    /// Returns the code as it appears in logs and serialized payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CustomerNotFound => "CUSTOMER_NOT_FOUND",
            Self::AuthPermissionDenied => "AUTH_PERMISSION_DENIED",
            Self::PluginNotFound => "PLUGIN_NOT_FOUND",
            Self::PluginNotLoaded => "PLUGIN_NOT_LOADED",
            Self::PluginLoadFailed => "PLUGIN_LOAD_FAILED",
            Self::PluginInitFailed => "PLUGIN_INIT_FAILED",
            Self::PluginMissingServices => "PLUGIN_MISSING_SERVICES",
            Self::PluginExecuteFailed => "PLUGIN_EXECUTE_FAILED",
            Self::ServiceNotRegistered => "SERVICE_NOT_REGISTERED",
            Self::ServiceInitFailed => "SERVICE_INIT_FAILED",
            Self::ServiceTypeMismatch => "SERVICE_TYPE_MISMATCH",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// AtacError
// =============================================================================

/// Errors raised by the service container, plugin lifecycle, routing and
/// execution layers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AtacError {
    /// The tenant has no registered configuration.
    #[error("customer not found: {customer_id}")]
    CustomerNotFound {
        /// The unknown tenant id.
        customer_id: String,
    },

    /// Request gating refused the call (rate limit exceeded).
    #[error("permission denied: {reason}")]
    AuthPermissionDenied {
        /// Human-readable reason.
        reason: String,
        /// The rate-limited subject (user or customer id).
        subject: String,
    },

    /// No metadata is registered for the plugin id.
    #[error("plugin not found: {plugin_id}")]
    PluginNotFound {
        /// The unknown plugin id.
        plugin_id: String,
    },

    /// The plugin is registered but has no live instance.
    #[error("plugin is not loaded: {plugin_id}")]
    PluginNotLoaded {
        /// The plugin id.
        plugin_id: String,
    },

    /// Constructing the plugin instance failed.
    #[error("failed to load plugin '{plugin_id}': {error}")]
    PluginLoadFailed {
        /// The plugin id.
        plugin_id: String,
        /// The underlying cause.
        error: String,
    },

    /// The plugin's `initialize` hook failed.
    #[error("failed to initialize plugin '{plugin_id}': {error}")]
    PluginInitFailed {
        /// The plugin id.
        plugin_id: String,
        /// The underlying cause.
        error: String,
    },

    /// Context validation rejected the invocation.
    #[error("plugin '{plugin_id}' is missing required services: {}", missing.join(", "))]
    PluginMissingServices {
        /// The plugin id.
        plugin_id: String,
        /// Declared services absent from the context's container.
        missing: Vec<String>,
    },

    /// Validation or execution raised an error.
    #[error("failed to execute plugin '{plugin_id}': {error}")]
    PluginExecuteFailed {
        /// The plugin id.
        plugin_id: String,
        /// The underlying cause.
        error: String,
    },

    /// No factory or instance exists under the service name.
    #[error("service is not registered: {service_name}")]
    ServiceNotRegistered {
        /// The service name.
        service_name: String,
    },

    /// The service factory failed.
    #[error("failed to initialize service '{service_name}': {error}")]
    ServiceInitFailed {
        /// The service name.
        service_name: String,
        /// The underlying cause.
        error: String,
    },

    /// The stored instance is not of the requested type.
    #[error("service '{service_name}' is not a {expected}")]
    ServiceTypeMismatch {
        /// The service name.
        service_name: String,
        /// The requested type name.
        expected: &'static str,
    },
}

impl AtacError {
    /// Returns the stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::CustomerNotFound { .. } => ErrorCode::CustomerNotFound,
            Self::AuthPermissionDenied { .. } => ErrorCode::AuthPermissionDenied,
            Self::PluginNotFound { .. } => ErrorCode::PluginNotFound,
            Self::PluginNotLoaded { .. } => ErrorCode::PluginNotLoaded,
            Self::PluginLoadFailed { .. } => ErrorCode::PluginLoadFailed,
            Self::PluginInitFailed { .. } => ErrorCode::PluginInitFailed,
            Self::PluginMissingServices { .. } => ErrorCode::PluginMissingServices,
            Self::PluginExecuteFailed { .. } => ErrorCode::PluginExecuteFailed,
            Self::ServiceNotRegistered { .. } => ErrorCode::ServiceNotRegistered,
            Self::ServiceInitFailed { .. } => ErrorCode::ServiceInitFailed,
            Self::ServiceTypeMismatch { .. } => ErrorCode::ServiceTypeMismatch,
        }
    }

    /// Returns the structured detail bag (ids involved, wrapped cause).
    pub fn details(&self) -> Map<String, Value> {
        let mut map = Map::new();
        let mut put = |key: &str, value: Value| {
            map.insert(key.to_string(), value);
        };
        match self {
            Self::CustomerNotFound { customer_id } => {
                put("customer_id", customer_id.as_str().into());
            }
            Self::AuthPermissionDenied { reason, subject } => {
                put("reason", reason.as_str().into());
                put("subject", subject.as_str().into());
            }
            Self::PluginNotFound { plugin_id } | Self::PluginNotLoaded { plugin_id } => {
                put("plugin_id", plugin_id.as_str().into());
            }
            Self::PluginLoadFailed { plugin_id, error }
            | Self::PluginInitFailed { plugin_id, error }
            | Self::PluginExecuteFailed { plugin_id, error } => {
                put("plugin_id", plugin_id.as_str().into());
                put("error", error.as_str().into());
            }
            Self::PluginMissingServices { plugin_id, missing } => {
                put("plugin_id", plugin_id.as_str().into());
                put("missing", missing.clone().into());
            }
            Self::ServiceNotRegistered { service_name } => {
                put("service_name", service_name.as_str().into());
            }
            Self::ServiceInitFailed {
                service_name,
                error,
            } => {
                put("service_name", service_name.as_str().into());
                put("error", error.as_str().into());
            }
            Self::ServiceTypeMismatch {
                service_name,
                expected,
            } => {
                put("service_name", service_name.as_str().into());
                put("expected", (*expected).into());
            }
        }
        map
    }

    /// Returns `true` for failures raised before any plugin ran.
    pub fn is_gate_rejection(&self) -> bool {
        matches!(
            self,
            Self::CustomerNotFound { .. } | Self::AuthPermissionDenied { .. }
        )
    }
}

/// Result type for core operations.
pub type AtacResult<T> = Result<T, AtacError>;

// =============================================================================
// Service Errors
// =============================================================================

/// Errors returned by backend capability services.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// The requested record or key does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The backend is not reachable or not configured.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The caller supplied malformed input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The backend reported a failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

/// Result type for backend capability calls.
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_and_details() {
        let err = AtacError::PluginExecuteFailed {
            plugin_id: "chat".into(),
            error: "boom".into(),
        };
        assert_eq!(err.code(), ErrorCode::PluginExecuteFailed);
        assert_eq!(err.code().as_str(), "PLUGIN_EXECUTE_FAILED");

        let details = err.details();
        assert_eq!(details["plugin_id"], "chat");
        assert_eq!(details["error"], "boom");
    }

    #[test]
    fn test_missing_services_message() {
        let err = AtacError::PluginMissingServices {
            plugin_id: "chat".into(),
            missing: vec!["llm".into(), "rag".into()],
        };
        assert_eq!(
            err.to_string(),
            "plugin 'chat' is missing required services: llm, rag"
        );
        assert_eq!(err.details()["missing"], serde_json::json!(["llm", "rag"]));
    }

    #[test]
    fn test_gate_rejection() {
        let denied = AtacError::AuthPermissionDenied {
            reason: "Rate limit exceeded for user".into(),
            subject: "u1".into(),
        };
        assert!(denied.is_gate_rejection());
        assert!(
            !AtacError::PluginNotLoaded {
                plugin_id: "chat".into()
            }
            .is_gate_rejection()
        );
    }

    #[test]
    fn test_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::ServiceInitFailed).unwrap();
        assert_eq!(json, "\"SERVICE_INIT_FAILED\"");
    }
}
