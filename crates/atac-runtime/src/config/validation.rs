//! Configuration validation.

use std::collections::HashSet;

use atac_core::CustomerConfig;
use atac_framework::RateLimitSettings;

use super::error::{ConfigError, ConfigResult};
use super::schema::{AtacConfig, LogOutput, LoggingConfig};
use crate::webhook::WebhookRoute;

/// Validates the entire configuration.
pub fn validate_config(config: &AtacConfig) -> ConfigResult<()> {
    validate_logging(&config.logging)?;
    validate_rate_limit("rate_limits.user", &config.rate_limits.user)?;
    validate_rate_limit("rate_limits.customer", &config.rate_limits.customer)?;

    let customers = validate_customers(&config.customers)?;
    validate_webhooks(&config.webhooks, &customers)?;
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    if let Some(target) = logging
        .filters
        .keys()
        .find(|target| target.is_empty() || target.contains(char::is_whitespace))
    {
        return Err(ConfigError::validation(format!(
            "Invalid log filter target: '{target}'"
        )));
    }
    Ok(())
}

fn validate_rate_limit(field: &str, settings: &RateLimitSettings) -> ConfigResult<()> {
    if settings.max_requests == 0 {
        return Err(ConfigError::validation(format!(
            "{field}.max_requests must be greater than 0"
        )));
    }
    if settings.window_ms == 0 {
        return Err(ConfigError::validation(format!(
            "{field}.window_ms must be greater than 0"
        )));
    }
    Ok(())
}

/// Returns the set of configured customer ids.
fn validate_customers(customers: &[CustomerConfig]) -> ConfigResult<HashSet<&str>> {
    let mut seen = HashSet::new();

    for customer in customers {
        let id = customer.customer_id.as_str();
        if id.is_empty() {
            return Err(ConfigError::missing_field("customers.customer_id"));
        }
        if id.contains(char::is_whitespace) {
            return Err(ConfigError::validation(format!(
                "Customer id cannot contain whitespace: '{id}'"
            )));
        }
        if !seen.insert(id) {
            return Err(ConfigError::DuplicateCustomerId(id.to_string()));
        }

        if let Some(mapping) = customer
            .event_mappings
            .iter()
            .find(|m| !customer.features.contains(&m.feature_id))
        {
            return Err(ConfigError::UnknownFeature {
                customer_id: id.to_string(),
                feature_id: mapping.feature_id.clone(),
            });
        }
    }

    Ok(seen)
}

fn validate_webhooks(routes: &[WebhookRoute], customers: &HashSet<&str>) -> ConfigResult<()> {
    let mut seen = HashSet::new();

    for route in routes {
        if route.route_id.is_empty() {
            return Err(ConfigError::missing_field("webhooks.route_id"));
        }
        if !seen.insert(route.route_id.as_str()) {
            return Err(ConfigError::validation(format!(
                "Duplicate webhook route id: '{}'",
                route.route_id
            )));
        }
        if !customers.contains(route.customer_id.as_str()) {
            return Err(ConfigError::UnknownCustomer {
                route_id: route.route_id.clone(),
                customer_id: route.customer_id.clone(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use atac_core::{EventMapping, EventType};

    fn acme() -> CustomerConfig {
        CustomerConfig::new("acme", "Acme")
            .with_mapping(EventMapping::new(EventType::Slash, "chat"))
    }

    fn route(route_id: &str, customer_id: &str) -> WebhookRoute {
        WebhookRoute::new(route_id, customer_id, "github", "reminder")
    }

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&AtacConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_duplicate_customer() {
        let config = AtacConfig {
            customers: vec![acme(), acme()],
            ..Default::default()
        };
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::DuplicateCustomerId(id)) if id == "acme"
        ));
    }

    #[test]
    fn test_validate_customer_id() {
        for id in ["", "ac me"] {
            let config = AtacConfig {
                customers: vec![CustomerConfig::new(id, "Bad")],
                ..Default::default()
            };
            assert!(validate_config(&config).is_err(), "accepted {id:?}");
        }
    }

    #[test]
    fn test_validate_mapping_feature_enabled() {
        let mut customer = acme();
        customer.features.clear();
        let config = AtacConfig {
            customers: vec![customer],
            ..Default::default()
        };
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::UnknownFeature { feature_id, .. }) if feature_id == "chat"
        ));
    }

    #[test]
    fn test_validate_zero_rate_limit() {
        let mut config = AtacConfig::default();
        config.rate_limits.customer.window_ms = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_validate_webhook_routes() {
        let config = AtacConfig {
            customers: vec![acme()],
            webhooks: vec![route("gh", "acme"), route("gh", "acme")],
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());

        let config = AtacConfig {
            customers: vec![acme()],
            webhooks: vec![route("gh", "ghost")],
            ..Default::default()
        };
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::UnknownCustomer { customer_id, .. }) if customer_id == "ghost"
        ));
    }

    #[test]
    fn test_validate_file_output_needs_path() {
        let mut config = AtacConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));
    }
}
