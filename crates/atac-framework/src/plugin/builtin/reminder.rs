//! Reminder notifications for scheduled (`cron`) events.
//!
//! ```toml
//! [plugins.reminder]
//! message = "Stand-up in 5 minutes"
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use atac_core::{BoxError, Payload};

use super::{invocation_config, load_defaults};
use crate::context::PluginContext;
use crate::plugin::{Plugin, PluginDescriptor, PluginLoadContext, PluginMetadata};

pub const REMINDER_PLUGIN_ID: &str = "reminder";

const DEFAULT_MESSAGE: &str = "This is a reminder!";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReminderConfig {
    message: Option<String>,
}

pub struct ReminderPlugin {
    metadata: PluginMetadata,
    defaults: Payload,
}

pub fn metadata() -> PluginMetadata {
    PluginMetadata::new(REMINDER_PLUGIN_ID, "Reminder Notifications")
        .version("1.0.0")
        .description("Formats reminder messages for scheduled events")
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::new(metadata(), build)
}

async fn build(ctx: PluginLoadContext) -> Result<Arc<dyn Plugin>, BoxError> {
    ctx.get_config::<ReminderConfig>()?;
    Ok(Arc::new(ReminderPlugin {
        metadata: metadata(),
        defaults: load_defaults(&ctx),
    }))
}

#[async_trait]
impl Plugin for ReminderPlugin {
    fn manifest(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn execute(&self, ctx: &mut PluginContext) -> Result<(), BoxError> {
        let config: ReminderConfig = invocation_config(&self.defaults, ctx)?;
        let message = config.message.as_deref().unwrap_or(DEFAULT_MESSAGE);
        let fired_at =
            DateTime::<Utc>::from(ctx.event.timestamp).format("%Y-%m-%d %H:%M:%S UTC");

        debug!(customer = %ctx.event.customer_id, "Sending reminder");
        ctx.reply(format!("**Reminder** ({fired_at})\n{message}"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    use atac_core::{EventContext, EventType, ServiceContainer};

    fn fired_at_epoch_plus(secs: u64) -> EventContext {
        EventContext::new("acme", EventType::Cron)
            .with_timestamp(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
    }

    #[tokio::test]
    async fn test_default_message() {
        let services = Arc::new(ServiceContainer::new());
        let plugin = descriptor()
            .instantiate(PluginLoadContext::new("reminder", Arc::clone(&services), None))
            .await
            .unwrap();

        let mut ctx = PluginContext::new(fired_at_epoch_plus(90), services);
        plugin.execute(&mut ctx).await.unwrap();
        assert_eq!(
            ctx.response.message.as_deref(),
            Some("**Reminder** (1970-01-01 00:01:30 UTC)\nThis is a reminder!")
        );
    }

    #[tokio::test]
    async fn test_mapping_config_overrides_defaults() {
        let services = Arc::new(ServiceContainer::new());
        let plugin = descriptor()
            .instantiate(PluginLoadContext::new(
                "reminder",
                Arc::clone(&services),
                Some(serde_json::json!({ "message": "from defaults" })),
            ))
            .await
            .unwrap();

        let mut ctx = PluginContext::new(fired_at_epoch_plus(0), Arc::clone(&services));
        plugin.execute(&mut ctx).await.unwrap();
        assert!(ctx.response.message.unwrap().ends_with("from defaults"));

        let mut ctx = PluginContext::new(fired_at_epoch_plus(0), services);
        ctx.config.insert("message".into(), "Stand-up".into());
        plugin.execute(&mut ctx).await.unwrap();
        assert!(ctx.response.message.unwrap().ends_with("\nStand-up"));
    }

    #[tokio::test]
    async fn test_rejects_malformed_config() {
        let result = descriptor()
            .instantiate(PluginLoadContext::new(
                "reminder",
                Arc::new(ServiceContainer::new()),
                Some(serde_json::json!({ "message": 42 })),
            ))
            .await;
        assert!(result.is_err());
    }
}
