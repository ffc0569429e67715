//! Calendar commands: `list`, `create` and `delete`.
//!
//! Arguments come from `payload.options`; `create` takes RFC 3339 `start`
//! and `end` times. `list` covers `options.days` (default 7) from the event
//! timestamp.
//!
//! ```toml
//! [plugins.calendar]
//! calendar_id = "team@example.com"
//! ```

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use atac_core::services::{CalendarEvent, CalendarService, ListEventsOptions, names};
use atac_core::{BoxError, Payload};

use super::{invocation_config, load_defaults, options, subcommand};
use crate::context::PluginContext;
use crate::plugin::{Plugin, PluginDescriptor, PluginLoadContext, PluginMetadata};

pub const CALENDAR_PLUGIN_ID: &str = "calendar";

/// Reply shown when the calendar service fails.
pub const FAILURE_REPLY: &str = "Failed to process calendar request.";

const USAGE_REPLY: &str = "Unknown subcommand. Use: list, create, or delete";
const INVALID_TIME_REPLY: &str =
    "Invalid time: start and end must be RFC 3339 (2024-03-01T09:00:00Z)";
const DEFAULT_DAYS_AHEAD: i64 = 7;
const MAX_LISTED: usize = 10;
const DESCRIPTION_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CalendarConfig {
    calendar_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListArgs {
    days: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CreateArgs {
    title: Option<String>,
    start: Option<String>,
    end: Option<String>,
    description: Option<String>,
    location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeleteArgs {
    event_id: Option<String>,
}

pub struct CalendarPlugin {
    metadata: PluginMetadata,
    defaults: Payload,
}

pub fn metadata() -> PluginMetadata {
    PluginMetadata::new(CALENDAR_PLUGIN_ID, "Calendar Integration")
        .version("1.0.0")
        .description("Lists, creates and deletes calendar events")
        .requires([names::CALENDAR])
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::new(metadata(), build)
}

async fn build(ctx: PluginLoadContext) -> Result<Arc<dyn Plugin>, BoxError> {
    ctx.get_config::<CalendarConfig>()?;
    Ok(Arc::new(CalendarPlugin {
        metadata: metadata(),
        defaults: load_defaults(&ctx),
    }))
}

fn args<T: serde::de::DeserializeOwned>(ctx: &PluginContext) -> serde_json::Result<T> {
    T::deserialize(Value::Object(options(ctx)))
}

impl CalendarPlugin {
    async fn dispatch(&self, command: &str, ctx: &PluginContext) -> Result<String, BoxError> {
        let config: CalendarConfig = invocation_config(&self.defaults, ctx)?;
        let calendar = ctx
            .services
            .get::<dyn CalendarService>(names::CALENDAR)
            .await?;
        match command {
            "list" => self.list(calendar.as_ref(), ctx, config).await,
            "create" => self.create(calendar.as_ref(), ctx).await,
            _ => self.delete(calendar.as_ref(), ctx).await,
        }
    }

    async fn list(
        &self,
        calendar: &dyn CalendarService,
        ctx: &PluginContext,
        config: CalendarConfig,
    ) -> Result<String, BoxError> {
        let days = args::<ListArgs>(ctx)?.days.unwrap_or(DEFAULT_DAYS_AHEAD);
        let start = DateTime::<Utc>::from(ctx.event.timestamp);
        let Some(end) = TimeDelta::try_days(days).and_then(|span| start.checked_add_signed(span))
        else {
            return Ok(format!("Invalid days: {days}"));
        };

        let events = calendar
            .list_events(ListEventsOptions {
                calendar_id: config.calendar_id,
                start_date: Some(SystemTime::from(start)),
                end_date: Some(SystemTime::from(end)),
                max_results: Some(MAX_LISTED),
            })
            .await?;
        debug!(count = events.len(), days, "Listed calendar events");

        if events.is_empty() {
            return Ok("No upcoming events found.".into());
        }
        Ok(format_event_list(&events))
    }

    async fn create(
        &self,
        calendar: &dyn CalendarService,
        ctx: &PluginContext,
    ) -> Result<String, BoxError> {
        let CreateArgs {
            title: Some(title),
            start: Some(start),
            end: Some(end),
            description,
            location,
        } = args::<CreateArgs>(ctx)?
        else {
            return Ok("Missing required fields: title, start, end".into());
        };

        let (Some(start), Some(end)) = (parse_time(&start), parse_time(&end)) else {
            return Ok(INVALID_TIME_REPLY.into());
        };

        let created = calendar
            .create_event(CalendarEvent {
                id: None,
                title: title.clone(),
                description,
                start_time: start,
                end_time: end,
                location,
                attendees: Vec::new(),
            })
            .await?;
        let id = created.id.unwrap_or_default();
        debug!(id = %id, "Created calendar event");

        Ok(format!("Event created successfully!\nID: {id}\nTitle: {title}"))
    }

    async fn delete(
        &self,
        calendar: &dyn CalendarService,
        ctx: &PluginContext,
    ) -> Result<String, BoxError> {
        let Some(event_id) = args::<DeleteArgs>(ctx)?.event_id else {
            return Ok("Missing required field: event_id".into());
        };
        calendar.delete_event(&event_id).await?;
        Ok(format!("Event deleted successfully!\nID: {event_id}"))
    }
}

#[async_trait]
impl Plugin for CalendarPlugin {
    fn manifest(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn execute(&self, ctx: &mut PluginContext) -> Result<(), BoxError> {
        let requested = subcommand(ctx);
        let Some(command @ ("list" | "create" | "delete")) = requested.as_deref() else {
            ctx.reply(USAGE_REPLY);
            return Ok(());
        };

        match self.dispatch(command, ctx).await {
            Ok(reply) => {
                ctx.reply(reply);
                Ok(())
            }
            Err(e) => {
                error!(plugin = CALENDAR_PLUGIN_ID, error = %e, "Calendar request failed");
                ctx.reply(FAILURE_REPLY);
                Err(e)
            }
        }
    }
}

fn parse_time(value: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|at| SystemTime::from(at.with_timezone(&Utc)))
}

fn format_time(at: SystemTime) -> String {
    DateTime::<Utc>::from(at).format("%Y-%m-%d %H:%M UTC").to_string()
}

fn format_event_list(events: &[CalendarEvent]) -> String {
    let mut message = String::from("Upcoming Events:\n\n");
    for event in events {
        message.push_str(&format!(
            "**{}**\n  {} - {}\n",
            event.title,
            format_time(event.start_time),
            format_time(event.end_time)
        ));
        if let Some(location) = &event.location {
            message.push_str(&format!("  Location: {location}\n"));
        }
        if let Some(description) = &event.description {
            let preview: String = description.chars().take(DESCRIPTION_PREVIEW_CHARS).collect();
            let ellipsis = if description.chars().count() > DESCRIPTION_PREVIEW_CHARS {
                "..."
            } else {
                ""
            };
            message.push_str(&format!("  {preview}{ellipsis}\n"));
        }
        message.push('\n');
    }
    message.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use atac_core::{EventContext, EventType, ServiceContainer, ServiceError, ServiceResult};
    use parking_lot::Mutex;
    use serde_json::json;

    /// 2024-03-01T00:00:00Z
    const MARCH_1: u64 = 1_709_251_200;

    #[derive(Default)]
    struct RecordingCalendar {
        events: Mutex<Vec<CalendarEvent>>,
        last_list: Mutex<Option<ListEventsOptions>>,
        deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CalendarService for RecordingCalendar {
        async fn create_event(&self, mut event: CalendarEvent) -> ServiceResult<CalendarEvent> {
            let mut events = self.events.lock();
            event.id = Some(format!("evt-{}", events.len() + 1));
            events.push(event.clone());
            Ok(event)
        }

        async fn list_events(
            &self,
            options: ListEventsOptions,
        ) -> ServiceResult<Vec<CalendarEvent>> {
            *self.last_list.lock() = Some(options);
            Ok(self.events.lock().clone())
        }

        async fn update_event(
            &self,
            _id: &str,
            event: CalendarEvent,
        ) -> ServiceResult<CalendarEvent> {
            Ok(event)
        }

        async fn delete_event(&self, id: &str) -> ServiceResult<()> {
            if id == "missing" {
                return Err(ServiceError::NotFound(id.to_string()));
            }
            self.deleted.lock().push(id.to_string());
            Ok(())
        }

        async fn get_event(&self, _id: &str) -> ServiceResult<Option<CalendarEvent>> {
            Ok(None)
        }
    }

    fn march_1() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(MARCH_1)
    }

    async fn calendar_plugin(defaults: Option<Value>) -> Arc<dyn Plugin> {
        descriptor()
            .instantiate(PluginLoadContext::new(
                CALENDAR_PLUGIN_ID,
                Arc::new(ServiceContainer::new()),
                defaults,
            ))
            .await
            .unwrap()
    }

    fn services(calendar: &Arc<RecordingCalendar>) -> Arc<ServiceContainer> {
        let services = Arc::new(ServiceContainer::new());
        services.set::<dyn CalendarService>(names::CALENDAR, calendar.clone());
        services
    }

    fn command(services: &Arc<ServiceContainer>, options: Value) -> PluginContext {
        let event = EventContext::new("acme", EventType::Slash)
            .with_user("u1")
            .with_payload("options", options)
            .with_timestamp(march_1());
        PluginContext::new(event, Arc::clone(services))
    }

    #[tokio::test]
    async fn test_create_then_list() {
        let calendar = Arc::new(RecordingCalendar::default());
        let services = services(&calendar);
        let plugin = calendar_plugin(Some(json!({ "calendar_id": "team" }))).await;

        let mut ctx = command(
            &services,
            json!({
                "subcommand": "create",
                "title": "Retro",
                "start": "2024-03-02T10:00:00+09:00",
                "end": "2024-03-02T11:00:00+09:00",
                "location": "Room 4",
                "description": "d".repeat(120),
            }),
        );
        plugin.execute(&mut ctx).await.unwrap();
        assert_eq!(
            ctx.response.message.as_deref(),
            Some("Event created successfully!\nID: evt-1\nTitle: Retro")
        );

        let mut ctx = command(&services, json!({ "subcommand": "list", "days": 3 }));
        plugin.execute(&mut ctx).await.unwrap();
        assert_eq!(
            ctx.response.message.unwrap(),
            format!(
                "Upcoming Events:\n\n**Retro**\n  2024-03-02 01:00 UTC - 2024-03-02 02:00 UTC\n  \
                 Location: Room 4\n  {}...",
                "d".repeat(100)
            )
        );

        let listed = calendar.last_list.lock().clone().unwrap();
        assert_eq!(listed.calendar_id.as_deref(), Some("team"));
        assert_eq!(listed.start_date, Some(march_1()));
        assert_eq!(listed.end_date, Some(march_1() + Duration::from_secs(3 * 86_400)));
        assert_eq!(listed.max_results, Some(MAX_LISTED));
    }

    #[tokio::test]
    async fn test_empty_list() {
        let calendar = Arc::new(RecordingCalendar::default());
        let services = services(&calendar);
        let plugin = calendar_plugin(None).await;

        let mut ctx = command(&services, json!({ "subcommand": "list" }));
        plugin.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.response.message.as_deref(), Some("No upcoming events found."));

        let listed = calendar.last_list.lock().clone().unwrap();
        assert_eq!(listed.end_date, Some(march_1() + Duration::from_secs(7 * 86_400)));
    }

    #[tokio::test]
    async fn test_create_validates_arguments() {
        let calendar = Arc::new(RecordingCalendar::default());
        let services = services(&calendar);
        let plugin = calendar_plugin(None).await;

        let mut ctx = command(&services, json!({ "subcommand": "create", "title": "Retro" }));
        plugin.execute(&mut ctx).await.unwrap();
        assert_eq!(
            ctx.response.message.as_deref(),
            Some("Missing required fields: title, start, end")
        );

        let mut ctx = command(
            &services,
            json!({
                "subcommand": "create",
                "title": "Retro",
                "start": "tomorrow",
                "end": "later",
            }),
        );
        plugin.execute(&mut ctx).await.unwrap();
        assert!(ctx.response.message.unwrap().starts_with("Invalid time"));
        assert!(calendar.events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let calendar = Arc::new(RecordingCalendar::default());
        let services = services(&calendar);
        let plugin = calendar_plugin(None).await;

        let mut ctx = command(&services, json!({ "subcommand": "delete" }));
        plugin.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.response.message.as_deref(), Some("Missing required field: event_id"));

        let mut ctx = command(&services, json!({ "subcommand": "delete", "event_id": "evt-9" }));
        plugin.execute(&mut ctx).await.unwrap();
        assert_eq!(
            ctx.response.message.as_deref(),
            Some("Event deleted successfully!\nID: evt-9")
        );
        assert_eq!(*calendar.deleted.lock(), ["evt-9"]);
    }

    #[tokio::test]
    async fn test_backend_failure_sets_reply_and_propagates() {
        let calendar = Arc::new(RecordingCalendar::default());
        let services = services(&calendar);
        let plugin = calendar_plugin(None).await;

        let mut ctx = command(&services, json!({ "subcommand": "delete", "event_id": "missing" }));
        assert!(plugin.execute(&mut ctx).await.is_err());
        assert_eq!(ctx.response.message.as_deref(), Some(FAILURE_REPLY));
    }

    #[tokio::test]
    async fn test_unknown_subcommand() {
        let calendar = Arc::new(RecordingCalendar::default());
        let services = services(&calendar);
        let plugin = calendar_plugin(None).await;

        let mut ctx = command(&services, json!({}));
        plugin.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.response.message.as_deref(), Some(USAGE_REPLY));
    }
}
