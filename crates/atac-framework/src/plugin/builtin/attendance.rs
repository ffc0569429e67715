//! Daily attendance: `checkin`, `checkout` and `status` subcommands.
//!
//! One document per user and day is kept in the `data` service under
//! `<user_id>_<YYYY-MM-DD>`. Days and clock times come from the event
//! timestamp, in UTC.
//!
//! ```toml
//! [plugins.attendance]
//! collection_name = "attendance"
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use atac_core::services::{DataService, names};
use atac_core::{BoxError, Payload};

use super::{invocation_config, load_defaults, subcommand};
use crate::context::PluginContext;
use crate::plugin::{Plugin, PluginDescriptor, PluginLoadContext, PluginMetadata};

pub const ATTENDANCE_PLUGIN_ID: &str = "attendance";

/// Reply shown when the data service fails.
pub const FAILURE_REPLY: &str = "Failed to process attendance record.";

const USAGE_REPLY: &str = "Unknown subcommand. Use: checkin, checkout, or status";
const DEFAULT_COLLECTION: &str = "attendance";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AttendanceConfig {
    collection_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct AttendanceRecord {
    user_id: String,
    date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    check_in_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    check_out_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    note: Option<String>,
}

pub struct AttendancePlugin {
    metadata: PluginMetadata,
    defaults: Payload,
}

pub fn metadata() -> PluginMetadata {
    PluginMetadata::new(ATTENDANCE_PLUGIN_ID, "Attendance Management")
        .version("1.0.0")
        .description("Check-in and check-out records per user and day")
        .requires([names::DATA])
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::new(metadata(), build)
}

async fn build(ctx: PluginLoadContext) -> Result<Arc<dyn Plugin>, BoxError> {
    ctx.get_config::<AttendanceConfig>()?;
    Ok(Arc::new(AttendancePlugin {
        metadata: metadata(),
        defaults: load_defaults(&ctx),
    }))
}

/// Addresses today's record of the acting user.
struct Day {
    store: Arc<dyn DataService>,
    collection: String,
    doc_id: String,
    user_id: String,
    date: String,
    now: DateTime<Utc>,
}

impl Day {
    async fn open(ctx: &PluginContext, collection: String) -> Result<Self, BoxError> {
        let store = ctx.services.get::<dyn DataService>(names::DATA).await?;
        let now = DateTime::<Utc>::from(ctx.event.timestamp);
        let date = now.format("%Y-%m-%d").to_string();
        Ok(Self {
            store,
            collection,
            doc_id: format!("{}_{}", ctx.event.user_id, date),
            user_id: ctx.event.user_id.clone(),
            date,
            now,
        })
    }

    async fn load(&self) -> Result<Option<AttendanceRecord>, BoxError> {
        match self.store.get(&self.collection, &self.doc_id).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, record: &AttendanceRecord) -> Result<(), BoxError> {
        self.store
            .set(&self.collection, &self.doc_id, serde_json::to_value(record)?)
            .await?;
        Ok(())
    }
}

impl AttendancePlugin {
    async fn dispatch(
        &self,
        command: &str,
        ctx: &PluginContext,
        collection: String,
    ) -> Result<String, BoxError> {
        let day = Day::open(ctx, collection).await?;
        match command {
            "checkin" => self.check_in(&day).await,
            "checkout" => self.check_out(&day).await,
            _ => self.status(&day).await,
        }
    }

    async fn check_in(&self, day: &Day) -> Result<String, BoxError> {
        if let Some(at) = day.load().await?.and_then(|r| r.check_in_time) {
            return Ok(format!("You have already checked in today at {}.", clock(at)));
        }

        let record = AttendanceRecord {
            user_id: day.user_id.clone(),
            date: day.date.clone(),
            check_in_time: Some(day.now),
            ..Default::default()
        };
        day.save(&record).await?;
        debug!(user = %day.user_id, date = %day.date, "Checked in");
        Ok(format!("Check-in recorded at {}", clock(day.now)))
    }

    async fn check_out(&self, day: &Day) -> Result<String, BoxError> {
        let Some(mut record) = day.load().await?.filter(|r| r.check_in_time.is_some()) else {
            return Ok("You haven't checked in today yet.".into());
        };
        if let Some(at) = record.check_out_time {
            return Ok(format!("You have already checked out today at {}.", clock(at)));
        }

        let checked_in = record.check_in_time.unwrap_or(day.now);
        let minutes = ((day.now - checked_in).num_seconds() + 30).div_euclid(60).max(0);
        record.check_out_time = Some(day.now);
        record.duration_minutes = Some(minutes);
        day.save(&record).await?;
        debug!(user = %day.user_id, minutes, "Checked out");

        Ok(format!(
            "Check-out recorded at {}\nTotal work time: {}",
            clock(day.now),
            hours_minutes(minutes)
        ))
    }

    async fn status(&self, day: &Day) -> Result<String, BoxError> {
        Ok(match day.load().await? {
            Some(record) => format_status(&record),
            None => format!("Attendance Status ({})\nNo record for today.", day.date),
        })
    }
}

#[async_trait]
impl Plugin for AttendancePlugin {
    fn manifest(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn execute(&self, ctx: &mut PluginContext) -> Result<(), BoxError> {
        let config: AttendanceConfig = invocation_config(&self.defaults, ctx)?;
        let collection = config
            .collection_name
            .unwrap_or_else(|| DEFAULT_COLLECTION.to_string());

        let requested = subcommand(ctx);
        let Some(command @ ("checkin" | "checkout" | "status")) = requested.as_deref() else {
            ctx.reply(USAGE_REPLY);
            return Ok(());
        };

        match self.dispatch(command, ctx, collection).await {
            Ok(reply) => {
                ctx.reply(reply);
                Ok(())
            }
            Err(e) => {
                error!(plugin = ATTENDANCE_PLUGIN_ID, error = %e, "Attendance update failed");
                ctx.reply(FAILURE_REPLY);
                Err(e)
            }
        }
    }
}

fn clock(at: DateTime<Utc>) -> String {
    at.format("%H:%M:%S UTC").to_string()
}

fn hours_minutes(minutes: i64) -> String {
    format!("{}h {}m", minutes / 60, minutes % 60)
}

fn format_status(record: &AttendanceRecord) -> String {
    let mut lines = vec![format!("Attendance Status ({})", record.date)];
    if let Some(at) = record.check_in_time {
        lines.push(format!("Check-in: {}", clock(at)));
    }
    match record.check_out_time {
        Some(at) => {
            lines.push(format!("Check-out: {}", clock(at)));
            if let Some(minutes) = record.duration_minutes.filter(|m| *m > 0) {
                lines.push(format!("Duration: {}", hours_minutes(minutes)));
            }
        }
        None => lines.push("Status: Currently working...".into()),
    }
    lines.join("\n")
}
