//! Built-in plugins shipped with the framework.
//!
//! | Plugin id | Requires | Description |
//! |-----------|----------|-------------|
//! | [`chat`](chat::CHAT_PLUGIN_ID) | `llm` (optional `cache`, `rag`) | LLM conversation |
//! | [`reminder`](reminder::REMINDER_PLUGIN_ID) | none | Scheduled reminder text |
//! | [`attendance`](attendance::ATTENDANCE_PLUGIN_ID) | `data` | Check-in / check-out records |
//! | [`calendar`](calendar::CALENDAR_PLUGIN_ID) | `calendar` | List, create and delete events |
//!
//! # Loading built-in plugins
//!
//! ```rust,ignore
//! for desc in atac_framework::plugin::builtin::descriptors() {
//!     orchestrator.register_plugin(desc);
//! }
//! ```
//!
//! Every plugin reads its settings from the plugin config section
//! (`plugins.<id>` in the runtime config) overlaid with the event
//! mapping's `config` bag; mapping keys win.

pub mod attendance;
pub mod calendar;
pub mod chat;
pub mod reminder;

use serde::de::DeserializeOwned;
use serde_json::Value;

use atac_core::Payload;

use super::{PluginDescriptor, PluginLoadContext};
use crate::context::PluginContext;

/// Descriptors of every built-in plugin.
pub fn descriptors() -> Vec<PluginDescriptor> {
    vec![
        chat::descriptor(),
        reminder::descriptor(),
        attendance::descriptor(),
        calendar::descriptor(),
    ]
}

/// Load-time config section as a map (empty when absent or not an object).
fn load_defaults(ctx: &PluginLoadContext) -> Payload {
    match ctx.raw_config() {
        Some(Value::Object(map)) => map.clone(),
        _ => Payload::new(),
    }
}

/// `defaults` overlaid with the invocation's mapping config, deserialised.
fn invocation_config<T: DeserializeOwned>(
    defaults: &Payload,
    ctx: &PluginContext,
) -> serde_json::Result<T> {
    let mut merged = defaults.clone();
    merged.extend(ctx.config.iter().map(|(k, v)| (k.clone(), v.clone())));
    T::deserialize(Value::Object(merged))
}

/// `payload.options` as a map (empty when absent).
fn options(ctx: &PluginContext) -> Payload {
    match ctx.event.payload.get("options") {
        Some(Value::Object(map)) => map.clone(),
        _ => Payload::new(),
    }
}

/// Slash subcommand from `payload.subcommand`, falling back to
/// `payload.options.subcommand`.
fn subcommand(ctx: &PluginContext) -> Option<String> {
    ctx.event
        .payload_str("subcommand")
        .map(str::to_owned)
        .or_else(|| {
            options(ctx)
                .get("subcommand")
                .and_then(Value::as_str)
                .map(str::to_owned)
        })
}
