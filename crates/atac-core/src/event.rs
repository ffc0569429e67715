//! Canonical event shape produced by every transport adapter.
//!
//! - [`EventType`] - the fixed event classification (`slash`, `mention`,
//!   `reply`, `cron`, `webhook`)
//! - [`EventContext`] - the immutable inbound event handed to
//!   `Orchestrator::route_event`
//! - [`PluginResponse`] - the mutable reply object a plugin populates

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Open key-value bag used for event payloads and plugin configs.
pub type Payload = Map<String, Value>;

// ============================================================================
// Event Type Classification
// ============================================================================

/// Classification of inbound events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// A slash command invocation.
    Slash,
    /// The bot was mentioned in a message.
    Mention,
    /// A reply to one of the bot's messages.
    Reply,
    /// A scheduled (timer) trigger.
    Cron,
    /// An inbound webhook delivery.
    Webhook,
}

impl EventType {
    /// All event types, in declaration order.
    pub const ALL: [EventType; 5] = [
        EventType::Slash,
        EventType::Mention,
        EventType::Reply,
        EventType::Cron,
        EventType::Webhook,
    ];

    /// Returns the wire name of the event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Slash => "slash",
            Self::Mention => "mention",
            Self::Reply => "reply",
            Self::Cron => "cron",
            Self::Webhook => "webhook",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown event type name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "slash" => Ok(Self::Slash),
            "mention" => Ok(Self::Mention),
            "reply" => Ok(Self::Reply),
            "cron" | "scheduled" => Ok(Self::Cron),
            "webhook" => Ok(Self::Webhook),
            other => Err(UnknownEventType(other.to_string())),
        }
    }
}

// ============================================================================
// EventContext
// ============================================================================

/// The canonical inbound event.
///
/// Transport adapters build one of these per platform event and pass it to
/// the orchestrator. The dispatch core never mutates it; plugins receive a
/// copy inside their `PluginContext`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
    /// Tenant the event belongs to.
    pub customer_id: String,
    /// Originating group (guild/workspace) id.
    #[serde(default)]
    pub guild_id: String,
    /// Originating channel id.
    #[serde(default)]
    pub channel_id: String,
    /// Acting user id.
    #[serde(default)]
    pub user_id: String,
    /// Event classification.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Event-specific data.
    #[serde(default)]
    pub payload: Payload,
    /// When the event occurred.
    #[serde(default = "SystemTime::now")]
    pub timestamp: SystemTime,
}

impl EventContext {
    /// Creates an event for `customer_id` with empty ids and payload,
    /// timestamped now.
    pub fn new(customer_id: impl Into<String>, event_type: EventType) -> Self {
        Self {
            customer_id: customer_id.into(),
            guild_id: String::new(),
            channel_id: String::new(),
            user_id: String::new(),
            event_type,
            payload: Payload::new(),
            timestamp: SystemTime::now(),
        }
    }

    /// Sets the acting user.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Sets the originating channel.
    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = channel_id.into();
        self
    }

    /// Sets the originating group.
    pub fn with_guild(mut self, guild_id: impl Into<String>) -> Self {
        self.guild_id = guild_id.into();
        self
    }

    /// Inserts a payload entry.
    pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Overrides the timestamp.
    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Returns a payload entry as a string slice, if present and a string.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Deserialises the whole payload into a typed view.
    pub fn payload_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(Value::Object(self.payload.clone()))
    }
}

// ============================================================================
// PluginResponse
// ============================================================================

/// A single name/value row inside an [`Embed`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

/// A rich card attached to a response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
}

impl Embed {
    /// Creates an embed with a title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Appends a field.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }
}

/// A file attached to a response, referenced by URL or carried inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<u8>,
}

/// The reply a plugin populates as its only output channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl PluginResponse {
    /// Creates a text-only response.
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Returns `true` if the plugin produced nothing.
    pub fn is_empty(&self) -> bool {
        self.message.is_none() && self.embeds.is_empty() && self.attachments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_from_str() {
        assert_eq!("slash".parse::<EventType>(), Ok(EventType::Slash));
        assert_eq!("CRON".parse::<EventType>(), Ok(EventType::Cron));
        assert_eq!("scheduled".parse::<EventType>(), Ok(EventType::Cron));
        assert!("button".parse::<EventType>().is_err());
    }

    #[test]
    fn test_event_context_deserialize_canonical_shape() {
        let ctx: EventContext = serde_json::from_value(serde_json::json!({
            "type": "slash",
            "user_id": "u1",
            "customer_id": "acme",
            "payload": { "message": "hi" }
        }))
        .unwrap();

        assert_eq!(ctx.event_type, EventType::Slash);
        assert_eq!(ctx.customer_id, "acme");
        assert_eq!(ctx.payload_str("message"), Some("hi"));
        assert!(ctx.channel_id.is_empty());
    }

    #[test]
    fn test_payload_as() {
        #[derive(Deserialize)]
        struct Slash {
            message: String,
        }

        let ctx = EventContext::new("acme", EventType::Slash).with_payload("message", "hello");
        let slash: Slash = ctx.payload_as().unwrap();
        assert_eq!(slash.message, "hello");
    }

    #[test]
    fn test_response_is_empty() {
        assert!(PluginResponse::default().is_empty());
        assert!(!PluginResponse::text("ok").is_empty());

        let with_embed = PluginResponse {
            embeds: vec![Embed::titled("Attendance").field("present", "3", true)],
            ..Default::default()
        };
        assert!(!with_embed.is_empty());
    }
}
