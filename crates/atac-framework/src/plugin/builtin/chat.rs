//! LLM-backed conversation.
//!
//! Reads `payload.message`, asks the `llm` service for a reply and writes it
//! to the response. When a `cache` service is present replies are cached per
//! user and message; when `use_rag` is set and a `rag` service is present the
//! top search hits are added to the system prompt.
//!
//! ```toml
//! [plugins.chat]
//! model = "gpt-4o-mini"
//! use_rag = true
//! rag_top_k = 3
//! cache_ttl_seconds = 600
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info};

use atac_core::services::{
    CacheService, ChatMessage, GenerateOptions, LlmService, RagOptions, RagService, names,
};
use atac_core::{BoxError, Payload};

use super::{invocation_config, load_defaults};
use crate::context::PluginContext;
use crate::plugin::{Plugin, PluginDescriptor, PluginLoadContext, PluginMetadata};

pub const CHAT_PLUGIN_ID: &str = "chat";

/// Reply shown to the user when generation fails.
pub const FAILURE_REPLY: &str = "Sorry, I encountered an error processing your request.";

/// Replies longer than this many chars are truncated.
pub const MAX_REPLY_CHARS: usize = 2000;
const TRUNCATED_CHARS: usize = 1900;
const TRUNCATION_NOTICE: &str = "\n\n(Response truncated due to length)";

const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 2000;
const DEFAULT_TOP_K: usize = 5;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_RAG_PROMPT: &str =
    "You are a helpful assistant. Use the following context to answer questions:";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ChatConfig {
    model: Option<String>,
    use_rag: bool,
    rag_top_k: Option<usize>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    system_prompt: Option<String>,
    cache_ttl_seconds: Option<u64>,
}

pub struct ChatPlugin {
    metadata: PluginMetadata,
    defaults: Payload,
}

pub fn metadata() -> PluginMetadata {
    PluginMetadata::new(CHAT_PLUGIN_ID, "Chat & Conversation")
        .version("1.0.0")
        .description("Conversational replies from the language model")
        .requires([names::LLM])
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::new(metadata(), build)
}

async fn build(ctx: PluginLoadContext) -> Result<Arc<dyn Plugin>, BoxError> {
    ctx.get_config::<ChatConfig>()?;
    Ok(Arc::new(ChatPlugin {
        metadata: metadata(),
        defaults: load_defaults(&ctx),
    }))
}

impl ChatPlugin {
    async fn respond(&self, ctx: &mut PluginContext) -> Result<(), BoxError> {
        let config: ChatConfig = invocation_config(&self.defaults, ctx)?;
        let message = ctx.event.payload_str("message").unwrap_or_default().to_string();

        let cache = if ctx.services.has(names::CACHE) {
            Some(ctx.services.get::<dyn CacheService>(names::CACHE).await?)
        } else {
            None
        };
        let cache_key = format!("chat:{}:{}", ctx.event.user_id, message_hash(&message));

        if let Some(cache) = &cache
            && let Some(Value::String(cached)) = cache.get(&cache_key).await?
            && !cached.is_empty()
        {
            info!(key = %cache_key, "Cache hit");
            ctx.reply(cached);
            return Ok(());
        }

        let llm = ctx.services.get::<dyn LlmService>(names::LLM).await?;
        let mut options = GenerateOptions {
            messages: vec![ChatMessage::user(message.as_str())],
            model: config.model.clone(),
            system: config.system_prompt.clone(),
            temperature: Some(config.temperature.unwrap_or(DEFAULT_TEMPERATURE)),
            max_tokens: Some(config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
        };

        if config.use_rag && ctx.services.has(names::RAG) {
            let rag = ctx.services.get::<dyn RagService>(names::RAG).await?;
            let hits = rag
                .search(
                    &message,
                    RagOptions {
                        top_k: config.rag_top_k.unwrap_or(DEFAULT_TOP_K),
                        ..Default::default()
                    },
                )
                .await?;
            debug!(hits = hits.len(), "RAG search complete");

            let grounding = hits
                .iter()
                .map(|hit| hit.content.as_str())
                .collect::<Vec<_>>()
                .join("\n---\n");
            let prompt = config.system_prompt.as_deref().unwrap_or(DEFAULT_RAG_PROMPT);
            options.system = Some(format!("{prompt}\n\nContext:\n{grounding}"));
        } else {
            debug!(model = config.model.as_deref().unwrap_or("default"), "Generating reply");
        }

        let reply = truncate_reply(llm.generate(options).await?.text);
        ctx.reply(reply.as_str());

        if let Some(cache) = cache {
            let ttl = config.cache_ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS);
            cache
                .set(&cache_key, Value::String(reply), Some(Duration::from_secs(ttl)))
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Plugin for ChatPlugin {
    fn manifest(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn execute(&self, ctx: &mut PluginContext) -> Result<(), BoxError> {
        let result = self.respond(ctx).await;
        if let Err(e) = &result {
            error!(plugin = CHAT_PLUGIN_ID, error = %e, "Chat reply failed");
            ctx.reply(FAILURE_REPLY);
        }
        result
    }
}

/// Caps a reply at [`MAX_REPLY_CHARS`], keeping the first 1900 chars plus a
/// notice.
fn truncate_reply(text: String) -> String {
    if text.chars().count() <= MAX_REPLY_CHARS {
        return text;
    }
    let mut truncated: String = text.chars().take(TRUNCATED_CHARS).collect();
    truncated.push_str(TRUNCATION_NOTICE);
    truncated
}

/// Stable 32-bit string hash rendered in base 36, used in cache keys.
fn message_hash(message: &str) -> String {
    let hash = message
        .encode_utf16()
        .fold(0_i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)));

    let mut n = i64::from(hash).unsigned_abs();
    if n == 0 {
        return "0".into();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(char::from_digit((n % 36) as u32, 36).unwrap_or('0'));
        n /= 36;
    }
    if hash < 0 {
        digits.push('-');
    }
    digits.iter().rev().collect()
}
