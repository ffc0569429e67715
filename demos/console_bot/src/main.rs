//! Console Bot Demo
//!
//! Every stdin line becomes a `slash` event for one tenant and the plugin
//! responses are printed back. A line of `!cron` fires a scheduled event
//! instead.
//!
//! The tenant maps `slash → chat` and `cron → reminder`. The `llm` service is
//! a local stand-in that echoes the prompt, and `cache` is the in-memory
//! cache, so repeating a line is answered from the cache.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package console-bot -- --user alice --policy all
//! cargo run --package console-bot -- --config atac.toml --customer acme
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use atac::core::ServiceResult;
use atac::core::services::{FinishReason, GenerateOptions, LlmResponse};
use atac::prelude::*;
use atac::runtime::ConfigLoader;
use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

const DEMO_CUSTOMER: &str = "demo";

/// Interactive console front-end for the ATAC dispatch core.
#[derive(Parser, Debug)]
#[command(name = "console-bot")]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file; a built-in demo tenant is used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tenant the events are sent as
    #[arg(long, default_value = DEMO_CUSTOMER)]
    customer: String,

    /// Acting user id
    #[arg(short, long, default_value = "console")]
    user: String,

    /// How multiple plugin responses are printed
    #[arg(long, value_enum, default_value_t = Policy::First)]
    policy: Policy,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Policy {
    First,
    All,
    Merge,
}

impl From<Policy> for DeliveryPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::First => DeliveryPolicy::First,
            Policy::All => DeliveryPolicy::All,
            Policy::Merge => DeliveryPolicy::Merge,
        }
    }
}

/// Stand-in language model that answers with the prompt it received.
struct ParrotLlm;

#[async_trait]
impl LlmService for ParrotLlm {
    async fn generate(&self, options: GenerateOptions) -> ServiceResult<LlmResponse> {
        let prompt = options
            .messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        Ok(LlmResponse {
            text: format!("🦜 {prompt}"),
            finish_reason: FinishReason::Stop,
        })
    }
}

fn demo_config() -> AtacConfig {
    let mut config = AtacConfig {
        customers: vec![
            CustomerConfig::new(DEMO_CUSTOMER, "Console Demo")
                .with_mapping(EventMapping::new(EventType::Slash, "chat"))
                .with_mapping(EventMapping::new(EventType::Cron, "reminder")),
        ],
        ..Default::default()
    };
    config.plugins.insert(
        "reminder".into(),
        serde_json::json!({ "message": "Time to stretch!" }),
    );
    config
}

fn load_config(path: Option<&PathBuf>) -> Result<AtacConfig> {
    match path {
        Some(path) => ConfigLoader::new()
            .file(path)
            .load()
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(demo_config()),
    }
}

fn print_result(result: &OrchestrationResult, policy: DeliveryPolicy) {
    for error in &result.errors {
        warn!(code = %error.code(), "{error}");
    }
    for response in result.deliveries(policy) {
        if let Some(message) = &response.message {
            println!("{message}");
        }
        for embed in &response.embeds {
            println!("[{}]", embed.title.as_deref().unwrap_or("embed"));
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;
    let runtime = AtacRuntime::from_config(&config);

    runtime
        .services()
        .set::<dyn LlmService>(names::LLM, Arc::new(ParrotLlm));
    runtime
        .services()
        .set::<dyn CacheService>(names::CACHE, Arc::new(MemoryCache::new()));
    runtime.register_builtin_plugins();
    runtime.start().await?;

    info!(customer = %args.customer, user = %args.user, "Type a message, !cron or Ctrl+D");
    let policy = DeliveryPolicy::from(args.policy);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event = if line == "!cron" {
            EventContext::new(args.customer.as_str(), EventType::Cron).with_user(args.user.as_str())
        } else {
            EventContext::new(args.customer.as_str(), EventType::Slash)
                .with_user(args.user.as_str())
                .with_channel("console")
                .with_payload("message", line)
        };

        let result = runtime.route_event(&event).await;
        print_result(&result, policy);
    }

    runtime.stop().await;
    Ok(())
}
