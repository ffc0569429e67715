//! Plugin system.
//!
//! # Architecture
//!
//! A plugin is a capability unit bound to a set of required services. Each
//! one is described by a [`PluginDescriptor`], which pairs static
//! [`PluginMetadata`] with an async factory. Descriptors are collected into a
//! table at startup and registered with the [`PluginLoader`]; nothing is
//! resolved by name or path at runtime.
//!
//! The factory receives a [`PluginLoadContext`] holding a reduced service
//! container (only the declared `required_services`) and the plugin's
//! optional JSON config, and returns the live `Arc<dyn Plugin>`.
//!
//! # Quick start
//!
//! ```rust,ignore
//! struct Echo(PluginMetadata);
//!
//! #[async_trait]
//! impl Plugin for Echo {
//!     fn manifest(&self) -> &PluginMetadata { &self.0 }
//!
//!     async fn execute(&self, ctx: &mut PluginContext) -> Result<(), BoxError> {
//!         let text = ctx.event.payload_str("message").unwrap_or_default().to_owned();
//!         ctx.reply(text);
//!         Ok(())
//!     }
//! }
//!
//! let echo = PluginDescriptor::new(PluginMetadata::new("echo", "Echo"), |_| async {
//!     Ok(Arc::new(Echo(PluginMetadata::new("echo", "Echo"))) as Arc<dyn Plugin>)
//! });
//! ```
//!
//! # Configuration
//!
//! Plugin configuration comes from the runtime config under `plugins.<id>`
//! and is handed to the factory; the event mapping's `config` bag is
//! available per invocation as [`PluginContext::config`](crate::PluginContext).

pub mod builtin;
mod core;
mod descriptor;
mod loader;

pub use self::core::{Plugin, PluginLoadContext, missing_services};
pub use descriptor::{PluginDescriptor, PluginFactory, PluginMetadata};
pub use loader::{PluginLoader, PluginStatus};
