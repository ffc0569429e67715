//! Plugin execution with per-step failure isolation.
//!
//! - [`execute_plugin`](PipelineExecutor::execute_plugin) runs one plugin:
//!   validate, then execute
//! - [`execute_pipeline`](PipelineExecutor::execute_pipeline) runs steps in
//!   order and stops at the first failure
//! - [`execute_parallel`](PipelineExecutor::execute_parallel) runs every step
//!   concurrently on its own copy of the context

use std::sync::Arc;

use futures::future;
use tracing::{debug, error, info};

use atac_core::{AtacError, AtacResult, Payload};

use crate::context::PluginContext;
use crate::plugin::{Plugin, missing_services};

/// One stage of a pipeline: a plugin and the config overlaid for it.
#[derive(Clone)]
pub struct PipelineStep {
    pub plugin: Arc<dyn Plugin>,
    pub config: Payload,
}

impl PipelineStep {
    pub fn new(plugin: Arc<dyn Plugin>) -> Self {
        Self {
            plugin,
            config: Payload::new(),
        }
    }

    pub fn with_config(mut self, config: Payload) -> Self {
        self.config = config;
        self
    }
}

impl std::fmt::Debug for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineStep")
            .field("plugin", &self.plugin.manifest().id)
            .field("config", &self.config)
            .finish()
    }
}

/// Outcome of a sequential or fan-out run.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub success: bool,
    /// Context after the last successful step (sequential) or of this step
    /// (fan-out).
    pub context: PluginContext,
    pub errors: Vec<AtacError>,
}

/// Runs plugins against plugin contexts.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineExecutor;

impl PipelineExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Validates and executes `plugin` against `ctx`, returning the context
    /// with whatever response the plugin produced.
    ///
    /// # Errors
    ///
    /// - [`AtacError::PluginMissingServices`] when validation returns `false`
    /// - [`AtacError::PluginExecuteFailed`] when validation or execution
    ///   returns an error
    pub async fn execute_plugin(
        &self,
        plugin: &dyn Plugin,
        mut ctx: PluginContext,
    ) -> AtacResult<PluginContext> {
        self.run(plugin, &mut ctx).await?;
        Ok(ctx)
    }

    async fn run(&self, plugin: &dyn Plugin, ctx: &mut PluginContext) -> AtacResult<()> {
        let manifest = plugin.manifest();
        let plugin_id = manifest.id.as_str();
        let execute_failed = |e: atac_core::BoxError| AtacError::PluginExecuteFailed {
            plugin_id: plugin_id.to_string(),
            error: e.to_string(),
        };

        info!(plugin = %plugin_id, "Executing plugin");

        if !plugin.validate_context(ctx).await.map_err(execute_failed)? {
            return Err(AtacError::PluginMissingServices {
                plugin_id: plugin_id.to_string(),
                missing: missing_services(manifest, ctx),
            });
        }

        plugin.execute(ctx).await.map_err(execute_failed)?;

        info!(plugin = %plugin_id, "Plugin executed");
        Ok(())
    }

    /// Runs `steps` strictly in order, overlaying each step's config onto
    /// the running context. The first failure stops the pipeline; the
    /// returned context is the one produced by the last successful step.
    pub async fn execute_pipeline(
        &self,
        steps: &[PipelineStep],
        initial: PluginContext,
    ) -> PipelineResult {
        let mut current = initial;

        for (index, step) in steps.iter().enumerate() {
            let mut step_ctx = current.clone();
            step_ctx.merge_config(&step.config);

            match self.run(step.plugin.as_ref(), &mut step_ctx).await {
                Ok(()) => current = step_ctx,
                Err(e) => {
                    error!(step = index, code = %e.code(), error = %e, "Pipeline step failed");
                    return PipelineResult {
                        success: false,
                        context: current,
                        errors: vec![e],
                    };
                }
            }
        }

        PipelineResult {
            success: true,
            context: current,
            errors: Vec::new(),
        }
    }

    /// Runs every step concurrently on an independent copy of `initial`
    /// with a fresh response, and returns one result per step in step order.
    pub async fn execute_parallel(
        &self,
        steps: &[PipelineStep],
        initial: &PluginContext,
    ) -> Vec<PipelineResult> {
        debug!(steps = steps.len(), "Executing parallel pipeline");

        future::join_all(steps.iter().map(|step| {
            let mut step_ctx = initial.clone();
            step_ctx.merge_config(&step.config);
            step_ctx.response = Default::default();

            async move {
                match self.run(step.plugin.as_ref(), &mut step_ctx).await {
                    Ok(()) => PipelineResult {
                        success: true,
                        context: step_ctx,
                        errors: Vec::new(),
                    },
                    Err(e) => {
                        error!(
                            plugin = %step.plugin.manifest().id,
                            code = %e.code(),
                            error = %e,
                            "Parallel step failed"
                        );
                        PipelineResult {
                            success: false,
                            context: step_ctx,
                            errors: vec![e],
                        }
                    }
                }
            }
        }))
        .await
    }
}
