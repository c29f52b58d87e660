//! Background module registry.
//!
//! Every long-running component of the daemon (today only the alert
//! scheduler) is registered as a [`ModuleHandle`] and driven through the
//! object-safe [`DynPipeline`] trait. The registry remembers which modules
//! it actually started, so a partial startup can be unwound and a second
//! `stop_all` is a no-op.

pub mod scheduler;

use anyhow::Result;

use vulnwatch_core::pipeline::{DynPipeline, HealthStatus};

use crate::health::ModuleHealth;

/// A registered background module.
pub struct ModuleHandle {
    /// Name used in logs and `/health`.
    pub name: String,
    /// Disabled modules are listed in health reports but never started.
    pub enabled: bool,
    pipeline: Box<dyn DynPipeline>,
    started: bool,
}

impl ModuleHandle {
    pub fn new(name: impl Into<String>, enabled: bool, pipeline: Box<dyn DynPipeline>) -> Self {
        Self {
            name: name.into(),
            enabled,
            pipeline,
            started: false,
        }
    }

    /// Whether the registry has started this module and not yet stopped it.
    pub fn is_started(&self) -> bool {
        self.started
    }

    async fn status(&self) -> HealthStatus {
        if self.enabled {
            self.pipeline.health_check().await
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Ordered set of daemon modules.
///
/// Start order is registration order; stop order is the reverse.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<ModuleHandle>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handle: ModuleHandle) {
        tracing::debug!(module = %handle.name, enabled = handle.enabled, "module registered");
        self.modules.push(handle);
    }

    /// Start every enabled module that is not already running.
    ///
    /// If one fails, the modules started by this call are stopped again
    /// before the error is returned.
    pub async fn start_all(&mut self) -> Result<()> {
        let mut started_now = Vec::new();

        for (index, handle) in self.modules.iter_mut().enumerate() {
            if !handle.enabled || handle.started {
                continue;
            }

            tracing::info!(module = %handle.name, "starting module");
            match handle.pipeline.start().await {
                Ok(()) => {
                    handle.started = true;
                    started_now.push(index);
                }
                Err(e) => {
                    let error = anyhow::anyhow!("failed to start module '{}': {}", handle.name, e);
                    tracing::warn!(
                        module = %handle.name,
                        rollback = started_now.len(),
                        "startup failed, stopping modules started so far"
                    );
                    self.stop_indices(started_now.into_iter().rev()).await;
                    return Err(error);
                }
            }
        }
        Ok(())
    }

    /// Stop every started module in reverse registration order.
    ///
    /// All modules are attempted; failures are collected into one error.
    pub async fn stop_all(&mut self) -> Result<()> {
        let indices: Vec<usize> = (0..self.modules.len()).rev().collect();
        let errors = self.stop_indices(indices.into_iter()).await;
        if errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow::anyhow!("errors stopping modules: {}", errors.join("; ")))
        }
    }

    async fn stop_indices(&mut self, indices: impl Iterator<Item = usize>) -> Vec<String> {
        let mut errors = Vec::new();
        for index in indices {
            let Some(handle) = self.modules.get_mut(index) else {
                continue;
            };
            if !handle.started {
                continue;
            }

            tracing::info!(module = %handle.name, "stopping module");
            handle.started = false;
            if let Err(e) = handle.pipeline.stop().await {
                tracing::error!(module = %handle.name, error = %e, "failed to stop module");
                errors.push(format!("{}: {}", handle.name, e));
            }
        }
        errors
    }

    /// Health of every registered module, in registration order.
    pub async fn health(&self) -> Vec<ModuleHealth> {
        let mut report = Vec::with_capacity(self.modules.len());
        for handle in &self.modules {
            report.push(ModuleHealth {
                name: handle.name.clone(),
                enabled: handle.enabled,
                status: handle.status().await,
            });
        }
        report
    }

    pub fn count(&self) -> usize {
        self.modules.len()
    }

    pub fn enabled_count(&self) -> usize {
        self.modules.iter().filter(|m| m.enabled).count()
    }
}
