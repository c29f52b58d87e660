//! Alert scheduler module initialization.
//!
//! Converts `VulnwatchConfig.scheduler` into a `SchedulerConfig`,
//! builds the `AlertScheduler` on top of the shared scan orchestrator,
//! and wraps it in a `ModuleHandle`.
//!
//! ```text
//! AlertScheduler --rescan--> ScanOrchestrator --> NotificationBus
//!               \--digest--> NotificationBus (store + mailer)
//! ```

use std::sync::Arc;

use anyhow::Result;

use vulnwatch_core::config::VulnwatchConfig;
use vulnwatch_core::store::{NotificationStore, ProjectStore};
use vulnwatch_scanner::ScanOrchestrator;
use vulnwatch_scheduler::{AlertSchedulerBuilder, SchedulerConfig};

use super::ModuleHandle;

/// Module name used in logs and health reports.
pub const MODULE_NAME: &str = "alert-scheduler";

/// Initialize the alert scheduler module.
///
/// A scheduler disabled in configuration is still registered (as disabled)
/// so that it shows up in health reports.
pub fn init<S: ProjectStore, N: NotificationStore>(
    config: &VulnwatchConfig,
    orchestrator: Arc<ScanOrchestrator<S, N>>,
) -> Result<ModuleHandle> {
    let scheduler_config = SchedulerConfig::from_core(config);
    let enabled = scheduler_config.enabled;
    if enabled {
        tracing::info!(
            rescan_interval_secs = scheduler_config.rescan_interval.as_secs(),
            digest_interval_secs = scheduler_config.digest_interval.as_secs(),
            boundary = %scheduler_config.boundary,
            "initializing alert scheduler"
        );
    } else {
        tracing::info!("alert scheduler disabled in configuration");
    }

    let scheduler = AlertSchedulerBuilder::new(orchestrator)
        .config(scheduler_config)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build alert scheduler: {}", e))?;

    Ok(ModuleHandle::new(MODULE_NAME, enabled, Box::new(scheduler)))
}
