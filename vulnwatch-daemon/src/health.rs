//! `/health` report.
//!
//! The daemon is as healthy as its least healthy enabled module: one
//! unhealthy module makes the whole report unhealthy (HTTP 503), otherwise
//! any degraded module degrades it. Reasons are prefixed with the module
//! name and joined with `"; "`.

use serde::Serialize;

use vulnwatch_core::pipeline::HealthStatus;

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    pub status: HealthStatus,
    pub uptime_secs: u64,
    /// Projects with a scan in the `RUNNING` state.
    pub running_scans: usize,
    /// Open notification streams across all users.
    pub subscribers: usize,
    pub modules: Vec<ModuleHealth>,
}

/// One entry of [`DaemonHealth::modules`].
#[derive(Debug, Clone, Serialize)]
pub struct ModuleHealth {
    pub name: String,
    pub enabled: bool,
    pub status: HealthStatus,
}

/// Fold module statuses into the daemon status. Disabled modules are ignored.
pub fn aggregate_status(modules: &[ModuleHealth]) -> HealthStatus {
    let mut degraded = Vec::new();
    let mut unhealthy = Vec::new();

    for module in modules.iter().filter(|m| m.enabled) {
        let reason = match &module.status {
            HealthStatus::Healthy => continue,
            HealthStatus::Degraded(reason) => {
                degraded.push(format!("{}: {reason}", module.name));
                continue;
            }
            HealthStatus::Unhealthy(reason) => reason,
        };
        unhealthy.push(format!("{}: {reason}", module.name));
    }

    if !unhealthy.is_empty() {
        HealthStatus::Unhealthy(unhealthy.join("; "))
    } else if !degraded.is_empty() {
        HealthStatus::Degraded(degraded.join("; "))
    } else {
        HealthStatus::Healthy
    }
}
