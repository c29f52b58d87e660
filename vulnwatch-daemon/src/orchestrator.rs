//! Module orchestration -- assembly, HTTP server and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `vulnwatch-daemon`.
//! It validates configuration, builds the store, notification bus and scan
//! orchestrator, registers background modules, serves the HTTP API and
//! manages startup/shutdown ordering.
//!
//! # Assembly Order
//!
//! 1. Metrics recorder (so every later component records into it)
//! 2. In-memory store (+ optional seed data)
//! 3. Mailer and notification bus
//! 4. Advisory sources, rate limiters and resolver
//! 5. Scan orchestrator (+ registry lookup when `[registry]` is enabled)
//! 6. Alert scheduler module
//!
//! # Shutdown
//!
//! The shutdown token stops the HTTP server and the uptime updater; open
//! notification streams never end on their own, so the server gets a bounded
//! drain window before it is aborted. Modules are stopped last.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use axum::Router;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use vulnwatch_core::config::VulnwatchConfig;
use vulnwatch_core::store::MemoryStore;
use vulnwatch_notify::{BusConfig, NotificationBus, mailer_from_config};
use vulnwatch_scanner::{
    HttpRegistry, RateLimiters, Resolver, ScanConfig, ScanOrchestrator, build_sources,
};

use crate::api::{self, AppState};
use crate::health::DaemonHealth;
use crate::metrics_server;
use crate::modules::{self, ModuleRegistry};
use crate::seed::SeedData;

/// Time the HTTP server gets to finish in-flight requests on shutdown.
const SERVER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Uptime gauge refresh interval.
const UPTIME_INTERVAL: Duration = Duration::from_secs(10);

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: VulnwatchConfig,
    /// Handler state (scan orchestrator, bus, module registry).
    state: AppState,
    /// Cancelled once to stop the server and background tasks.
    shutdown: CancellationToken,
}

impl Orchestrator {
    /// Load configuration (file + environment overrides) and build.
    pub async fn build(config_path: &Path, seed_path: Option<&Path>) -> Result<Self> {
        let config = VulnwatchConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        let seed = match seed_path {
            Some(path) => Some(SeedData::load(path).await?),
            None => None,
        };
        Self::build_from_config(config, seed).await
    }

    /// Build from an already-loaded configuration.
    ///
    /// # Errors
    ///
    /// - Configuration validation fails
    /// - Metrics recorder cannot be installed
    /// - Mailer, advisory source or module construction fails
    pub async fn build_from_config(config: VulnwatchConfig, seed: Option<SeedData>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let store = Arc::new(MemoryStore::new());
        if let Some(seed) = &seed {
            seed.apply(&store).await;
        }

        let mailer = mailer_from_config(&config.email)
            .map_err(|e| anyhow::anyhow!("failed to create mailer: {}", e))?;
        let bus_config = BusConfig::from_core(&config);
        bus_config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid notification config: {}", e))?;
        let bus = Arc::new(NotificationBus::new(Arc::clone(&store), mailer, bus_config));

        let scan_config = ScanConfig::from_core(&config);
        let sources = build_sources(&config.sources, scan_config.source_timeout)
            .map_err(|e| anyhow::anyhow!("failed to build advisory sources: {}", e))?;
        tracing::info!(
            sources = sources.len(),
            names = ?sources.iter().map(|s| s.name().to_owned()).collect::<Vec<_>>(),
            "advisory sources configured"
        );
        let limiters = Arc::new(RateLimiters::from_sources(&config.sources));
        let resolver = Resolver::new(
            sources,
            limiters,
            scan_config.retry,
            scan_config.source_timeout,
        );
        let mut scanner = ScanOrchestrator::new(store, bus, resolver, scan_config)
            .map_err(|e| anyhow::anyhow!("failed to build scan orchestrator: {}", e))?;
        if config.registry.enabled {
            let lookup = HttpRegistry::new(config.registry.clone())
                .map_err(|e| anyhow::anyhow!("failed to build registry client: {}", e))?;
            scanner = scanner.with_latest_versions(Arc::new(lookup));
            tracing::info!("latest version lookup enabled");
        }
        let scanner = Arc::new(scanner);

        let mut registry = ModuleRegistry::new();
        registry.register(modules::scheduler::init(&config, Arc::clone(&scanner))?);
        tracing::info!(
            total_modules = registry.count(),
            enabled_modules = registry.enabled_count(),
            "orchestrator initialized"
        );

        let state = AppState::new(scanner, Arc::new(RwLock::new(registry)));
        Ok(Self {
            config,
            state,
            shutdown: CancellationToken::new(),
        })
    }

    /// Start all modules and the HTTP server, then block until shutdown.
    ///
    /// # Shutdown Triggers
    ///
    /// - `SIGTERM` (from systemd, Docker, or `kill`)
    /// - `SIGINT` (Ctrl+C)
    /// - cancellation of [`Orchestrator::shutdown_token`]
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("starting all modules");
        self.state.modules.write().await.start_all().await?;

        let server_task = if self.config.server.enabled {
            match self.spawn_server().await {
                Ok(task) => Some(task),
                Err(e) => {
                    self.state.modules.write().await.stop_all().await?;
                    return Err(e);
                }
            }
        } else {
            tracing::info!("HTTP API disabled in configuration");
            None
        };

        let uptime_task = if self.config.metrics.enabled {
            Some(spawn_uptime_updater(
                self.state.start_time,
                self.shutdown.clone(),
            ))
        } else {
            None
        };

        tracing::info!("vulnwatch daemon running");
        tokio::select! {
            signal = wait_for_shutdown_signal() => {
                match signal {
                    Ok(signal) => tracing::info!(signal, "shutdown signal received"),
                    Err(e) => tracing::error!(error = %e, "signal handling failed, shutting down"),
                }
            }
            _ = self.shutdown.cancelled() => {
                tracing::info!("shutdown requested");
            }
        }
        self.shutdown.cancel();

        if let Some(mut task) = server_task {
            match tokio::time::timeout(SERVER_DRAIN_TIMEOUT, &mut task).await {
                Ok(Ok(Ok(()))) => tracing::info!("HTTP server stopped"),
                Ok(Ok(Err(e))) => tracing::error!(error = %e, "HTTP server failed"),
                Ok(Err(e)) => tracing::error!(error = %e, "HTTP server task panicked"),
                Err(_) => {
                    tracing::warn!(
                        timeout_secs = SERVER_DRAIN_TIMEOUT.as_secs(),
                        "HTTP server did not drain in time, aborting open connections"
                    );
                    task.abort();
                }
            }
        }

        if let Some(task) = uptime_task {
            let _ = task.await;
        }

        self.shutdown().await
    }

    async fn spawn_server(&self) -> Result<JoinHandle<std::io::Result<()>>> {
        let listener = tokio::net::TcpListener::bind(&self.config.server.bind)
            .await
            .map_err(|e| anyhow::anyhow!("failed to bind {}: {}", self.config.server.bind, e))?;
        tracing::info!(bind = %self.config.server.bind, "HTTP API listening");

        let app = self.router();
        let token = self.shutdown.clone();
        Ok(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
        }))
    }

    /// Stop all modules in reverse registration order.
    async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("stopping all modules");
        self.state.modules.write().await.stop_all().await
    }

    /// Current aggregated health status.
    pub async fn health(&self) -> DaemonHealth {
        self.state.health().await
    }

    /// HTTP router over this daemon's state.
    pub fn router(&self) -> Router {
        api::router(self.state.clone())
    }

    /// Token that stops [`Orchestrator::run`] when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Handler state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Loaded configuration.
    pub fn config(&self) -> &VulnwatchConfig {
        &self.config
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Spawn a background task that periodically updates the uptime metric.
fn spawn_uptime_updater(start_time: Instant, shutdown: CancellationToken) -> JoinHandle<()> {
    use vulnwatch_core::metrics as m;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPTIME_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(start_time.elapsed().as_secs() as f64);
                }
                _ = shutdown.cancelled() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_uptime_updater_stops_on_cancel() {
        // Given: A running uptime updater
        let token = CancellationToken::new();
        let task = spawn_uptime_updater(Instant::now(), token.clone());

        // When: Cancelling the token
        token.cancel();

        // Then: Task should complete quickly
        let result = tokio::time::timeout(Duration::from_millis(200), task).await;
        assert!(result.is_ok(), "uptime updater should stop within timeout");
    }
}
