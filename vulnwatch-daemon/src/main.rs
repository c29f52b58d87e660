use anyhow::Result;
use clap::Parser;

use vulnwatch_core::config::VulnwatchConfig;
use vulnwatch_daemon::cli::DaemonCli;
use vulnwatch_daemon::logging::init_tracing;
use vulnwatch_daemon::orchestrator::Orchestrator;
use vulnwatch_daemon::seed::SeedData;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // 설정 로드: 파일 -> 환경 변수 -> CLI 순으로 덮어씀
    let mut config = VulnwatchConfig::from_file(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config {}: {}", cli.config.display(), e))?;
    config.apply_env_overrides();
    cli.apply_overrides(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

    let seed = match &cli.seed {
        Some(path) => Some(SeedData::load(path).await?),
        None => None,
    };

    if cli.validate {
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "vulnwatch-daemon starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config, seed).await?;
    orchestrator.run().await?;

    tracing::info!("vulnwatch-daemon shut down");
    Ok(())
}
