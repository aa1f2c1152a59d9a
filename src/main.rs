use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use quest_engine::{telemetry, EngineConfig, QuestEngine};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    telemetry::init_tracing("quest_engine=info");

    let config_path = std::env::var("QUEST_ENGINE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("quest-engine.toml"));

    let config = match EngineConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let engine = match QuestEngine::bootstrap(&config).await {
        Ok(engine) => engine,
        Err(e) => {
            error!("Failed to start quest engine: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Backlog report every 30 seconds until interrupted
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                info!("Quest backlog: {} envelopes", engine.dispatcher().backlog());
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("Shutting down quest engine");
    engine.shutdown().await;
    ExitCode::SUCCESS
}
