use std::sync::Arc;

use duel::infra::state::build_state;
use duel::services::game_flow::GameFlowService;
use duel::transport::spawn_subscriber;
use duel::{stage_dispatcher, Config, WorkerPool};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod telemetry;

#[tokio::main]
async fn main() {
    telemetry::init_tracing();

    // Environment variables must be set by the runtime environment:
    // - Docker: Set via docker-compose env_file or docker run --env-file
    // - Local dev: Source env files manually (e.g., set -a; . ./.env; set +a)
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let app_state = match build_state()
        .with_redis(config.redis_url.clone())
        .with_settings(config.game.clone())
        .build()
        .await
    {
        Ok(state) => state,
        Err(e) => {
            eprintln!("❌ Failed to build application state: {e}");
            std::process::exit(1);
        }
    };

    println!("🚀 Starting duel coordinator with {} workers", config.workers);

    let flow = GameFlowService::new(app_state.clone());
    let dispatcher = Arc::new(stage_dispatcher(flow.clone()));
    let shutdown = CancellationToken::new();

    let pool = WorkerPool::spawn(
        config.workers,
        app_state.timers.clone(),
        dispatcher,
        app_state.clock.clone(),
        config.poll_interval,
        shutdown.clone(),
    );
    let subscriber = spawn_subscriber(&config.redis_url, flow, shutdown.clone());

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown requested");

    shutdown.cancel();
    pool.shutdown().await;
    if let Err(e) = subscriber.await {
        warn!(error = %e, "Inbound subscriber panicked");
    }
    info!("Coordinator stopped");
}
