//! ask-bot — entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Init logger once
//!   4. Build the configured agent (resolves Google Cloud context if needed)
//!   5. Spawn Ctrl-C → shutdown signal watcher
//!   6. Run the HTTP channel (and instruction watcher) until shutdown

use std::sync::Arc;

use ask_bot::error::AppError;
use ask_bot::http::HttpChannel;
use ask_bot::runtime::{Component, spawn_components};
use ask_bot::{agents, config, logger};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Optional file.
    let _ = dotenvy::dotenv();

    let config = config::load()?;
    logger::init(&config.log_level, config.log_format)?;

    info!(
        agent = %config.agent,
        bind = %config.server.bind,
        llm = %config.llm.provider,
        log_level = %config.log_level,
        "config loaded"
    );

    let (agent, watcher) = agents::build(&config).await?;
    let agent = Arc::new(agent);

    let shutdown = CancellationToken::new();

    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    let mut components: Vec<Box<dyn Component>> = vec![Box::new(HttpChannel::new(config.server.clone(), agent))];
    if let Some(w) = watcher {
        components.push(Box::new(w));
    }

    let handle = spawn_components(components, shutdown.clone());
    let result = handle.join().await;
    shutdown.cancel();

    info!("shutdown complete");
    result
}
