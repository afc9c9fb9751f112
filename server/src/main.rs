//! Estimation server entry point.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use estimation_server::{build_state, preload_assets, CliArgs, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "estimation_server=info,estimation_pipeline=info,estimation_remote=info,estimation_api=info,tower_http=info"
                .into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();
    let config = ServerConfig::load(&args)?;

    tracing::info!("Starting estimation server");
    tracing::info!("Static root: {:?}", config.paths.static_root);
    tracing::info!(
        render = %config.services.render_url,
        segment = %config.services.segment_url,
        estimate = %config.services.estimate_url,
        "Inference services"
    );

    let state = build_state(&config);
    preload_assets(&state, &config).await;

    estimation_api::run_server(state, config.api_config()).await
}
