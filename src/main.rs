//! Inference gateway server
//!
//! Configuration comes from the JSON file named by `GATEWAY_CONFIG` (if set)
//! with `GATEWAY_*` environment variables layered on top. Log verbosity
//! follows `RUST_LOG`.

use anyhow::Context;
use inference_gateway::{GatewayBuilder, GatewayConfig, LexiconClassifier};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_logging() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;

    let config = GatewayConfig::load().context("loading gateway configuration")?;
    let classifier = LexiconClassifier::new(config.max_tokens);
    let addr = config.http_config.bind_addr;

    let gateway = Arc::new(
        GatewayBuilder::new()
            .with_config(config)
            .with_classifier(classifier)
            .build()
            .context("building gateway")?,
    );

    {
        let gateway = Arc::clone(&gateway);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                gateway.signal_shutdown();
            }
        });
    }

    info!(addr = %addr, "Inference gateway listening");
    gateway.run().await.context("serving HTTP")?;
    Ok(())
}
