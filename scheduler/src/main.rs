// Outreach scheduler binary: wires config, storage and delivery into the dispatch engine

use anyhow::Context;
use common::config::Settings;
use common::db::open_item_store;
use common::delivery::{DeliveryGateway, LogOnlyGateway, SmtpGateway};
use common::scheduler::{DispatchConfig, DispatchEngine, Scheduler, SystemClock};
use common::telemetry;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("Failed to load configuration")?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    telemetry::init_logging(&settings.observability.log_level)?;
    info!("Starting outreach scheduler");

    if let Some(port) = settings.observability.metrics_port {
        telemetry::init_metrics(port)?;
    }

    let (store, backend) = open_item_store(&settings.database)
        .await
        .context("Failed to open item store")?;
    info!(?backend, "Item store ready");
    let gateway = build_gateway(&settings)?;

    let engine = Arc::new(
        DispatchEngine::init(
            DispatchConfig::from(&settings.scheduler),
            store,
            gateway,
            Arc::new(SystemClock),
        )
        .await,
    );
    info!(
        pending = engine.pending_count().await,
        "Dispatch engine initialized"
    );

    let engine_for_shutdown = Arc::clone(&engine);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        info!("Received Ctrl+C signal, initiating graceful shutdown");
        engine_for_shutdown.stop().await;
    });

    engine.start().await;

    info!("Outreach scheduler stopped");
    Ok(())
}

fn build_gateway(settings: &Settings) -> anyhow::Result<Arc<dyn DeliveryGateway>> {
    if !settings.smtp.enabled {
        warn!("SMTP disabled, deliveries will only be logged");
        return Ok(Arc::new(LogOnlyGateway));
    }

    let gateway = SmtpGateway::new(&settings.smtp).context("Failed to build SMTP gateway")?;
    info!(
        host = %settings.smtp.host,
        port = settings.smtp.port,
        "SMTP gateway initialized"
    );
    Ok(Arc::new(gateway))
}
