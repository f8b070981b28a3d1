use anyhow::Result;
use glowmarkt_bridge::GlowBridge;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let mut bridge = GlowBridge::from_env()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start bridge: {}", e))?;

    info!("Glowmarkt bridge {} starting up", env!("APP_VERSION"));

    let shutdown = bridge.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping");
            shutdown.send_replace(true);
        }
    });

    match bridge.run().await {
        Ok(()) => {
            info!("Shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Bridge failed with error: {}", e);
            Err(anyhow::anyhow!("Bridge error: {}", e))
        }
    }
}
