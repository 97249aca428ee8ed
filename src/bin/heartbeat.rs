use std::process::ExitCode;

use anyhow::Result;
use heartbeat_common::{DeviceConfig, Heartbeat};
use tokio::{io, signal};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// Same status a shell reports for a process killed by SIGINT.
const INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Keep stdout for the heartbeat lines themselves.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = DeviceConfig::from_env();
    let token = CancellationToken::new();

    {
        let token = token.clone();
        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("received SIGINT, shutting down...");
                    token.cancel();
                }
                Err(e) => warn!("unable to listen for SIGINT: {e}"),
            }
        });
    }

    Heartbeat::new(config).run(&mut io::stdout(), &token).await?;
    Ok(if token.is_cancelled() {
        ExitCode::from(INTERRUPTED)
    } else {
        ExitCode::SUCCESS
    })
}
