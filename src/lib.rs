use std::{env, time::Duration};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    select,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const DEVICE_NAME: &str = "DEVICE_NAME";
pub const DEVICE_SERIAL_NUMBER: &str = "DEVICE_SERIAL_NUMBER";

// NOTE: Nothing listens on this port. It only shows up in the banner.
pub const ADVERTISED_PORT: u16 = 8000;

pub const PERIOD: Duration = Duration::from_millis(1000);

/// Rendered in place of an unset variable.
pub const PLACEHOLDER: &str = "undefined";

/// Device identification, read once at startup and used for display only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceConfig {
    pub device_name: Option<String>,
    pub serial_number: Option<String>,
}

impl DeviceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var_os(key).map(|it| it.to_string_lossy().into_owned()))
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            device_name: lookup(DEVICE_NAME),
            serial_number: lookup(DEVICE_SERIAL_NUMBER),
        }
    }

    pub fn device_name(&self) -> &str {
        self.device_name.as_deref().unwrap_or(PLACEHOLDER)
    }

    pub fn serial_number(&self) -> &str {
        self.serial_number.as_deref().unwrap_or(PLACEHOLDER)
    }
}

pub fn banner_line(config: &DeviceConfig) -> String {
    format!(
        "Running on http://{}:{ADVERTISED_PORT}",
        config.device_name()
    )
}

pub fn device_line(config: &DeviceConfig) -> String {
    format!(
        " -- Device: {} Serial Number: {}",
        config.device_name(),
        config.serial_number()
    )
}

pub fn tick_line(now: DateTime<Utc>) -> String {
    format!(
        " Hey Testing Reswarm @ {}",
        now.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

pub struct Heartbeat {
    config: DeviceConfig,
    period: Duration,
}

impl Heartbeat {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            period: PERIOD,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Writes the startup banner, then one tick every period until `token` is cancelled
    /// or a write fails.
    ///
    /// The first tick fires one full period after the banner. A late tick is
    /// delayed rather than followed by a burst of catch-up ticks. Cancellation
    /// also interrupts a write that is stuck on a blocked output.
    pub async fn run<W>(&self, out: &mut W, token: &CancellationToken) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let device = device_line(&self.config);
        let banner = banner_line(&self.config);
        if !write_or_cancel(out, &[banner.as_str(), device.as_str()], token).await? {
            info!("heartbeat cancelled during startup");
            return Ok(());
        }
        info!(
            "heartbeat started for {:?} every {:?}",
            self.config.device_name(),
            self.period
        );

        let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut ticks = 0u64;
        loop {
            let written = select! {
                _ = token.cancelled() => false,
                _ = ticker.tick() => {
                    let tick = tick_line(Utc::now());
                    write_or_cancel(out, &[tick.as_str(), device.as_str()], token).await?
                }
            };
            if !written {
                info!("heartbeat stopped after {ticks} ticks");
                break Ok(());
            }
            ticks += 1;
            debug!("tick {ticks}");
        }
    }
}

/// Returns `Ok(false)` if `token` fired before all `lines` were written.
async fn write_or_cancel<W>(
    out: &mut W,
    lines: &[&str],
    token: &CancellationToken,
) -> Result<bool>
where
    W: AsyncWrite + Unpin,
{
    select! {
        _ = token.cancelled() => Ok(false),
        res = write_lines(out, lines) => res.map(|()| true),
    }
}

async fn write_lines<W>(out: &mut W, lines: &[&str]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    for line in lines {
        out.write_all(line.as_bytes())
            .await
            .context("failed to write heartbeat output")?;
        out.write_all(b"\n")
            .await
            .context("failed to write heartbeat output")?;
    }
    out.flush().await.context("failed to flush heartbeat output")
}
