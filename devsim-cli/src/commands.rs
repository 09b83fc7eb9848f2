use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info, warn};
use validator::Validate;

use devsim_config::{ConfigError, DeviceConfig};
use devsim_engine::DevicePipeline;
use devsim_telemetry::logging::EventLogger;
use devsim_transport::MqttTransport;

#[derive(Parser, Debug)]
#[command(name = "devsim", version, about)]
pub struct Cli {
    /// Device configuration file (YAML, or JSON by extension)
    #[arg(short, long, conflicts_with = "device")]
    pub config: Option<PathBuf>,

    /// Device number; reads config/device<N>/config.yaml
    #[arg(short, long)]
    pub device: Option<u32>,

    /// Connect without TLS even if the configuration enables it
    #[arg(long)]
    pub no_tls: bool,

    /// QoS level for published readings
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=2))]
    pub qos: Option<u8>,

    /// Subscribe to the control topic on every delivery cycle
    #[arg(long)]
    pub subscribe: bool,

    /// Drop the control subscription when shutting down
    #[arg(long)]
    pub unsubscribe: bool,

    /// Upper bound for the whole shutdown, in milliseconds
    #[arg(long, default_value_t = 15_000)]
    pub shutdown_grace: u64,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    pub print_config: bool,
}

impl Cli {
    pub fn config_path(&self) -> Option<PathBuf> {
        match (&self.config, self.device) {
            (Some(path), _) => Some(path.clone()),
            (None, Some(device)) => Some(PathBuf::from(format!("config/device{device}/config.yaml"))),
            (None, None) => None,
        }
    }

    /// Loads the configuration and applies the command-line overrides.
    pub fn load_config(&self) -> Result<DeviceConfig, ConfigError> {
        let mut config = match self.config_path() {
            Some(path) => DeviceConfig::load_from_path(path)?,
            None => DeviceConfig::load()?,
        };
        self.apply_overrides(&mut config);
        // Overrides can switch on sections the file never had validated.
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut DeviceConfig) {
        if self.no_tls {
            config.mqtt.tls.enabled = false;
        }
        if let Some(qos) = self.qos {
            config.mqtt.publish.qos = qos;
        }
        if self.subscribe || self.unsubscribe {
            config.mqtt.subscribe.enabled = true;
        }
        if self.unsubscribe {
            config.mqtt.subscribe.unsubscribe_on_shutdown = true;
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli
        .load_config()
        .context("Failed to load device configuration")?;
    if cli.print_config {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }
    EventLogger::init(&config.telemetry.log_level);
    info!(
        device = %config.device.id,
        host = %config.mqtt.host,
        port = config.mqtt.port,
        tls = config.mqtt.tls.enabled,
        "Configuration loaded"
    );

    let transport = MqttTransport::new(&config.mqtt, config.client_id());
    let mut pipeline = DevicePipeline::new(&config, transport)?;
    pipeline.start().await;

    shutdown_signal()
        .await
        .context("Failed to listen for shutdown signals")?;
    info!("Shutdown requested");

    let grace = Duration::from_millis(cli.shutdown_grace);
    if tokio::time::timeout(grace, pipeline.stop()).await.is_err() {
        warn!(?grace, "Shutdown grace period elapsed, exiting with work outstanding");
    }

    let metrics = pipeline.metrics();
    info!(
        readings = metrics.readings.get(),
        published = metrics.published.get(),
        evicted = metrics.evicted.get(),
        pending = pipeline.buffer().len(),
        "Device stopped"
    );
    match metrics.gather_metrics() {
        Ok(text) => debug!("Final metrics:\n{text}"),
        Err(error) => warn!(%error, "Could not render metrics"),
    }
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
