//! dh-device: a minimal DeviceHive device.
//!
//! Registers itself, says hello, then answers every command it receives
//! with status `Done` until interrupted.
//!
//! ## Usage
//!
//! ```bash
//! # REST, credentials from the environment
//! DH_ACCESS_KEY=... dh-device --url http://localhost:8080/dh/rest
//!
//! # WebSocket device endpoint
//! dh-device --url ws://localhost:8080/dh/websocket --device-key secret
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use dh_client::{connect, ClientConfig, DeviceApi, Transport};
use serde_json::json;
use shared_types::{Command, Device, DeviceClass, Equipment, Notification};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Demo DeviceHive device
#[derive(Parser, Debug)]
#[command(name = "dh-device")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server base URL; ws:// or wss:// selects WebSocket in auto mode
    #[arg(long, env = "DH_BASE_URL", default_value = "http://localhost:8080/dh/rest")]
    url: String,

    /// Access key sent as a bearer token
    #[arg(long, env = "DH_ACCESS_KEY", default_value = "")]
    access_key: String,

    #[arg(long, value_enum, default_value_t = TransportArg::Auto)]
    transport: TransportArg,

    #[arg(long, default_value = "dh-device-demo")]
    device_id: String,

    #[arg(long, default_value = "")]
    device_key: String,

    /// Per-call timeout in seconds
    #[arg(long, default_value = "60")]
    timeout: u64,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TransportArg {
    Auto,
    Ws,
    Rest,
}

impl From<TransportArg> for Transport {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Auto => Transport::Auto,
            TransportArg::Ws => Transport::WebSocket,
            TransportArg::Rest => Transport::Rest,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.json_logs)?;

    let mut config = ClientConfig::new(&args.url).with_access_key(args.access_key.clone());
    config.timeouts.default = Duration::from_secs(args.timeout);
    config.validate().context("invalid configuration")?;

    let service = connect(config, args.transport.into())
        .await
        .with_context(|| format!("failed to open service at {}", args.url))?;

    let outcome = run(&service, &args).await;
    service.stop().await;
    outcome
}

fn init_logging(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()?;
    }
    Ok(())
}

fn demo_device(args: &Args) -> Device {
    let mut class = DeviceClass::new("dh-device", env!("CARGO_PKG_VERSION"));
    class.add_equipment([
        Equipment::new("LED", "led", "Controllable LED"),
        Equipment::new("Temperature", "temp", "Temperature Sensor"),
    ]);

    let mut device = Device::new(&args.device_id, "Demo device", Some(class));
    device.key = args.device_key.clone();
    device
}

async fn run(service: &Arc<dyn DeviceApi>, args: &Args) -> Result<()> {
    let info = service
        .server_info(None)
        .await
        .context("failed to get server info")?;
    info!(version = %info.version, timestamp = %info.timestamp, "Connected");

    let device = demo_device(args);
    service
        .authenticate(&device, None)
        .await
        .context("failed to authenticate")?;
    service
        .register_device(&device, None)
        .await
        .context("failed to register device")?;
    info!(device = %device, "Device registered");

    let hello = Notification::new("hello", Some(json!({"version": env!("CARGO_PKG_VERSION")})));
    let hello = service
        .insert_notification(&device, &hello, None)
        .await
        .context("failed to insert notification")?;
    info!(notification = %hello, "Said hello");

    let commands = service
        .subscribe_commands(&device, Some(&info.timestamp), None)
        .await
        .context("failed to subscribe to commands")?;
    info!(device_id = %device.id, "Waiting for commands, Ctrl-C to quit");

    loop {
        let command = tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                info!("Interrupted");
                break;
            }
            command = commands.recv() => match command {
                Some(command) => command,
                None => {
                    warn!("Command subscription closed");
                    break;
                }
            },
        };

        info!(command = %command, "Received command");
        let result = Command::result(command.id, "Done", command.parameters.clone());
        if let Err(e) = service.update_command(&device, &result, None).await {
            warn!(command_id = command.id, error = %e, "Failed to report command result");
        }
    }

    service
        .unsubscribe_commands(&device, None)
        .await
        .context("failed to unsubscribe")?;
    Ok(())
}
