use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use dsp_core::{Command, Event, StateBroadcast};
use dsp_daemon::{broadcaster, dsp_client, hub, ingress, reactor};
use dsp_proto::Config;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Parser)]
#[command(name = "dsp-daemon", about = "Volume/mute bridge daemon")]
struct Args {
    /// Path to the YAML config file. Defaults to the platform config directory.
    #[arg(long, env = "DSP_DAEMON_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides the config's `log_level` (tracing `EnvFilter` syntax).
    #[arg(long, env = "DSP_DAEMON_LOG")]
    log_level: Option<String>,

    /// Overrides the config's tick rate.
    #[arg(long)]
    update_hz: Option<u32>,

    /// Overrides the config's ingress bind address.
    #[arg(long)]
    ingress_bind_address: Option<String>,

    /// Overrides the config's ingress port.
    #[arg(long)]
    ingress_port: Option<u16>,

    /// Overrides the config's subscriber hub bind address.
    #[arg(long)]
    subscriber_bind_address: Option<String>,

    /// Overrides the config's subscriber hub port.
    #[arg(long)]
    subscriber_port: Option<u16>,
}

fn apply_overrides(mut config: Config, args: &Args) -> Config {
    if let Some(update_hz) = args.update_hz {
        config.update_hz = update_hz;
    }
    if let Some(ref addr) = args.ingress_bind_address {
        config.ingress.bind_address = addr.clone();
    }
    if let Some(port) = args.ingress_port {
        config.ingress.port = port;
    }
    if let Some(ref addr) = args.subscriber_bind_address {
        config.subscriber.bind_address = addr.clone();
    }
    if let Some(port) = args.subscriber_port {
        config.subscriber.port = port;
    }
    config
}

const EVENT_QUEUE_DEPTH: usize = 256;
const OBSERVATION_QUEUE_DEPTH: usize = 128;
const COMMAND_QUEUE_DEPTH: usize = 64;
const BROADCAST_QUEUE_DEPTH: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    let config = apply_overrides(config, &args);

    init_logging(args.log_level.as_deref().unwrap_or(&config.log_level))?;
    info!("config loaded");

    let (event_tx, event_rx) = mpsc::channel::<Event>(EVENT_QUEUE_DEPTH);
    let (observation_tx, observation_rx) = mpsc::channel::<Event>(OBSERVATION_QUEUE_DEPTH);
    let (command_tx, command_rx) = mpsc::channel::<Command>(COMMAND_QUEUE_DEPTH);
    let (broadcast_tx, broadcast_rx) = mpsc::channel::<StateBroadcast>(BROADCAST_QUEUE_DEPTH);
    let (hub_tx, hub_rx) = mpsc::channel::<hub::HubCommand>(config.subscriber.inbound_depth);
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let dsp_config = dsp_client::DspClientConfig {
        url: config.dsp.url.clone(),
        read_timeout: Duration::from_millis(config.dsp.read_timeout_ms),
        reconnect_delay: Duration::from_millis(config.dsp.reconnect_delay_ms),
    };

    let dsp_handle = tokio::spawn(dsp_client::run(dsp_config, command_rx, observation_tx));
    let broadcaster_handle = tokio::spawn(broadcaster::run(
        broadcast_rx,
        hub_tx.clone(),
        Duration::from_millis(config.ws_coalesce_window_ms),
    ));
    let hub_task_handle = tokio::spawn(hub::run(hub_rx));

    let router = hub::router(hub_tx.clone(), event_tx.clone(), config.subscriber.queue_depth);
    let hub_server_handle = tokio::spawn(hub::serve(
        config.subscriber.bind_address.clone(),
        config.subscriber.port,
        router,
    ));

    let ingress_handle = tokio::spawn(ingress::run(
        config.ingress.bind_address.clone(),
        config.ingress.port,
        event_tx.clone(),
    ));

    let reactor = reactor::Reactor::new(
        config.velocity_config(),
        config.rotary_config(),
        config.update_hz,
        event_rx,
        observation_rx,
        command_tx,
        broadcast_tx,
        cancel_rx,
    );

    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        let _ = cancel_tx.send(true);
    });

    info!("daemon initialised, running reactor loop");
    reactor.run().await;
    info!("reactor loop exited, shutting down supporting tasks");

    dsp_handle.abort();
    broadcaster_handle.abort();
    hub_task_handle.abort();
    hub_server_handle.abort();
    ingress_handle.abort();

    Ok(())
}

fn init_logging(filter: &str) -> anyhow::Result<()> {
    let data_dir = dsp_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(env_filter)
        .init();

    info!("log file: {log_path:?}");
    Ok(())
}
