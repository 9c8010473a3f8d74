mod sim;

use std::path::PathBuf;

use amr_ua::prelude::*;
use clap::Parser;
use tracing::info;

use crate::sim::Simulator;

#[derive(Debug, Parser)]
#[command(about = "Robot telemetry server publishing over Zenoh")]
struct Args {
    /// JSON5 configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Publish interval in milliseconds
    #[arg(short, long)]
    interval_ms: Option<u64>,
    /// Key expression snapshots are published on
    #[arg(short, long)]
    key_expr: Option<String>,
    /// Zenoh session mode (peer, client, router)
    #[arg(short, long)]
    mode: Option<String>,
    /// Zenoh endpoint to connect to
    #[arg(short, long)]
    endpoint: Option<String>,
    /// Feed the server with simulated telemetry
    #[arg(short, long)]
    simulate: bool,
}

fn load_config(args: &Args) -> Result<ServerConfig> {
    let mut builder = ServerConfig::builder();
    if let Some(path) = &args.config {
        builder = builder.with_config_file(path);
    }
    if let Some(ms) = args.interval_ms {
        builder = builder.with_override("publish_interval_ms", ms);
    }
    if let Some(key_expr) = &args.key_expr {
        builder = builder.with_override("transport/key_expr", key_expr);
    }
    if let Some(mode) = &args.mode {
        builder = builder.with_override("transport/mode", mode);
    }
    if let Some(endpoint) = &args.endpoint {
        builder = builder.with_override("transport/connect_endpoints", [endpoint]);
    }
    builder.build()
}

fn main() -> Result<()> {
    zenoh::init_log_from_env_or("info");
    let args = Args::parse();
    let config = load_config(&args)?;
    info!("[SERVER] Configuration: {:?}", config);

    let (command_tx, command_rx) = flume::unbounded();
    let catalog = NodeCatalog::builder()
        .with_navigation_nodes(config.navigation_nodes.clone())
        .with_command_sink(command_tx)
        .build()?;

    let mut bridge = ZenohBridge::builder().with_key_expr(config.transport.key_expr.clone());
    if let Some(mode) = &config.transport.mode {
        bridge = bridge.with_mode(mode);
    }
    if !config.transport.connect_endpoints.is_empty() {
        bridge = bridge.with_connect_endpoints(config.transport.connect_endpoints.clone());
    }
    let bridge = bridge.build()?;

    let mut scheduler =
        PublishScheduler::builder(catalog.space().clone(), bridge).with_interval(config.publish_interval());
    if let Some(variables) = &config.publish_variables {
        scheduler = scheduler.with_variables(variables.clone());
    }
    let _scheduler = scheduler.build()?;

    let _simulator = if args.simulate {
        let sim = Simulator::spawn(catalog.dispatcher(), config.publish_interval())
            .map_err(|e| Error::Spawn(format!("simulator thread: {e}")))?;
        info!("[SERVER] Simulated telemetry enabled");
        Some(sim)
    } else {
        None
    };

    info!("[SERVER] Running, press Ctrl-C to exit");
    // The catalog keeps a sender alive, so this drains until the process ends.
    for command in command_rx.iter() {
        info!("[SERVER] Command for robot: {} {:?}", command, command.targets());
    }
    Ok(())
}
