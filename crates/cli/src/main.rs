// SimBridge - HW/SW Co-Simulation Bridge
// Copyright (C) 2026 SimBridge Contributors
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use simbridge_config::{BackendKind, BridgeManifest};
use simbridge_core::bridge::{BridgeConfig, BridgeHandle, ExecutionBridge};
use simbridge_core::devices::{RegisterBank, SoftDevice};
use simbridge_core::Device;
use simbridge_server::memory::MemoryServer;
use simbridge_server::signal::SignalServer;
use simbridge_server::ServerConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

const EXIT_OK: u8 = 0;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

#[derive(Parser, Debug)]
#[command(author, version, about = "SimBridge co-simulation bridge", long_about = None)]
struct Cli {
    /// Path to the bridge manifest (YAML). Without one, a built-in
    /// demo device with two GPIO signals is served.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the memory-protocol socket path
    #[arg(long)]
    memory_socket: Option<PathBuf>,

    /// Override the signal-protocol socket path
    #[arg(long)]
    signal_socket: Option<PathBuf>,

    /// Disable the signal-protocol server
    #[arg(long)]
    no_signal_bridge: bool,

    /// Override the scheduler poll interval in microseconds
    #[arg(long)]
    poll_interval_us: Option<u64>,

    /// Enable verbose execution tracing
    #[arg(short, long)]
    trace: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing with appropriate level based on --trace flag
    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    let manifest = match load_manifest(&cli) {
        Ok(m) => m,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    match run_bridge(&cli, manifest) {
        Ok(()) => ExitCode::from(EXIT_OK),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_RUNTIME_ERROR)
        }
    }
}

fn load_manifest(cli: &Cli) -> Result<BridgeManifest> {
    let mut manifest = match &cli.config {
        Some(path) => BridgeManifest::from_file(path)?,
        None => BridgeManifest::default(),
    };
    if let Some(path) = &cli.memory_socket {
        manifest.memory_socket = path.display().to_string();
    }
    if let Some(path) = &cli.signal_socket {
        manifest.signal_socket = path.display().to_string();
    }
    if let Some(us) = cli.poll_interval_us {
        manifest.poll_interval_us = us;
    }
    if cli.no_signal_bridge {
        manifest.signal_bridge = false;
    }
    Ok(manifest)
}

fn build_device(cli: &Cli, manifest: &BridgeManifest) -> Result<SoftDevice> {
    if cli.config.is_none() {
        info!("no manifest given, serving the built-in demo device");
        return Ok(SoftDevice::demo());
    }
    let space = manifest.register_space_bytes()?;
    let mut device = SoftDevice::new(RegisterBank::new(space as usize));
    for sig in &manifest.signals {
        device.add_signal(&sig.name, sig.width, sig.direction.into(), sig.offset);
    }
    Ok(device)
}

fn run_bridge(cli: &Cli, manifest: BridgeManifest) -> Result<()> {
    match &manifest.name {
        Some(name) => info!(bridge = %name, "Starting SimBridge"),
        None => info!("Starting SimBridge"),
    }
    let device = build_device(cli, &manifest)?;
    let has_signals = !device.signals().is_empty();

    let (bridge, handle) = ExecutionBridge::new(
        device,
        BridgeConfig {
            poll_interval: Duration::from_micros(manifest.poll_interval_us),
        },
    );
    let BridgeHandle { port, notify_rx } = handle;

    // Stop the scheduler on SIGINT/SIGTERM so sockets get unlinked.
    let mut signals = Signals::new([SIGINT, SIGTERM]).context("installing signal handlers")?;
    {
        let port = port.clone();
        std::thread::spawn(move || {
            if signals.forever().next().is_some() {
                info!("shutdown signal received");
                port.stop();
            }
        });
    }

    let mut servers = Vec::new();

    if manifest.signal_bridge && !has_signals {
        warn!("device exposes no signals, not starting the signal server");
    }
    if manifest.signal_bridge && has_signals {
        let server = SignalServer::new(
            &manifest.signal_socket,
            port.clone(),
            notify_rx,
            ServerConfig {
                read_timeout: Duration::from_millis(500),
                ..ServerConfig::default()
            },
        );
        servers.push(std::thread::spawn(move || server.run()));
    }

    match manifest.backend {
        BackendKind::Agent => {
            let server = MemoryServer::new(&manifest.memory_socket, port, ServerConfig::default());
            servers.push(std::thread::spawn(move || server.run()));
        }
        BackendKind::Emulator => {
            // An in-process emulator drives the bridge through a
            // cloned BridgePort instead of the memory socket.
            info!("emulator backend: memory socket disabled, running until signalled");
        }
    }

    let run_result = bridge.run();

    let mut server_failure = None;
    for server in servers {
        match server.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => server_failure = Some(e),
            Err(_) => server_failure = Some(anyhow::anyhow!("server thread panicked")),
        }
    }

    run_result.context("execution bridge failed")?;
    if let Some(e) = server_failure {
        return Err(e);
    }
    info!("SimBridge stopped cleanly");
    Ok(())
}
