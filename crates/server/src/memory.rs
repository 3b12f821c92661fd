// SimBridge - HW/SW Co-Simulation Bridge
// Copyright (C) 2026 SimBridge Contributors
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Memory-protocol server. Serves exactly one execution agent; when
//! that agent disconnects or goes silent, the simulation is over and
//! the whole bridge is stopped.

use crate::net::{self, Recv};
use crate::ServerConfig;
use anyhow::{Context, Result};
use simbridge_core::bridge::BridgePort;
use simbridge_core::BridgeError;
use simbridge_protocol::mmio::{MmioOp, MmioRequest, HDR_SIZE, WRITE_ACK};
use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

pub struct MemoryServer {
    path: PathBuf,
    port: BridgePort,
    config: ServerConfig,
}

impl MemoryServer {
    pub fn new(path: impl Into<PathBuf>, port: BridgePort, config: ServerConfig) -> Self {
        Self {
            path: path.into(),
            port,
            config,
        }
    }

    /// Bind, serve one agent to completion, then stop the bridge.
    pub fn run(self) -> Result<()> {
        let listener = net::bind_listener(&self.path)
            .with_context(|| format!("binding memory socket {}", self.path.display()))?;
        info!(path = %self.path.display(), "memory server listening");

        if let Some(stream) = net::accept_or_stop(&listener, &self.port, self.config.accept_poll)?
        {
            info!("execution agent connected");
            if let Err(e) = self.handle_agent(stream) {
                error!(error = %e, "agent session failed");
            }
        }

        // One agent, one simulation.
        self.port.stop();
        let _ = std::fs::remove_file(&self.path);
        info!("memory server shut down");
        Ok(())
    }

    fn handle_agent(&self, mut stream: UnixStream) -> Result<()> {
        stream.set_read_timeout(Some(self.config.read_timeout))?;
        let mut msg_count: u64 = 0;
        let mut idle_strikes = 0;

        loop {
            match net::recv_exact(&mut stream, HDR_SIZE, &self.port)? {
                Recv::Closed => {
                    info!(msg_count, "agent disconnected");
                    return Ok(());
                }
                Recv::Idle => {
                    // An agent that never spoke may still be booting;
                    // only a previously active agent accrues strikes.
                    if msg_count == 0 {
                        continue;
                    }
                    idle_strikes += 1;
                    if idle_strikes >= self.config.max_idle_strikes {
                        warn!(idle_strikes, "agent went silent, ending simulation");
                        return Ok(());
                    }
                }
                Recv::Frame(frame) => {
                    idle_strikes = 0;
                    let req = MmioRequest::decode(&frame).context("malformed memory request")?;
                    msg_count += 1;
                    debug!(?req, "memory request");
                    match self.port.execute_mmio(req) {
                        Ok(value) => match req.op {
                            MmioOp::Read => stream.write_all(&req.encode_read_reply(value))?,
                            MmioOp::Write => stream.write_all(&[WRITE_ACK])?,
                        },
                        Err(BridgeError::Stopped) => return Ok(()),
                        // The bridge is already going down; there is no
                        // fault encoding on this wire, so just hang up.
                        Err(BridgeError::Device(fault)) => {
                            return Err(anyhow::Error::new(fault).context("device fault"))
                        }
                    }
                }
            }
        }
    }
}
