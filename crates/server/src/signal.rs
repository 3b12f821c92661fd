// SimBridge - HW/SW Co-Simulation Bridge
// Copyright (C) 2026 SimBridge Contributors
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Signal-protocol server. Persistent: control clients (testbench
//! harnesses, debug tools) may connect, disconnect and reconnect for
//! as long as the bridge runs. One client is served at a time; its
//! subscriptions die with its connection.

use crate::net::{self, Recv};
use crate::ServerConfig;
use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use simbridge_core::bridge::BridgePort;
use simbridge_core::BridgeError;
use simbridge_protocol::signal::SignalRequest;
use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use tracing::{debug, error, info};

pub struct SignalServer {
    path: PathBuf,
    port: BridgePort,
    notify_rx: Receiver<Vec<u8>>,
    config: ServerConfig,
}

impl SignalServer {
    pub fn new(
        path: impl Into<PathBuf>,
        port: BridgePort,
        notify_rx: Receiver<Vec<u8>>,
        config: ServerConfig,
    ) -> Self {
        Self {
            path: path.into(),
            port,
            notify_rx,
            config,
        }
    }

    /// Bind and serve clients one at a time until the bridge stops.
    pub fn run(self) -> Result<()> {
        let listener = net::bind_listener(&self.path)
            .with_context(|| format!("binding signal socket {}", self.path.display()))?;
        info!(path = %self.path.display(), "signal server listening");

        while let Some(stream) =
            net::accept_or_stop(&listener, &self.port, self.config.accept_poll)?
        {
            info!("signal client connected");
            if let Err(e) = self.handle_client(stream) {
                error!(error = %e, "signal session failed");
            }
            info!("signal client disconnected");
            self.port.end_session();
            // Notifications for the dead session must not leak into
            // the next one.
            while self.notify_rx.try_recv().is_ok() {}
        }

        let _ = std::fs::remove_file(&self.path);
        info!("signal server shut down");
        Ok(())
    }

    fn handle_client(&self, mut stream: UnixStream) -> Result<()> {
        stream.set_read_timeout(Some(self.config.read_timeout))?;
        loop {
            // Push pending change notifications before blocking on the
            // next request, so subscribers see edges promptly even on
            // a quiet control connection.
            while let Ok(frame) = self.notify_rx.try_recv() {
                stream.write_all(&frame)?;
            }

            let opcode = match net::recv_exact(&mut stream, 1, &self.port)? {
                Recv::Closed => return Ok(()),
                Recv::Idle => continue,
                Recv::Frame(b) => b[0],
            };
            let payload_len = SignalRequest::payload_len(opcode);
            let payload = if payload_len == 0 {
                Vec::new()
            } else {
                // Mid-request: keep reading through idle periods until
                // the payload is complete.
                loop {
                    match net::recv_exact(&mut stream, payload_len, &self.port)? {
                        Recv::Closed => return Ok(()),
                        Recv::Idle => continue,
                        Recv::Frame(b) => break b,
                    }
                }
            };

            let req = SignalRequest::decode(opcode, &payload);
            debug!(?req, "signal request");
            match self.port.signal_request(req) {
                Ok(resp) => stream.write_all(&resp.encode())?,
                Err(BridgeError::Stopped) => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
    }
}
