// SimBridge - HW/SW Co-Simulation Bridge
// Copyright (C) 2026 SimBridge Contributors
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Shared socket plumbing: listener setup and timeout-aware framed
//! reads that distinguish "nothing arrived" from "peer went away".

use simbridge_core::bridge::BridgePort;
use std::io::{self, ErrorKind, Read};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Outcome of one framed read attempt.
pub enum Recv {
    /// A complete frame of the requested length.
    Frame(Vec<u8>),
    /// The read timeout elapsed with zero bytes received.
    Idle,
    /// The peer closed the connection.
    Closed,
}

/// Bind a listener at `path`, replacing any stale socket file left by
/// a previous run. The listener is non-blocking so accept loops can
/// notice bridge shutdown.
pub fn bind_listener(path: &Path) -> io::Result<UnixListener> {
    if path.exists() {
        warn!(path = %path.display(), "removing stale socket");
        std::fs::remove_file(path)?;
    }
    let listener = UnixListener::bind(path)?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Poll `accept` until a client arrives or `running` turns false.
pub fn accept_or_stop(
    listener: &UnixListener,
    port: &BridgePort,
    poll: Duration,
) -> io::Result<Option<UnixStream>> {
    loop {
        if !port.is_running() {
            return Ok(None);
        }
        match listener.accept() {
            Ok((stream, _addr)) => {
                stream.set_nonblocking(false)?;
                return Ok(Some(stream));
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => std::thread::sleep(poll),
            Err(e) => return Err(e),
        }
    }
}

/// Read exactly `n` bytes, one read timeout at a time.
///
/// A timeout with zero bytes read is an idle period and returns
/// [`Recv::Idle`]; a timeout mid-frame keeps reading, because a slow
/// peer that has started a frame is not idle. Returns [`Recv::Closed`]
/// on EOF and whenever the bridge has stopped.
pub fn recv_exact(stream: &mut UnixStream, n: usize, port: &BridgePort) -> io::Result<Recv> {
    let mut buf = vec![0u8; n];
    let mut filled = 0;
    while filled < n {
        if !port.is_running() {
            return Ok(Recv::Closed);
        }
        match stream.read(&mut buf[filled..]) {
            Ok(0) => return Ok(Recv::Closed),
            Ok(len) => filled += len,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e)
                if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut =>
            {
                if filled == 0 {
                    return Ok(Recv::Idle);
                }
            }
            Err(e) => return Err(e),
        }
    }
    Ok(Recv::Frame(buf))
}
