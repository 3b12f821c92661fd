// SimBridge - HW/SW Co-Simulation Bridge
// Copyright (C) 2026 SimBridge Contributors
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Blocking clients for both protocols, used by integration tests and
//! small host-side tools. These speak to a live bridge over its Unix
//! sockets; they are not needed by the bridge itself.

use crate::mmio::{MmioRequest, WRITE_ACK};
use crate::signal::{
    SignalDescriptor, SignalDir, SignalError, SignalRequest, RESP_ACK, RESP_ERR, RESP_LIST,
    RESP_VALUE,
};
use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

const CONNECT_RETRIES: u32 = 50;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(50);
const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("bridge reported {0:?}")]
    Bridge(SignalError),
    #[error("malformed response: {0}")]
    Protocol(String),
    #[error("unknown signal '{0}'")]
    UnknownSignal(String),
}

/// Connect to `path`, retrying while the server is still binding.
fn connect_with_retry(path: &Path) -> io::Result<UnixStream> {
    let mut last_err = io::Error::new(io::ErrorKind::NotFound, "socket never appeared");
    for _ in 0..CONNECT_RETRIES {
        match UnixStream::connect(path) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                last_err = e;
                std::thread::sleep(CONNECT_RETRY_DELAY);
            }
        }
    }
    Err(last_err)
}

fn read_exact(stream: &mut UnixStream, n: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    stream.read_exact(&mut buf)?;
    Ok(buf)
}

/// Client side of the memory protocol, acting as the execution agent.
pub struct MemoryClient {
    stream: UnixStream,
}

impl MemoryClient {
    pub fn connect<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let stream = connect_with_retry(path.as_ref())?;
        stream.set_read_timeout(Some(REPLY_TIMEOUT))?;
        Ok(Self { stream })
    }

    /// Issue a read of `size` bytes at `addr` and return the value.
    pub fn read(&mut self, addr: u64, size: u8) -> io::Result<u64> {
        let req = MmioRequest::read(size, addr);
        self.stream.write_all(&req.encode())?;
        let data = read_exact(&mut self.stream, size as usize)?;
        let mut val = [0u8; 8];
        val[..data.len()].copy_from_slice(&data);
        Ok(u64::from_le_bytes(val))
    }

    /// Issue a write and wait for the acknowledgement byte.
    pub fn write(&mut self, addr: u64, size: u8, val: u64) -> io::Result<()> {
        let req = MmioRequest::write(size, addr, val);
        self.stream.write_all(&req.encode())?;
        let ack = read_exact(&mut self.stream, 1)?;
        if ack[0] != WRITE_ACK {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bad write ack {:#04x}", ack[0]),
            ));
        }
        Ok(())
    }
}

/// Client side of the signal protocol. Fetches the signal table on
/// connect so callers can address signals by name.
pub struct SignalClient {
    stream: UnixStream,
    signals: Vec<SignalDescriptor>,
}

impl SignalClient {
    pub fn connect<P: AsRef<Path>>(path: P) -> Result<Self, ClientError> {
        let stream = connect_with_retry(path.as_ref())?;
        stream.set_read_timeout(Some(REPLY_TIMEOUT))?;
        let mut client = Self {
            stream,
            signals: Vec::new(),
        };
        client.signals = client.list()?;
        Ok(client)
    }

    /// The signal table fetched at connect time.
    pub fn signals(&self) -> &[SignalDescriptor] {
        &self.signals
    }

    fn resolve(&self, name: &str) -> Result<u8, ClientError> {
        self.signals
            .iter()
            .position(|s| s.name == name)
            .map(|i| i as u8)
            .ok_or_else(|| ClientError::UnknownSignal(name.to_string()))
    }

    fn list(&mut self) -> Result<Vec<SignalDescriptor>, ClientError> {
        self.stream.write_all(&SignalRequest::List.encode())?;
        let hdr = read_exact(&mut self.stream, 2)?;
        if hdr[0] != RESP_LIST {
            return Err(ClientError::Protocol(format!(
                "expected LIST_RESP, got {:#04x}",
                hdr[0]
            )));
        }
        let count = hdr[1] as usize;
        let mut signals = Vec::with_capacity(count);
        for _ in 0..count {
            let name_len = read_exact(&mut self.stream, 1)?[0] as usize;
            let name_bytes = read_exact(&mut self.stream, name_len)?;
            let name = String::from_utf8(name_bytes)
                .map_err(|e| ClientError::Protocol(format!("non-utf8 signal name: {e}")))?;
            let tail = read_exact(&mut self.stream, 2)?;
            let dir = SignalDir::from_u8(tail[1])
                .ok_or_else(|| ClientError::Protocol(format!("bad direction {:#04x}", tail[1])))?;
            signals.push(SignalDescriptor {
                name,
                width: tail[0],
                dir,
            });
        }
        Ok(signals)
    }

    /// Read the current value of an output signal.
    pub fn get(&mut self, name: &str) -> Result<u32, ClientError> {
        let idx = self.resolve(name)?;
        self.stream.write_all(&SignalRequest::Get(idx).encode())?;
        let op = read_exact(&mut self.stream, 1)?[0];
        match op {
            RESP_ERR => Err(self.read_err()?),
            RESP_VALUE => {
                let rest = read_exact(&mut self.stream, 5)?;
                let mut v = [0u8; 4];
                v.copy_from_slice(&rest[1..5]);
                Ok(u32::from_le_bytes(v))
            }
            other => Err(ClientError::Protocol(format!(
                "expected VALUE, got {other:#04x}"
            ))),
        }
    }

    /// Drive an input signal.
    pub fn set(&mut self, name: &str, value: u32) -> Result<(), ClientError> {
        let idx = self.resolve(name)?;
        self.request_ack(SignalRequest::Set(idx, value))
    }

    /// Subscribe to change notifications on an output signal.
    pub fn subscribe(&mut self, name: &str) -> Result<(), ClientError> {
        let idx = self.resolve(name)?;
        self.request_ack(SignalRequest::Subscribe(idx))
    }

    pub fn unsubscribe(&mut self, name: &str) -> Result<(), ClientError> {
        let idx = self.resolve(name)?;
        self.request_ack(SignalRequest::Unsub(idx))
    }

    /// Wait up to `timeout` for an unsolicited VALUE notification.
    /// Returns `(signal_index, value)`.
    pub fn recv_notification(&mut self, timeout: Duration) -> Result<(u8, u32), ClientError> {
        self.stream.set_read_timeout(Some(timeout))?;
        let result = (|| {
            let op = read_exact(&mut self.stream, 1)?[0];
            if op != RESP_VALUE {
                return Err(ClientError::Protocol(format!(
                    "expected VALUE push, got {op:#04x}"
                )));
            }
            let rest = read_exact(&mut self.stream, 5)?;
            let mut v = [0u8; 4];
            v.copy_from_slice(&rest[1..5]);
            Ok((rest[0], u32::from_le_bytes(v)))
        })();
        self.stream.set_read_timeout(Some(REPLY_TIMEOUT))?;
        result
    }

    /// Send a raw opcode byte, bypassing the request encoder. Used to
    /// exercise the BadOpcode path.
    pub fn send_raw_opcode(&mut self, opcode: u8) -> Result<(), ClientError> {
        self.stream.write_all(&[opcode])?;
        Ok(())
    }

    /// Read one response that must be ACK or ERR.
    pub fn expect_ack_or_err(&mut self) -> Result<(), ClientError> {
        let op = read_exact(&mut self.stream, 1)?[0];
        match op {
            RESP_ACK => Ok(()),
            RESP_ERR => Err(self.read_err()?),
            other => Err(ClientError::Protocol(format!(
                "expected ACK or ERR, got {other:#04x}"
            ))),
        }
    }

    fn request_ack(&mut self, req: SignalRequest) -> Result<(), ClientError> {
        self.stream.write_all(&req.encode())?;
        self.expect_ack_or_err()
    }

    fn read_err(&mut self) -> Result<ClientError, ClientError> {
        let code = read_exact(&mut self.stream, 1)?[0];
        let err = SignalError::from_u8(code)
            .ok_or_else(|| ClientError::Protocol(format!("bad error code {code}")))?;
        Ok(ClientError::Bridge(err))
    }
}
