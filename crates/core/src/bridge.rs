// SimBridge - HW/SW Co-Simulation Bridge
// Copyright (C) 2026 SimBridge Contributors
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! The execution bridge: a single scheduler thread that owns the
//! device model and services requests from any number of producer
//! threads over a rendezvous channel.
//!
//! Each request carries its own reply channel, so a producer blocks
//! until its operation has actually run against the device. Between
//! requests the scheduler keeps device time moving by ticking once
//! per poll quantum, and after every advance it samples subscribed
//! output signals and pushes change notifications.

use crate::{BridgeError, Device, DeviceFault};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use simbridge_protocol::mmio::MmioRequest;
use simbridge_protocol::signal::{
    SignalDir, SignalError, SignalRequest, SignalResponse,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace};

#[derive(Debug, Clone, Copy)]
pub struct BridgeConfig {
    /// Scheduling quantum: how long the bridge waits for a request
    /// before ticking the device and sampling outputs anyway.
    pub poll_interval: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_micros(100),
        }
    }
}

/// One unit of work for the scheduler thread.
enum Command {
    Mmio {
        req: MmioRequest,
        reply: Sender<Result<u64, DeviceFault>>,
    },
    Signal {
        req: SignalRequest,
        reply: Sender<SignalResponse>,
    },
    /// A signal-protocol client disconnected: drop its subscriptions.
    EndSession,
    Stop,
}

/// Cloneable producer-side handle. Every transport worker and emulator
/// callback holds one of these; all its operations rendezvous with the
/// scheduler thread.
#[derive(Clone)]
pub struct BridgePort {
    cmd_tx: Sender<Command>,
    running: Arc<AtomicBool>,
}

impl BridgePort {
    /// Execute one memory access and wait for its result.
    pub fn execute_mmio(&self, req: MmioRequest) -> Result<u64, BridgeError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.cmd_tx
            .send(Command::Mmio { req, reply: reply_tx })
            .map_err(|_| BridgeError::Stopped)?;
        reply_rx
            .recv()
            .map_err(|_| BridgeError::Stopped)?
            .map_err(BridgeError::Device)
    }

    /// Execute one signal-protocol request and wait for the response.
    pub fn signal_request(&self, req: SignalRequest) -> Result<SignalResponse, BridgeError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.cmd_tx
            .send(Command::Signal { req, reply: reply_tx })
            .map_err(|_| BridgeError::Stopped)?;
        reply_rx.recv().map_err(|_| BridgeError::Stopped)
    }

    /// Tell the scheduler the current signal session ended. Session
    /// state is only ever touched on the scheduler thread, so this is
    /// a message like any other.
    pub fn end_session(&self) {
        let _ = self.cmd_tx.send(Command::EndSession);
    }

    /// Request shutdown. Idempotent, callable from any thread,
    /// including signal handlers' helper threads.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            // try_send: a rendezvous send would deadlock if the
            // scheduler already exited, and when it is blocked in
            // recv_timeout a zero-capacity try_send still completes.
            let _ = self.cmd_tx.try_send(Command::Stop);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Consumer-side bundle handed to whoever wires up the servers: the
/// port plus the stream of encoded change-notification frames.
pub struct BridgeHandle {
    pub port: BridgePort,
    pub notify_rx: Receiver<Vec<u8>>,
}

/// Per-session subscription state. Reset wholesale on `EndSession`.
#[derive(Default)]
struct Session {
    subs: BTreeSet<usize>,
    last_seen: HashMap<usize, u32>,
}

pub struct ExecutionBridge<D: Device> {
    device: D,
    config: BridgeConfig,
    cmd_rx: Receiver<Command>,
    notify_tx: Sender<Vec<u8>>,
    running: Arc<AtomicBool>,
    session: Session,
}

impl<D: Device> ExecutionBridge<D> {
    pub fn new(device: D, config: BridgeConfig) -> (Self, BridgeHandle) {
        // Zero capacity makes every send a rendezvous: a producer is
        // unblocked only once the scheduler has taken its command.
        let (cmd_tx, cmd_rx) = bounded(0);
        let (notify_tx, notify_rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));
        let port = BridgePort {
            cmd_tx,
            running: Arc::clone(&running),
        };
        let bridge = Self {
            device,
            config,
            cmd_rx,
            notify_tx,
            running,
            session: Session::default(),
        };
        (
            bridge,
            BridgeHandle {
                port,
                notify_rx,
            },
        )
    }

    /// Run the scheduler loop until [`BridgePort::stop`] is called,
    /// every port is dropped, or the device faults.
    pub fn run(mut self) -> Result<(), BridgeError> {
        info!(
            poll_interval_us = self.config.poll_interval.as_micros() as u64,
            "execution bridge running"
        );
        loop {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            match self.cmd_rx.recv_timeout(self.config.poll_interval) {
                Ok(Command::Stop) => break,
                Ok(Command::EndSession) => {
                    debug!("signal session ended, clearing subscriptions");
                    self.session = Session::default();
                    self.advance();
                }
                Ok(Command::Mmio { req, reply }) => {
                    let result = self.device.execute_mmio(&req);
                    if let Err(fault) = &result {
                        let fault = fault.clone();
                        error!(%fault, addr = req.addr, "device fault");
                        let _ = reply.send(result);
                        self.running.store(false, Ordering::SeqCst);
                        return Err(BridgeError::Device(fault));
                    }
                    trace!(?req, "mmio dispatched");
                    let _ = reply.send(result);
                    self.advance();
                }
                Ok(Command::Signal { req, reply }) => {
                    let resp = self.handle_signal(req);
                    let _ = reply.send(resp);
                    self.advance();
                }
                Err(RecvTimeoutError::Timeout) => self.advance(),
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.running.store(false, Ordering::SeqCst);
        info!("execution bridge stopped");
        Ok(())
    }

    fn advance(&mut self) {
        self.device.tick();
        self.sample_outputs();
    }

    fn handle_signal(&mut self, req: SignalRequest) -> SignalResponse {
        match req {
            SignalRequest::List => SignalResponse::List(self.device.signals().to_vec()),
            SignalRequest::Get(idx) => match self.check_signal(idx, SignalDir::Out) {
                Ok(idx) => SignalResponse::Value {
                    idx: idx as u8,
                    value: self.device.read_signal(idx),
                },
                Err(e) => SignalResponse::Err(e),
            },
            SignalRequest::Set(idx, value) => match self.check_signal(idx, SignalDir::In) {
                Ok(idx) => {
                    self.device.write_signal(idx, value);
                    SignalResponse::Ack
                }
                Err(e) => SignalResponse::Err(e),
            },
            SignalRequest::Subscribe(idx) => match self.check_signal(idx, SignalDir::Out) {
                Ok(idx) => {
                    // Seed the edge detector so the value at subscribe
                    // time never produces a notification by itself.
                    let current = self.device.read_signal(idx);
                    self.session.subs.insert(idx);
                    self.session.last_seen.insert(idx, current);
                    debug!(idx, current, "subscribed");
                    SignalResponse::Ack
                }
                Err(e) => SignalResponse::Err(e),
            },
            SignalRequest::Unsub(idx) => {
                let idx = idx as usize;
                if idx >= self.device.signals().len() {
                    return SignalResponse::Err(SignalError::BadIndex);
                }
                self.session.subs.remove(&idx);
                self.session.last_seen.remove(&idx);
                SignalResponse::Ack
            }
            SignalRequest::Unknown(op) => {
                debug!(opcode = op, "unknown signal opcode");
                SignalResponse::Err(SignalError::BadOpcode)
            }
        }
    }

    fn check_signal(&self, idx: u8, want: SignalDir) -> Result<usize, SignalError> {
        let idx = idx as usize;
        let signals = self.device.signals();
        if idx >= signals.len() {
            return Err(SignalError::BadIndex);
        }
        if signals[idx].dir != want {
            return Err(SignalError::WrongDirection);
        }
        Ok(idx)
    }

    /// Edge detection over the subscribed outputs: compare against the
    /// last value each subscriber saw and push one encoded VALUE frame
    /// per change.
    fn sample_outputs(&mut self) {
        for &idx in &self.session.subs {
            let value = self.device.read_signal(idx);
            let prev = self.session.last_seen.get(&idx).copied();
            if prev != Some(value) {
                trace!(idx, ?prev, value, "signal edge");
                self.session.last_seen.insert(idx, value);
                let frame = SignalResponse::Value {
                    idx: idx as u8,
                    value,
                }
                .encode();
                let _ = self.notify_tx.send(frame);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::SoftDevice;
    use crate::DeviceResult;
    use simbridge_protocol::signal::{SignalDescriptor, RESP_VALUE};
    use std::thread;

    fn spawn_demo() -> (BridgeHandle, thread::JoinHandle<Result<(), BridgeError>>) {
        let (bridge, handle) = ExecutionBridge::new(
            SoftDevice::demo(),
            BridgeConfig {
                poll_interval: Duration::from_micros(50),
            },
        );
        let join = thread::spawn(move || bridge.run());
        (handle, join)
    }

    #[test]
    fn test_mmio_roundtrip() {
        let (handle, join) = spawn_demo();
        handle
            .port
            .execute_mmio(MmioRequest::write(4, 0x0C, 0xA5A5_A5A5))
            .unwrap();
        let val = handle.port.execute_mmio(MmioRequest::read(4, 0x0C)).unwrap();
        assert_eq!(val, 0xA5A5_A5A5);
        handle.port.stop();
        join.join().unwrap().unwrap();
    }

    #[test]
    fn test_list_reflects_device_table() {
        let (handle, join) = spawn_demo();
        let resp = handle.port.signal_request(SignalRequest::List).unwrap();
        match resp {
            SignalResponse::List(signals) => {
                assert_eq!(signals.len(), 2);
                assert_eq!(signals[0].name, "gpio_out");
                assert_eq!(signals[0].dir, SignalDir::Out);
                assert_eq!(signals[1].name, "gpio_in");
                assert_eq!(signals[1].dir, SignalDir::In);
            }
            other => panic!("expected List, got {other:?}"),
        }
        handle.port.stop();
        join.join().unwrap().unwrap();
    }

    #[test]
    fn test_signal_validation_errors() {
        let (handle, join) = spawn_demo();
        // Out-of-range index.
        let resp = handle.port.signal_request(SignalRequest::Get(9)).unwrap();
        assert_eq!(resp, SignalResponse::Err(SignalError::BadIndex));
        // GET on an input.
        let resp = handle.port.signal_request(SignalRequest::Get(1)).unwrap();
        assert_eq!(resp, SignalResponse::Err(SignalError::WrongDirection));
        // SET on an output.
        let resp = handle
            .port
            .signal_request(SignalRequest::Set(0, 1))
            .unwrap();
        assert_eq!(resp, SignalResponse::Err(SignalError::WrongDirection));
        // SUBSCRIBE on an input.
        let resp = handle
            .port
            .signal_request(SignalRequest::Subscribe(1))
            .unwrap();
        assert_eq!(resp, SignalResponse::Err(SignalError::WrongDirection));
        // SUBSCRIBE and UNSUB past the table.
        let resp = handle
            .port
            .signal_request(SignalRequest::Subscribe(9))
            .unwrap();
        assert_eq!(resp, SignalResponse::Err(SignalError::BadIndex));
        let resp = handle.port.signal_request(SignalRequest::Unsub(9)).unwrap();
        assert_eq!(resp, SignalResponse::Err(SignalError::BadIndex));
        // Rejected subscribes register nothing: an edge on gpio_out
        // must stay silent.
        handle
            .port
            .execute_mmio(MmioRequest::write(1, 0x00, 0x11))
            .unwrap();
        assert!(handle
            .notify_rx
            .recv_timeout(Duration::from_millis(50))
            .is_err());
        // Unknown opcode.
        let resp = handle
            .port
            .signal_request(SignalRequest::Unknown(0x7F))
            .unwrap();
        assert_eq!(resp, SignalResponse::Err(SignalError::BadOpcode));
        handle.port.stop();
        join.join().unwrap().unwrap();
    }

    #[test]
    fn test_subscribe_notifies_exactly_once_per_edge() {
        let (handle, join) = spawn_demo();
        let resp = handle
            .port
            .signal_request(SignalRequest::Subscribe(0))
            .unwrap();
        assert_eq!(resp, SignalResponse::Ack);

        // The value at subscribe time must not notify by itself.
        assert!(handle
            .notify_rx
            .recv_timeout(Duration::from_millis(20))
            .is_err());

        // gpio_out is backed by register offset 0x00.
        handle
            .port
            .execute_mmio(MmioRequest::write(1, 0x00, 0x5A))
            .unwrap();
        let frame = handle
            .notify_rx
            .recv_timeout(Duration::from_secs(1))
            .unwrap();
        assert_eq!(frame, vec![RESP_VALUE, 0, 0x5A, 0, 0, 0]);

        // Steady state: no further notifications without a new edge.
        assert!(handle
            .notify_rx
            .recv_timeout(Duration::from_millis(20))
            .is_err());

        // Writing the same value again is not an edge.
        handle
            .port
            .execute_mmio(MmioRequest::write(1, 0x00, 0x5A))
            .unwrap();
        assert!(handle
            .notify_rx
            .recv_timeout(Duration::from_millis(20))
            .is_err());
        handle.port.stop();
        join.join().unwrap().unwrap();
    }

    #[test]
    fn test_end_session_drops_subscriptions() {
        let (handle, join) = spawn_demo();
        handle
            .port
            .signal_request(SignalRequest::Subscribe(0))
            .unwrap();
        handle.port.end_session();
        handle
            .port
            .execute_mmio(MmioRequest::write(1, 0x00, 0xFF))
            .unwrap();
        assert!(handle
            .notify_rx
            .recv_timeout(Duration::from_millis(50))
            .is_err());
        handle.port.stop();
        join.join().unwrap().unwrap();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (handle, join) = spawn_demo();
        handle.port.stop();
        handle.port.stop();
        assert!(!handle.port.is_running());
        join.join().unwrap().unwrap();
        assert!(matches!(
            handle.port.execute_mmio(MmioRequest::read(1, 0)),
            Err(BridgeError::Stopped)
        ));
    }

    #[test]
    fn test_device_fault_is_fatal() {
        let (handle, join) = spawn_demo();
        // The demo device has a 16-byte register bank.
        let err = handle
            .port
            .execute_mmio(MmioRequest::read(4, 0x1000))
            .unwrap_err();
        assert!(matches!(err, BridgeError::Device(DeviceFault::MemoryViolation(_))));
        assert!(join.join().unwrap().is_err());
        assert!(!handle.port.is_running());
    }

    /// Device that panics if two operations ever overlap, proving the
    /// bridge serializes concurrent producers.
    struct ReentrancyGuard {
        busy: Arc<AtomicBool>,
        counter: u64,
    }

    impl Device for ReentrancyGuard {
        fn execute_mmio(&mut self, _req: &MmioRequest) -> DeviceResult<u64> {
            assert!(!self.busy.swap(true, Ordering::SeqCst), "overlapping access");
            thread::sleep(Duration::from_micros(200));
            self.counter += 1;
            self.busy.store(false, Ordering::SeqCst);
            Ok(self.counter)
        }

        fn signals(&self) -> &[SignalDescriptor] {
            &[]
        }
    }

    #[test]
    fn test_concurrent_producers_are_serialized() {
        let device = ReentrancyGuard {
            busy: Arc::new(AtomicBool::new(false)),
            counter: 0,
        };
        let (bridge, handle) = ExecutionBridge::new(device, BridgeConfig::default());
        let join = thread::spawn(move || bridge.run());

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let port = handle.port.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        port.execute_mmio(MmioRequest::read(4, 0)).unwrap();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        // Every one of the 100 operations ran exactly once.
        let last = handle.port.execute_mmio(MmioRequest::read(4, 0)).unwrap();
        assert_eq!(last, 101);
        handle.port.stop();
        join.join().unwrap().unwrap();
    }
}
