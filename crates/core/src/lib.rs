// SimBridge - HW/SW Co-Simulation Bridge
// Copyright (C) 2026 SimBridge Contributors
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Core execution engine for SimBridge.
//!
//! The device model is owned by exactly one thread, the scheduler
//! thread running [`bridge::ExecutionBridge::run`]. Everything else
//! (socket transport workers, CPU-emulator callback threads) talks to
//! it through message passing via [`bridge::BridgePort`], which
//! serializes all device operations into a single total order.

pub mod bridge;
pub mod devices;

use simbridge_protocol::mmio::MmioRequest;
use simbridge_protocol::signal::SignalDescriptor;

/// Failure inside the device model itself. Device state after a fault
/// is unknown, so faults are fatal to the bridge: operations are
/// never retried.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeviceFault {
    #[error("memory access violation at {0:#x}")]
    MemoryViolation(u64),
    #[error("device failure: {0}")]
    Failed(String),
}

pub type DeviceResult<T> = Result<T, DeviceFault>;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("bridge is not running")]
    Stopped,
    #[error(transparent)]
    Device(#[from] DeviceFault),
}

/// The capabilities the bridge consumes from a device model.
///
/// `execute_mmio` may take arbitrarily long (it stands in for a bus
/// transaction against simulated hardware); the signal accessors must
/// complete immediately. All methods are invoked exclusively from the
/// scheduler thread.
pub trait Device: Send {
    /// Perform one memory read or write. Returns the read value, or 0
    /// for writes.
    fn execute_mmio(&mut self, req: &MmioRequest) -> DeviceResult<u64>;

    /// The signal table exposed to signal-protocol clients. Indices
    /// are stable for the lifetime of the device.
    fn signals(&self) -> &[SignalDescriptor] {
        &[]
    }

    /// Sample a signal. Only called with a valid index.
    fn read_signal(&self, _idx: usize) -> u32 {
        0
    }

    /// Drive a signal. Only called with a valid index of an input
    /// signal.
    fn write_signal(&mut self, _idx: usize, _value: u32) {}

    /// Advance the device's own time model by one scheduling quantum.
    /// Called once per idle poll and after every dispatched request.
    fn tick(&mut self) {}
}
