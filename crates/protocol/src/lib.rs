// SimBridge - HW/SW Co-Simulation Bridge
// Copyright (C) 2026 SimBridge Contributors
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Wire formats for the two SimBridge socket protocols.
//!
//! Both protocols are little-endian byte streams over Unix-domain
//! sockets with no framing beyond fixed or length-prefixed fields.
//! The memory protocol carries MMIO register accesses from an
//! execution agent (QEMU-style mmio stub or a CPU emulator); the
//! signal protocol exposes named pin-level signals with change
//! subscriptions.

pub mod client;
pub mod mmio;
pub mod signal;

/// Decode failure on either protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unknown opcode {0:#04x}")]
    BadOpcode(u8),
    #[error("unsupported access size {0}")]
    BadSize(u8),
    #[error("truncated frame: got {got} bytes, need {need}")]
    Truncated { got: usize, need: usize },
}
