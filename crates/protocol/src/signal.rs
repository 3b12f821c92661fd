// SimBridge - HW/SW Co-Simulation Bridge
// Copyright (C) 2026 SimBridge Contributors
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Signal protocol: opcode-prefixed variable-length messages for
//! listing, reading, driving and subscribing to named pin signals.
//!
//! A `VALUE` response doubles as the reply to a `GET` and as an
//! unsolicited change notification; receivers correlate by ordering
//! (replies arrive in request order, pushes arrive between them).

pub const OP_LIST: u8 = 0x01;
pub const OP_GET: u8 = 0x02;
pub const OP_SET: u8 = 0x03;
pub const OP_SUBSCRIBE: u8 = 0x04;
pub const OP_UNSUB: u8 = 0x05;

pub const RESP_LIST: u8 = 0x81;
pub const RESP_VALUE: u8 = 0x82;
pub const RESP_ACK: u8 = 0x83;
pub const RESP_ERR: u8 = 0x84;

/// Signal direction as seen from the device model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDir {
    /// Device input: clients may SET.
    In = 0x00,
    /// Device output: clients may GET and subscribe.
    Out = 0x01,
}

impl SignalDir {
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Self::In),
            0x01 => Some(Self::Out),
            _ => None,
        }
    }
}

/// One entry of the per-session signal table. Indices into the table
/// are stable for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalDescriptor {
    pub name: String,
    /// Width in bits, 1..=32.
    pub width: u8,
    pub dir: SignalDir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalError {
    BadIndex = 1,
    WrongDirection = 2,
    BadOpcode = 3,
}

impl SignalError {
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::BadIndex),
            2 => Some(Self::WrongDirection),
            3 => Some(Self::BadOpcode),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalRequest {
    List,
    Get(u8),
    Set(u8, u32),
    Subscribe(u8),
    Unsub(u8),
    /// Unrecognized opcode, carried through so the bridge can answer
    /// `ERR(BadOpcode)` without dropping the connection.
    Unknown(u8),
}

impl SignalRequest {
    /// Payload bytes that follow the given opcode on the wire.
    /// Unknown opcodes carry no payload.
    pub fn payload_len(opcode: u8) -> usize {
        match opcode {
            OP_GET | OP_SUBSCRIBE | OP_UNSUB => 1,
            OP_SET => 5,
            _ => 0,
        }
    }

    /// Decode from an opcode byte and its payload. The payload slice
    /// must be exactly `payload_len(opcode)` bytes.
    pub fn decode(opcode: u8, payload: &[u8]) -> Self {
        match opcode {
            OP_LIST => Self::List,
            OP_GET => Self::Get(payload[0]),
            OP_SET => {
                let mut v = [0u8; 4];
                v.copy_from_slice(&payload[1..5]);
                Self::Set(payload[0], u32::from_le_bytes(v))
            }
            OP_SUBSCRIBE => Self::Subscribe(payload[0]),
            OP_UNSUB => Self::Unsub(payload[0]),
            other => Self::Unknown(other),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match *self {
            Self::List => vec![OP_LIST],
            Self::Get(idx) => vec![OP_GET, idx],
            Self::Set(idx, value) => {
                let mut buf = vec![OP_SET, idx];
                buf.extend_from_slice(&value.to_le_bytes());
                buf
            }
            Self::Subscribe(idx) => vec![OP_SUBSCRIBE, idx],
            Self::Unsub(idx) => vec![OP_UNSUB, idx],
            Self::Unknown(op) => vec![op],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalResponse {
    List(Vec<SignalDescriptor>),
    /// GET reply or unsolicited change notification.
    Value { idx: u8, value: u32 },
    Ack,
    Err(SignalError),
}

impl SignalResponse {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::List(signals) => {
                let mut buf = vec![RESP_LIST, signals.len() as u8];
                for sig in signals {
                    buf.push(sig.name.len() as u8);
                    buf.extend_from_slice(sig.name.as_bytes());
                    buf.push(sig.width);
                    buf.push(sig.dir as u8);
                }
                buf
            }
            Self::Value { idx, value } => {
                let mut buf = vec![RESP_VALUE, *idx];
                buf.extend_from_slice(&value.to_le_bytes());
                buf
            }
            Self::Ack => vec![RESP_ACK],
            Self::Err(code) => vec![RESP_ERR, *code as u8],
        }
    }
}
