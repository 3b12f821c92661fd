// SimBridge - HW/SW Co-Simulation Bridge
// Copyright (C) 2026 SimBridge Contributors
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Memory protocol: fixed 18-byte requests matching the QEMU
//! mmio-stub chardev header, `opcode(1) size(1) addr(8) val(8)`.
//!
//! The protocol is strictly synchronous with one request in flight
//! per connection, so there is no request id. Read responses are
//! exactly `size` bytes of the result value; writes are acknowledged
//! with a single [`WRITE_ACK`] byte.

use crate::WireError;

/// Size of the request header, and of every request.
pub const HDR_SIZE: usize = 18;

/// Single-byte acknowledgement sent for every completed write.
pub const WRITE_ACK: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmioOp {
    Read = 0,
    Write = 1,
}

/// One memory-mapped register access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmioRequest {
    pub op: MmioOp,
    /// Access width in bytes: 1, 2, 4, or 8.
    pub size: u8,
    pub addr: u64,
    /// Only meaningful for writes.
    pub val: u64,
}

impl MmioRequest {
    pub fn read(size: u8, addr: u64) -> Self {
        Self {
            op: MmioOp::Read,
            size,
            addr,
            val: 0,
        }
    }

    pub fn write(size: u8, addr: u64, val: u64) -> Self {
        Self {
            op: MmioOp::Write,
            size,
            addr,
            val,
        }
    }

    pub fn encode(&self) -> [u8; HDR_SIZE] {
        let mut buf = [0u8; HDR_SIZE];
        buf[0] = self.op as u8;
        buf[1] = self.size;
        buf[2..10].copy_from_slice(&self.addr.to_le_bytes());
        buf[10..18].copy_from_slice(&self.val.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < HDR_SIZE {
            return Err(WireError::Truncated {
                got: buf.len(),
                need: HDR_SIZE,
            });
        }
        let op = match buf[0] {
            0 => MmioOp::Read,
            1 => MmioOp::Write,
            other => return Err(WireError::BadOpcode(other)),
        };
        let size = buf[1];
        if !matches!(size, 1 | 2 | 4 | 8) {
            return Err(WireError::BadSize(size));
        }
        let mut addr = [0u8; 8];
        addr.copy_from_slice(&buf[2..10]);
        let mut val = [0u8; 8];
        val.copy_from_slice(&buf[10..18]);
        Ok(Self {
            op,
            size,
            addr: u64::from_le_bytes(addr),
            val: u64::from_le_bytes(val),
        })
    }

    /// Encode a read result: exactly `self.size` bytes, little-endian.
    pub fn encode_read_reply(&self, value: u64) -> Vec<u8> {
        value.to_le_bytes()[..self.size as usize].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let req = MmioRequest::write(4, 0x4000_1000, 0xDEAD_BEEF);
        let buf = req.encode();
        assert_eq!(buf.len(), HDR_SIZE);
        assert_eq!(buf[0], 1);
        assert_eq!(buf[1], 4);
        assert_eq!(MmioRequest::decode(&buf).unwrap(), req);

        let req = MmioRequest::read(8, u64::MAX);
        assert_eq!(MmioRequest::decode(&req.encode()).unwrap(), req);
    }

    #[test]
    fn test_decode_layout_is_little_endian() {
        let mut buf = [0u8; HDR_SIZE];
        buf[0] = 0; // read
        buf[1] = 2;
        buf[2] = 0x34;
        buf[3] = 0x12;
        let req = MmioRequest::decode(&buf).unwrap();
        assert_eq!(req.op, MmioOp::Read);
        assert_eq!(req.size, 2);
        assert_eq!(req.addr, 0x1234);
    }

    #[test]
    fn test_decode_rejects_bad_opcode_and_size() {
        let mut buf = MmioRequest::read(4, 0).encode();
        buf[0] = 7;
        assert_eq!(MmioRequest::decode(&buf), Err(WireError::BadOpcode(7)));

        let mut buf = MmioRequest::read(4, 0).encode();
        buf[1] = 3;
        assert_eq!(MmioRequest::decode(&buf), Err(WireError::BadSize(3)));
    }

    #[test]
    fn test_decode_rejects_short_frame() {
        let buf = [0u8; 10];
        assert_eq!(
            MmioRequest::decode(&buf),
            Err(WireError::Truncated { got: 10, need: 18 })
        );
    }

    #[test]
    fn test_read_reply_width() {
        let req = MmioRequest::read(1, 0);
        assert_eq!(req.encode_read_reply(0xAABB), vec![0xBB]);
        let req = MmioRequest::read(4, 0);
        assert_eq!(
            req.encode_read_reply(0x1234_5678),
            vec![0x78, 0x56, 0x34, 0x12]
        );
    }
}
