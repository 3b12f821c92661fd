// SimBridge - HW/SW Co-Simulation Bridge
// Copyright (C) 2026 SimBridge Contributors
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Built-in device models: a plain little-endian register bank, and a
//! soft device that maps named pin signals onto bank offsets.

use crate::{Device, DeviceFault, DeviceResult};
use simbridge_protocol::mmio::{MmioOp, MmioRequest};
use simbridge_protocol::signal::{SignalDescriptor, SignalDir};
use tracing::trace;

/// Flat little-endian register space with naturally-unaligned access
/// allowed. Out-of-range accesses fault.
pub struct RegisterBank {
    bytes: Vec<u8>,
    ticks: u64,
}

impl RegisterBank {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
            ticks: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Device time in scheduling quanta since creation.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    fn span(&self, addr: u64, size: u8) -> DeviceResult<std::ops::Range<usize>> {
        let start = addr as usize;
        let end = start
            .checked_add(size as usize)
            .filter(|&end| addr <= usize::MAX as u64 && end <= self.bytes.len())
            .ok_or(DeviceFault::MemoryViolation(addr))?;
        Ok(start..end)
    }

    pub fn load(&self, addr: u64, size: u8) -> DeviceResult<u64> {
        let span = self.span(addr, size)?;
        let mut buf = [0u8; 8];
        buf[..size as usize].copy_from_slice(&self.bytes[span]);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn store(&mut self, addr: u64, size: u8, val: u64) -> DeviceResult<()> {
        let span = self.span(addr, size)?;
        self.bytes[span].copy_from_slice(&val.to_le_bytes()[..size as usize]);
        Ok(())
    }
}

impl Device for RegisterBank {
    fn execute_mmio(&mut self, req: &MmioRequest) -> DeviceResult<u64> {
        match req.op {
            MmioOp::Read => self.load(req.addr, req.size),
            MmioOp::Write => {
                self.store(req.addr, req.size, req.val)?;
                Ok(0)
            }
        }
    }

    fn tick(&mut self) {
        self.ticks += 1;
    }
}

/// A named pin signal anchored at a byte offset in the register bank.
struct PinMap {
    desc: SignalDescriptor,
    offset: u64,
}

/// Register bank plus a pin signal table: outputs sample the bank,
/// inputs latch into it. This is the device model the stock server
/// binary runs, built from a manifest or from [`SoftDevice::demo`].
pub struct SoftDevice {
    bank: RegisterBank,
    pins: Vec<PinMap>,
    descs: Vec<SignalDescriptor>,
}

impl SoftDevice {
    pub fn new(bank: RegisterBank) -> Self {
        Self {
            bank,
            pins: Vec::new(),
            descs: Vec::new(),
        }
    }

    /// Append a signal backed by `offset`. Indices are assigned in
    /// call order.
    pub fn add_signal(&mut self, name: &str, width: u8, dir: SignalDir, offset: u64) {
        let desc = SignalDescriptor {
            name: name.to_string(),
            width,
            dir,
        };
        self.descs.push(desc.clone());
        self.pins.push(PinMap { desc, offset });
    }

    /// 16-byte bank with one 8-bit output at offset 0x00 and one 8-bit
    /// input at offset 0x0C.
    pub fn demo() -> Self {
        let mut dev = Self::new(RegisterBank::new(16));
        dev.add_signal("gpio_out", 8, SignalDir::Out, 0x00);
        dev.add_signal("gpio_in", 8, SignalDir::In, 0x0C);
        dev
    }

    fn pin_width_bytes(pin: &PinMap) -> u8 {
        pin.desc.width.div_ceil(8)
    }

    fn pin_mask(pin: &PinMap) -> u32 {
        if pin.desc.width >= 32 {
            u32::MAX
        } else {
            (1u32 << pin.desc.width) - 1
        }
    }
}

impl Device for SoftDevice {
    fn execute_mmio(&mut self, req: &MmioRequest) -> DeviceResult<u64> {
        self.bank.execute_mmio(req)
    }

    fn signals(&self) -> &[SignalDescriptor] {
        &self.descs
    }

    fn read_signal(&self, idx: usize) -> u32 {
        let pin = &self.pins[idx];
        // Offsets were validated at build time, so a load cannot fault.
        let raw = self
            .bank
            .load(pin.offset, Self::pin_width_bytes(pin))
            .unwrap_or(0) as u32;
        raw & Self::pin_mask(pin)
    }

    fn write_signal(&mut self, idx: usize, value: u32) {
        let pin = &self.pins[idx];
        let masked = value & Self::pin_mask(pin);
        trace!(name = %pin.desc.name, value = masked, "latching input signal");
        let _ = self
            .bank
            .store(pin.offset, Self::pin_width_bytes(pin), masked as u64);
    }

    fn tick(&mut self) {
        self.bank.tick();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bank_load_store_widths() {
        let mut bank = RegisterBank::new(64);
        bank.store(0x08, 8, 0x1122_3344_5566_7788).unwrap();
        assert_eq!(bank.load(0x08, 8).unwrap(), 0x1122_3344_5566_7788);
        assert_eq!(bank.load(0x08, 1).unwrap(), 0x88);
        assert_eq!(bank.load(0x0A, 2).unwrap(), 0x5566);
    }

    #[test]
    fn test_bank_partial_write_preserves_neighbors() {
        let mut bank = RegisterBank::new(64);
        bank.store(0x00, 4, 0xFFFF_FFFF).unwrap();
        bank.store(0x00, 1, 0x42).unwrap();
        assert_eq!(bank.load(0x00, 4).unwrap(), 0xFFFF_FF42);
    }

    #[test]
    fn test_bank_faults_out_of_range() {
        let mut bank = RegisterBank::new(16);
        assert!(matches!(
            bank.load(16, 1),
            Err(DeviceFault::MemoryViolation(16))
        ));
        // Last byte readable, but a 4-byte access straddling the end
        // faults.
        assert!(bank.load(15, 1).is_ok());
        assert!(bank.store(14, 4, 0).is_err());
        assert!(bank.load(u64::MAX, 8).is_err());
    }

    #[test]
    fn test_soft_device_output_samples_bank() {
        let mut dev = SoftDevice::demo();
        dev.execute_mmio(&MmioRequest::write(1, 0x00, 0xAB)).unwrap();
        assert_eq!(dev.read_signal(0), 0xAB);
    }

    #[test]
    fn test_soft_device_input_latches_into_bank() {
        let mut dev = SoftDevice::demo();
        dev.write_signal(1, 0x3C);
        assert_eq!(dev.execute_mmio(&MmioRequest::read(1, 0x0C)).unwrap(), 0x3C);
    }

    #[test]
    fn test_signal_values_masked_to_width() {
        let mut dev = SoftDevice::new(RegisterBank::new(8));
        dev.add_signal("nibble", 4, SignalDir::In, 0x00);
        dev.write_signal(0, 0xFF);
        assert_eq!(dev.read_signal(0), 0x0F);
    }

    #[test]
    fn test_tick_advances_device_time() {
        let mut bank = RegisterBank::new(4);
        bank.tick();
        bank.tick();
        assert_eq!(bank.ticks(), 2);
    }
}
