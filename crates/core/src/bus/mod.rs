// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::peripherals::func_select::FunctionSelectDevice;
use crate::peripherals::gpio_bank::{ClearBehavior, GpioBankDevice};
use crate::{Peripheral, RegisterPort, SimResult, SimulationError};
use gpiobank_config::BoardDescriptor;
use std::sync::{Arc, Mutex};

pub struct PeripheralEntry {
    pub name: String,
    pub base: u64,
    pub size: u64,
    pub dev: Box<dyn Peripheral>,
}

/// Flat register space of the simulated SoC block.
#[derive(Default)]
pub struct SystemBus {
    pub peripherals: Vec<PeripheralEntry>,
}

impl SystemBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, base: u64, size: u64, dev: Box<dyn Peripheral>) {
        self.peripherals.push(PeripheralEntry {
            name: name.to_string(),
            base,
            size,
            dev,
        });
    }

    /// One bank device per configured bank and one select block per
    /// function-select range.
    pub fn from_board(board: &BoardDescriptor) -> Self {
        let mut bus = Self::new();
        let layout = board.register_layout;
        let clear = if board.simulation.clear_wipes_status {
            ClearBehavior::WipesStatus
        } else {
            ClearBehavior::Precise
        };

        for bank in &board.banks {
            let dev = GpioBankDevice::new(bank.width(), layout).with_clear_behavior(clear);
            bus.add(
                &bank.name,
                bank.base_address,
                layout.window_size(),
                Box::new(dev),
            );
        }

        for block in &board.function_blocks {
            let config_offset = block.config_address.wrapping_sub(block.select_address);
            let dev = FunctionSelectDevice::new(block.first, block.last, config_offset);
            bus.add(&block.name, block.select_address, config_offset + 4, Box::new(dev));
        }

        tracing::debug!(
            "Mapped {} devices for board '{}'",
            bus.peripherals.len(),
            board.name
        );
        bus
    }

    fn entry_mut(&mut self, addr: u64) -> SimResult<&mut PeripheralEntry> {
        self.peripherals
            .iter_mut()
            .find(|p| addr >= p.base && addr < p.base + p.size)
            .ok_or(SimulationError::Unmapped(addr))
    }

    pub fn read_u32(&mut self, addr: u64) -> SimResult<u32> {
        let p = self.entry_mut(addr)?;
        let offset = addr - p.base;
        p.dev.read(offset)
    }

    pub fn write_u32(&mut self, addr: u64, value: u32) -> SimResult<()> {
        let p = self.entry_mut(addr)?;
        let offset = addr - p.base;
        p.dev.write(offset, value)
    }

    pub fn device_mut<T: 'static>(&mut self, name: &str) -> Option<&mut T> {
        self.peripherals
            .iter_mut()
            .find(|p| p.name == name)
            .and_then(|p| p.dev.as_any_mut())
            .and_then(|any| any.downcast_mut::<T>())
    }

    pub fn snapshot(&self) -> serde_json::Value {
        let map = self
            .peripherals
            .iter()
            .map(|p| (p.name.clone(), p.dev.snapshot()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}

/// Shared handle to a [`SystemBus`], usable as the controller's register port
/// while the test or scenario runner keeps driving pad levels.
#[derive(Clone)]
pub struct SimBus(Arc<Mutex<SystemBus>>);

impl SimBus {
    pub fn new(bus: SystemBus) -> Self {
        Self(Arc::new(Mutex::new(bus)))
    }

    pub fn with_bus<R>(&self, f: impl FnOnce(&mut SystemBus) -> R) -> R {
        let mut bus = self.0.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut bus)
    }

    pub fn with_device<T: 'static, R>(&self, name: &str, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.with_bus(|bus| bus.device_mut::<T>(name).map(f))
    }

    /// Drive the external level of `bit` in the named bank.
    pub fn set_pin_level(&self, bank: &str, bit: u32, level: bool) -> bool {
        self.with_device::<GpioBankDevice, _>(bank, |dev| dev.set_input(bit, level))
            .is_some()
    }

    pub fn snapshot(&self) -> serde_json::Value {
        self.with_bus(|bus| bus.snapshot())
    }
}

impl RegisterPort for SimBus {
    fn read(&mut self, addr: u64) -> u32 {
        self.with_bus(|bus| bus.read_u32(addr)).unwrap_or_else(|e| {
            tracing::warn!("Register read failed: {}", e);
            0
        })
    }

    fn write(&mut self, addr: u64, value: u32) {
        if let Err(e) = self.with_bus(|bus| bus.write_u32(addr, value)) {
            tracing::warn!("Register write of {:#010x} failed: {}", value, e);
        }
    }
}

/// Volatile access to a real memory-mapped register block.
#[derive(Debug)]
pub struct MmioPort {
    _private: (),
}

impl MmioPort {
    /// # Safety
    ///
    /// Every address the controller is configured with must be a mapped,
    /// 4-byte aligned device register for the lifetime of the port.
    pub unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl RegisterPort for MmioPort {
    fn read(&mut self, addr: u64) -> u32 {
        // SAFETY: upheld by the contract of `MmioPort::new`.
        unsafe { (addr as usize as *const u32).read_volatile() }
    }

    fn write(&mut self, addr: u64, value: u32) {
        // SAFETY: upheld by the contract of `MmioPort::new`.
        unsafe { (addr as usize as *mut u32).write_volatile(value) }
    }
}
