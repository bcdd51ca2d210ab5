// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{GpioError, GpioResult};
use gpiobank_config::{BankConfig, RegisterLayout, MAX_BANK_WIDTH};
use serde::Serialize;

/// Index of the awake enable set in [`BankState::enabled`].
pub const ACTIVE_SET: usize = 0;
/// Index of the wake-from-sleep enable set in [`BankState::enabled`].
pub const WAKE_SET: usize = 1;

/// Absolute addresses of one bank's control/status registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BankRegisters {
    pub out: u64,
    pub input: u64,
    pub int_status: u64,
    pub int_clear: u64,
    pub int_en: u64,
    pub int_edge: u64,
    pub int_pos: u64,
    pub oe: u64,
    pub owner: u64,
}

impl BankRegisters {
    pub fn from_base(base: u64, layout: &RegisterLayout) -> Self {
        Self {
            out: base + layout.out,
            input: base + layout.input,
            int_status: base + layout.int_status,
            int_clear: base + layout.int_clear,
            int_en: base + layout.int_en,
            int_edge: base + layout.int_edge,
            int_pos: base + layout.int_pos,
            oe: base + layout.oe,
            owner: base + layout.owner,
        }
    }

    /// Look a register up by the name used in dumps and scenario scripts.
    pub fn by_name(&self, name: &str) -> Option<u64> {
        match name {
            "out" => Some(self.out),
            "in" | "input" => Some(self.input),
            "int_status" => Some(self.int_status),
            "int_clear" => Some(self.int_clear),
            "int_en" => Some(self.int_en),
            "int_edge" => Some(self.int_edge),
            "int_pos" => Some(self.int_pos),
            "oe" => Some(self.oe),
            "owner" => Some(self.owner),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankDescriptor {
    pub name: String,
    pub start: u32,
    pub end: u32,
    pub regs: BankRegisters,
    /// Top-level IRQ of the chained line this bank reports on.
    pub line: u32,
}

impl BankDescriptor {
    pub fn from_config(cfg: &BankConfig, layout: &RegisterLayout) -> Self {
        Self {
            name: cfg.name.clone(),
            start: cfg.start,
            end: cfg.end,
            regs: BankRegisters::from_base(cfg.base_address, layout),
            line: cfg.line,
        }
    }

    pub fn width(&self) -> u32 {
        self.end.saturating_sub(self.start).saturating_add(1)
    }

    pub fn contains(&self, pin: u32) -> bool {
        (self.start..=self.end).contains(&pin)
    }

    /// Mask of the bits that correspond to real pins.
    pub fn pin_mask(&self) -> u32 {
        width_mask(self.width())
    }
}

pub(crate) fn width_mask(width: u32) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1u32 << width) - 1
    }
}

/// Software state kept per bank, mutated only under the controller lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BankState {
    /// `[ACTIVE_SET]` while awake, `[WAKE_SET]` for wake-from-sleep.
    pub enabled: [u32; 2],
    /// Pins whose single-polarity edge select is flipped in software.
    pub both_edge: u32,
    /// Status bits observed in hardware but not yet consumed by an ack.
    pub shadow_pending: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BankId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinLocation {
    pub bank: BankId,
    pub bit: u32,
}

impl PinLocation {
    pub fn mask(&self) -> u32 {
        1 << self.bit
    }
}

/// Immutable, boot-time table of banks sorted by pin range.
#[derive(Debug, Clone)]
pub struct BankTable {
    banks: Vec<BankDescriptor>,
}

impl BankTable {
    pub fn new(mut banks: Vec<BankDescriptor>) -> GpioResult<Self> {
        if banks.is_empty() {
            return Err(GpioError::InvalidBankTable("no banks".to_string()));
        }
        banks.sort_by_key(|b| b.start);
        for bank in &banks {
            if bank.start > bank.end {
                return Err(GpioError::InvalidBankTable(format!(
                    "bank '{}' starts at {} after its end {}",
                    bank.name, bank.start, bank.end
                )));
            }
            if bank.width() > MAX_BANK_WIDTH {
                return Err(GpioError::InvalidBankTable(format!(
                    "bank '{}' spans {} pins",
                    bank.name,
                    bank.width()
                )));
            }
        }
        if banks.iter().any(|b| b.end == u32::MAX) {
            return Err(GpioError::InvalidBankTable(format!(
                "GPIO {} leaves no room for a pin count",
                u32::MAX
            )));
        }
        for pair in banks.windows(2) {
            if pair[0].end >= pair[1].start {
                return Err(GpioError::InvalidBankTable(format!(
                    "banks '{}' and '{}' overlap",
                    pair[0].name, pair[1].name
                )));
            }
        }
        Ok(Self { banks })
    }

    pub fn resolve(&self, pin: u32) -> GpioResult<PinLocation> {
        let idx = self.banks.partition_point(|b| b.end < pin);
        match self.banks.get(idx) {
            Some(bank) if bank.contains(pin) => Ok(PinLocation {
                bank: BankId(idx),
                bit: pin - bank.start,
            }),
            _ => Err(GpioError::OutOfRange(pin)),
        }
    }

    pub fn get(&self, id: BankId) -> &BankDescriptor {
        &self.banks[id.0]
    }

    pub fn find(&self, name: &str) -> Option<BankId> {
        self.banks.iter().position(|b| b.name == name).map(BankId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (BankId, &BankDescriptor)> {
        self.banks.iter().enumerate().map(|(i, b)| (BankId(i), b))
    }

    pub fn on_line(&self, line: u32) -> impl Iterator<Item = (BankId, &BankDescriptor)> {
        self.iter().filter(move |(_, b)| b.line == line)
    }

    pub fn len(&self) -> usize {
        self.banks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.banks.is_empty()
    }

    /// Highest pin + 1.
    pub fn pin_count(&self) -> u32 {
        self.banks
            .last()
            .map(|b| b.end.saturating_add(1))
            .unwrap_or(0)
    }

    pub fn lines(&self) -> Vec<u32> {
        let mut lines: Vec<u32> = Vec::new();
        for bank in &self.banks {
            if !lines.contains(&bank.line) {
                lines.push(bank.line);
            }
        }
        lines
    }
}

/// `irq = base + pin`, so bank and bit are recoverable from the IRQ alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IrqMapping {
    pub base: u32,
    pub count: u32,
}

impl IrqMapping {
    pub fn irq_for_pin(&self, pin: u32) -> u32 {
        self.base + pin
    }

    pub fn pin_for_irq(&self, irq: u32) -> Option<u32> {
        irq.checked_sub(self.base).filter(|pin| *pin < self.count)
    }

    pub fn range(&self) -> std::ops::Range<u32> {
        self.base..self.base + self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank(name: &str, start: u32, end: u32) -> BankDescriptor {
        BankDescriptor {
            name: name.to_string(),
            start,
            end,
            regs: BankRegisters::from_base(0x1000 * start as u64, &RegisterLayout::default()),
            line: 19,
        }
    }

    #[test]
    fn test_resolve_pins() {
        let table = BankTable::new(vec![bank("b1", 16, 42), bank("b0", 0, 15)]).unwrap();
        assert_eq!(table.get(BankId(0)).name, "b0");
        assert_eq!(
            table.resolve(29).unwrap(),
            PinLocation {
                bank: BankId(1),
                bit: 13
            }
        );
        assert_eq!(table.resolve(0).unwrap().bit, 0);
        assert_eq!(table.resolve(15).unwrap().bank, BankId(0));
        assert_eq!(table.resolve(16).unwrap().bank, BankId(1));
        assert_eq!(table.resolve(43), Err(GpioError::OutOfRange(43)));
        assert_eq!(table.pin_count(), 43);
    }

    #[test]
    fn test_gap_is_out_of_range() {
        let table = BankTable::new(vec![bank("b0", 0, 15), bank("b1", 20, 30)]).unwrap();
        assert_eq!(table.resolve(17), Err(GpioError::OutOfRange(17)));
        assert_eq!(table.resolve(20).unwrap().bit, 0);
    }

    #[test]
    fn test_invalid_tables() {
        assert!(BankTable::new(vec![]).is_err());
        assert!(BankTable::new(vec![bank("b0", 0, 32)]).is_err());
        assert!(BankTable::new(vec![bank("b0", 0, 15), bank("b1", 15, 20)]).is_err());
        assert!(BankTable::new(vec![bank("b0", 0, 31)]).is_ok());
        assert!(BankTable::new(vec![bank("top", u32::MAX - 3, u32::MAX)]).is_err());
        assert_eq!(bank("wide", 0, u32::MAX).width(), u32::MAX);
    }

    #[test]
    fn test_full_width_mask() {
        assert_eq!(bank("b0", 0, 31).pin_mask(), u32::MAX);
        assert_eq!(bank("b1", 16, 42).pin_mask(), 0x07FF_FFFF);
    }

    #[test]
    fn test_irq_mapping() {
        let map = IrqMapping {
            base: 64,
            count: 122,
        };
        assert_eq!(map.irq_for_pin(29), 93);
        assert_eq!(map.pin_for_irq(93), Some(29));
        assert_eq!(map.pin_for_irq(63), None);
        assert_eq!(map.pin_for_irq(64 + 122), None);
    }
}
