// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{Peripheral, SimResult, SimulationError};
use std::any::Any;
use std::collections::BTreeMap;

/// Indirect pin function-select block: write a pin number to `select`, then
/// the function/pull/drive word for that pin to `config`.
///
/// `select` only latches pin numbers the block actually serves, so reading it
/// back is how software notices it talked to the wrong block.
#[derive(Debug, Default, serde::Serialize)]
pub struct FunctionSelectDevice {
    first: u32,
    last: u32,
    config_offset: u64,
    pub select: u32,
    pub configs: BTreeMap<u32, u32>,
}

impl FunctionSelectDevice {
    pub fn new(first: u32, last: u32, config_offset: u64) -> Self {
        Self {
            first,
            last,
            config_offset,
            select: first,
            configs: BTreeMap::new(),
        }
    }

    pub fn config_for(&self, pin: u32) -> Option<u32> {
        self.configs.get(&pin).copied()
    }
}

impl Peripheral for FunctionSelectDevice {
    fn read(&mut self, offset: u64) -> SimResult<u32> {
        if offset % 4 != 0 {
            return Err(SimulationError::Unaligned(offset));
        }
        if offset == 0 {
            Ok(self.select)
        } else if offset == self.config_offset {
            Ok(self.config_for(self.select).unwrap_or(0))
        } else {
            Ok(0)
        }
    }

    fn write(&mut self, offset: u64, value: u32) -> SimResult<()> {
        if offset % 4 != 0 {
            return Err(SimulationError::Unaligned(offset));
        }
        if offset == 0 {
            if (self.first..=self.last).contains(&value) {
                self.select = value;
            }
        } else if offset == self.config_offset {
            self.configs.insert(self.select, value);
        }
        Ok(())
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_then_config() {
        let mut dev = FunctionSelectDevice::new(16, 42, 4);
        dev.write(0, 29).unwrap();
        dev.write(4, 0x45).unwrap();
        assert_eq!(dev.read(0).unwrap(), 29);
        assert_eq!(dev.read(4).unwrap(), 0x45);
        assert_eq!(dev.config_for(29), Some(0x45));
    }

    #[test]
    fn test_foreign_pin_not_latched() {
        let mut dev = FunctionSelectDevice::new(16, 42, 4);
        dev.write(0, 20).unwrap();
        dev.write(0, 7).unwrap();
        assert_eq!(dev.read(0).unwrap(), 20);
    }
}
