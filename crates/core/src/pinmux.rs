// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Alternate-function selection through the indirect TLMM-style blocks.
//!
//! Which function a pin should carry is the caller's decision; this module
//! only applies the value it is handed.

use crate::controller::GpioController;
use crate::{GpioError, GpioResult, RegisterPort};
use gpiobank_config::FunctionBlockConfig;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionBlock {
    pub name: String,
    pub select: u64,
    pub config: u64,
    pub first: u32,
    pub last: u32,
}

impl FunctionBlock {
    pub fn from_config(cfg: &FunctionBlockConfig) -> Self {
        Self {
            name: cfg.name.clone(),
            select: cfg.select_address,
            config: cfg.config_address,
            first: cfg.first,
            last: cfg.last,
        }
    }

    pub fn covers(&self, pin: u32) -> bool {
        (self.first..=self.last).contains(&pin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pull {
    #[default]
    None = 0,
    Down = 1,
    Keeper = 2,
    Up = 3,
}

impl FromStr for Pull {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "no_pull" => Ok(Self::None),
            "down" | "pull_down" => Ok(Self::Down),
            "keeper" => Ok(Self::Keeper),
            "up" | "pull_up" => Ok(Self::Up),
            other => Err(format!("unknown pull '{}'", other)),
        }
    }
}

/// Pad drive strength, 2 mA steps from 2 to 16 mA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveStrength(u8);

impl DriveStrength {
    pub const MA2: Self = Self(0);

    pub fn from_ma(ma: u8) -> Option<Self> {
        if (2..=16).contains(&ma) && ma % 2 == 0 {
            Some(Self(ma / 2 - 1))
        } else {
            None
        }
    }

    pub fn ma(&self) -> u8 {
        (self.0 + 1) * 2
    }

    pub fn bits(&self) -> u32 {
        self.0 as u32
    }
}

impl Default for DriveStrength {
    fn default() -> Self {
        Self::MA2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    /// Drive the given level once the function is applied.
    Output(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinFunction {
    pub pin: u32,
    pub func: u8,
    pub pull: Pull,
    pub drive: DriveStrength,
    pub direction: Direction,
}

/// Highest function number the config word can carry.
pub const MAX_FUNCTION: u8 = 0xF;

impl PinFunction {
    /// Word written to the config register of the block.
    ///
    /// `func` must not exceed [`MAX_FUNCTION`]; [`GpioController::set_function`]
    /// rejects larger values before building the word.
    pub fn config_word(&self) -> u32 {
        (self.drive.bits() << 6) | ((self.func as u32 & 0xF) << 2) | self.pull as u32
    }
}

impl<P: RegisterPort> GpioController<P> {
    pub fn set_function(&self, cfg: &PinFunction) -> GpioResult<()> {
        let pin = cfg.pin;
        if cfg.func > MAX_FUNCTION {
            return Err(GpioError::InvalidFunction {
                pin,
                func: cfg.func,
            });
        }
        let block = self
            .function_blocks
            .iter()
            .find(|b| b.covers(pin))
            .ok_or(GpioError::NoFunctionBlock(pin))?;
        let loc = self.table.resolve(pin)?;
        let regs = self.table.get(loc.bank).regs;
        let word = cfg.config_word();

        let mut state = self.lock();
        let port = &mut state.port;
        port.write(block.select, pin);
        port.write(block.config, word);
        tracing::debug!("set_function({}, {:#x}) via '{}'", pin, word, block.name);
        let selected = port.read(block.select);
        if selected != pin {
            tracing::warn!(
                "Could not set alt func {} => {}: '{}' selects {}",
                pin,
                cfg.func,
                block.name,
                selected
            );
        }

        match cfg.direction {
            Direction::Output(level) => {
                port.modify(regs.out, loc.mask(), level);
                port.modify(regs.oe, loc.mask(), true);
            }
            Direction::Input => port.modify(regs.oe, loc.mask(), false),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_word_packing() {
        let f = PinFunction {
            pin: 97,
            func: 1,
            pull: Pull::Up,
            drive: DriveStrength::from_ma(8).unwrap(),
            direction: Direction::Input,
        };
        assert_eq!(f.config_word(), (3 << 6) | (1 << 2) | 3);
    }

    #[test]
    fn test_drive_strength_range() {
        assert_eq!(DriveStrength::from_ma(2), Some(DriveStrength::MA2));
        assert_eq!(DriveStrength::from_ma(16).unwrap().bits(), 7);
        assert_eq!(DriveStrength::from_ma(16).unwrap().ma(), 16);
        assert!(DriveStrength::from_ma(3).is_none());
        assert!(DriveStrength::from_ma(18).is_none());
    }

    #[test]
    fn test_pull_names() {
        assert_eq!("".parse::<Pull>().unwrap(), Pull::None);
        assert_eq!("Keeper".parse::<Pull>().unwrap(), Pull::Keeper);
        assert!("sideways".parse::<Pull>().is_err());
    }
}
