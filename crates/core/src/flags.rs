// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use bitflags::bitflags;
use std::str::FromStr;

bitflags! {
    /// Option groups accepted by `configure`.
    ///
    /// Each group is independent: a group absent from the flags leaves the
    /// corresponding hardware state alone. When both members of a two-way
    /// group are given, the second one listed here wins.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ConfigFlags: u32 {
        const OUTPUT_LOW = 1 << 0;
        const OUTPUT_HIGH = 1 << 1;
        const INPUT = 1 << 2;
        const DRIVE_OUTPUT = 1 << 3;
        const OWNER_COPROCESSOR = 1 << 4;
        const OWNER_APP = 1 << 5;

        const TRIGGER_RISING = 1 << 8;
        const TRIGGER_FALLING = 1 << 9;
        const TRIGGER_HIGH = 1 << 10;
        const TRIGGER_LOW = 1 << 11;
        const TRIGGER_NONE = 1 << 12;

        const DISABLE_INTERRUPT = 1 << 16;
        const ENABLE_INTERRUPT = 1 << 17;
        const DISABLE_WAKE = 1 << 18;
        const ENABLE_WAKE = 1 << 19;

        const OUTPUT_GROUP = Self::OUTPUT_LOW.bits() | Self::OUTPUT_HIGH.bits();
        const DIRECTION_GROUP = Self::INPUT.bits() | Self::DRIVE_OUTPUT.bits();
        const OWNER_GROUP = Self::OWNER_COPROCESSOR.bits() | Self::OWNER_APP.bits();
        const EDGE = Self::TRIGGER_RISING.bits() | Self::TRIGGER_FALLING.bits();
        const TRIGGER_GROUP = Self::EDGE.bits()
            | Self::TRIGGER_HIGH.bits()
            | Self::TRIGGER_LOW.bits()
            | Self::TRIGGER_NONE.bits();
        const INTERRUPT_GROUP = Self::DISABLE_INTERRUPT.bits() | Self::ENABLE_INTERRUPT.bits();
        const WAKE_GROUP = Self::DISABLE_WAKE.bits() | Self::ENABLE_WAKE.bits();
    }
}

impl ConfigFlags {
    /// Parse a list of flag names such as `["drive_output", "output_high"]`.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, String> {
        names.iter().try_fold(Self::empty(), |acc, name| {
            let upper = name.as_ref().trim().to_ascii_uppercase();
            Self::from_name(&upper)
                .map(|f| acc | f)
                .ok_or_else(|| format!("unknown configure flag '{}'", name.as_ref()))
        })
    }
}

/// Interrupt trigger as requested through `set_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    EdgeRising,
    EdgeFalling,
    EdgeBoth,
    LevelHigh,
    LevelLow,
    None,
}

impl Trigger {
    pub fn flags(self) -> ConfigFlags {
        match self {
            Trigger::EdgeRising => ConfigFlags::TRIGGER_RISING,
            Trigger::EdgeFalling => ConfigFlags::TRIGGER_FALLING,
            Trigger::EdgeBoth => ConfigFlags::EDGE,
            Trigger::LevelHigh => ConfigFlags::TRIGGER_HIGH,
            Trigger::LevelLow => ConfigFlags::TRIGGER_LOW,
            Trigger::None => ConfigFlags::TRIGGER_NONE,
        }
    }

    pub fn flow(self) -> Flow {
        match self {
            Trigger::EdgeRising | Trigger::EdgeFalling | Trigger::EdgeBoth => Flow::Edge,
            _ => Flow::Level,
        }
    }
}

impl FromStr for Trigger {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let v = value.trim().to_ascii_lowercase();
        match v.as_str() {
            "rising" | "edge_rising" => Ok(Self::EdgeRising),
            "falling" | "edge_falling" => Ok(Self::EdgeFalling),
            "both" | "edge_both" => Ok(Self::EdgeBoth),
            "high" | "level_high" => Ok(Self::LevelHigh),
            "low" | "level_low" => Ok(Self::LevelLow),
            "none" => Ok(Self::None),
            _ => Err(format!(
                "unsupported trigger '{}'; supported: rising, falling, both, high, low, none",
                value
            )),
        }
    }
}

/// Flow handler the generic interrupt core runs for a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    /// Ack, then run the handler.
    Edge,
    /// Mask and ack, run the handler, unmask.
    Level,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_parse() {
        assert_eq!("falling".parse::<Trigger>().unwrap(), Trigger::EdgeFalling);
        assert_eq!("Level_High".parse::<Trigger>().unwrap(), Trigger::LevelHigh);
        assert!("sideways".parse::<Trigger>().is_err());
    }

    #[test]
    fn test_trigger_flags_and_flow() {
        assert_eq!(Trigger::EdgeBoth.flags(), ConfigFlags::EDGE);
        assert_eq!(Trigger::EdgeBoth.flow(), Flow::Edge);
        assert_eq!(Trigger::LevelLow.flow(), Flow::Level);
        assert!(ConfigFlags::TRIGGER_GROUP.contains(Trigger::None.flags()));
    }

    #[test]
    fn test_from_names() {
        let flags = ConfigFlags::from_names(&["drive_output", "OUTPUT_HIGH"]).unwrap();
        assert_eq!(flags, ConfigFlags::DRIVE_OUTPUT | ConfigFlags::OUTPUT_HIGH);
        assert!(ConfigFlags::from_names(&["turbo"]).is_err());
    }
}
