// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::bank::width_mask;
use crate::{Peripheral, SimResult, SimulationError};
use gpiobank_config::RegisterLayout;
use std::any::Any;
use std::collections::VecDeque;

/// How a write to `int_clear` acts on the status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearBehavior {
    /// Only the written bits are cleared.
    #[default]
    Precise,
    /// Any write wipes the whole status word, dropping unrelated pending bits.
    WipesStatus,
}

type LevelChange = Option<(u32, bool)>;

/// One GPIO bank of the shared SoC block.
///
/// The pad level of a pin is `out` while `oe` drives it and the external
/// level otherwise. Edge-mode pins latch `int_status` on a pad transition
/// matching `int_pos`; level-mode pins latch while the pad sits at the level
/// selected by `int_pos`, and re-latch after a clear if still asserted.
/// Pins come out of reset in edge mode.
#[derive(Debug, serde::Serialize)]
pub struct GpioBankDevice {
    width: u32,
    layout: RegisterLayout,
    clear: ClearBehavior,
    pub out: u32,
    pub external: u32,
    pub int_status: u32,
    pub int_en: u32,
    pub int_edge: u32,
    pub int_pos: u32,
    pub oe: u32,
    pub owner: u32,
    input_reads: u64,
    #[serde(skip)]
    after_input_read: VecDeque<LevelChange>,
    #[serde(skip)]
    before_status_read: VecDeque<LevelChange>,
}

impl GpioBankDevice {
    pub fn new(width: u32, layout: RegisterLayout) -> Self {
        Self {
            width,
            layout,
            clear: ClearBehavior::Precise,
            out: 0,
            external: 0,
            int_status: 0,
            int_en: 0,
            int_edge: width_mask(width),
            int_pos: 0,
            oe: 0,
            owner: 0,
            input_reads: 0,
            after_input_read: VecDeque::new(),
            before_status_read: VecDeque::new(),
        }
    }

    pub fn with_clear_behavior(mut self, clear: ClearBehavior) -> Self {
        self.clear = clear;
        self
    }

    fn mask(&self) -> u32 {
        width_mask(self.width)
    }

    pub fn pads(&self) -> u32 {
        ((self.out & self.oe) | (self.external & !self.oe)) & self.mask()
    }

    /// Drive the external side of a pin.
    pub fn set_input(&mut self, bit: u32, level: bool) {
        if bit >= self.width {
            tracing::warn!("set_input: bit {} outside {}-pin bank", bit, self.width);
            return;
        }
        let old = self.pads();
        if level {
            self.external |= 1 << bit;
        } else {
            self.external &= !(1 << bit);
        }
        self.detect(old);
    }

    /// Queue level changes applied right after each subsequent read of `in`
    /// returns, one entry per read; `None` leaves the pad alone.
    pub fn script_input_reads<I: IntoIterator<Item = LevelChange>>(&mut self, changes: I) {
        self.after_input_read.extend(changes);
    }

    /// Queue level changes applied just before each subsequent read of
    /// `int_status` is sampled.
    pub fn script_status_reads<I: IntoIterator<Item = LevelChange>>(&mut self, changes: I) {
        self.before_status_read.extend(changes);
    }

    pub fn input_reads(&self) -> u64 {
        self.input_reads
    }

    /// Whether this bank currently drives its chained interrupt line.
    pub fn line_asserted(&self) -> bool {
        self.int_status & self.int_en & self.mask() != 0
    }

    fn apply(&mut self, change: LevelChange) {
        if let Some((bit, level)) = change {
            self.set_input(bit, level);
        }
    }

    fn detect(&mut self, old: u32) {
        let new = self.pads();
        let changed = old ^ new;
        let rising = changed & new;
        let falling = changed & !new;
        let edges = (rising & self.int_pos) | (falling & !self.int_pos);
        self.int_status |= edges & self.int_edge;
        self.latch_levels();
    }

    fn latch_levels(&mut self) {
        let pads = self.pads();
        let asserted = !(pads ^ self.int_pos);
        self.int_status |= asserted & !self.int_edge & self.mask();
    }

    fn clear_status(&mut self, bits: u32) {
        match self.clear {
            ClearBehavior::Precise => self.int_status &= !bits,
            ClearBehavior::WipesStatus if bits != 0 => self.int_status = 0,
            ClearBehavior::WipesStatus => {}
        }
        self.latch_levels();
    }
}

impl Peripheral for GpioBankDevice {
    fn read(&mut self, offset: u64) -> SimResult<u32> {
        if offset % 4 != 0 {
            return Err(SimulationError::Unaligned(offset));
        }
        let l = self.layout;
        let value = if offset == l.input {
            let pads = self.pads();
            self.input_reads += 1;
            if let Some(change) = self.after_input_read.pop_front() {
                self.apply(change);
            }
            pads
        } else if offset == l.int_status {
            if let Some(change) = self.before_status_read.pop_front() {
                self.apply(change);
            }
            self.int_status
        } else if offset == l.out {
            self.out
        } else if offset == l.int_en {
            self.int_en
        } else if offset == l.int_edge {
            self.int_edge
        } else if offset == l.int_pos {
            self.int_pos
        } else if offset == l.oe {
            self.oe
        } else if offset == l.owner {
            self.owner
        } else {
            // int_clear is write-only
            0
        };
        Ok(value)
    }

    fn write(&mut self, offset: u64, value: u32) -> SimResult<()> {
        if offset % 4 != 0 {
            return Err(SimulationError::Unaligned(offset));
        }
        let l = self.layout;
        let value = value & self.mask();
        if offset == l.out {
            let old = self.pads();
            self.out = value;
            self.detect(old);
        } else if offset == l.oe {
            let old = self.pads();
            self.oe = value;
            self.detect(old);
        } else if offset == l.int_clear {
            self.clear_status(value);
        } else if offset == l.int_en {
            self.int_en = value;
        } else if offset == l.int_edge {
            self.int_edge = value;
            self.latch_levels();
        } else if offset == l.int_pos {
            self.int_pos = value;
            self.latch_levels();
        } else if offset == l.owner {
            self.owner = value;
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
