// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Software emulation of "interrupt on either edge".
//!
//! The bank only has a single-polarity edge select per pin, so for every pin
//! in `both_edge` the polarity is kept armed for the opposite of the pin's
//! current level. The level can change while the polarity is being written;
//! the loop re-checks until either the level held still or hardware already
//! latched the change in `int_status`.

use crate::bank::BankRegisters;
use crate::RegisterPort;

/// Retry bound for [`update_both_edge_detect`]. The loop runs inside the
/// controller's critical section, so it must stay short.
pub const BOTH_EDGE_LOOP_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convergence {
    /// No both-edge pins in the bank; registers untouched.
    Idle,
    /// Polarity matches the last observed level after `attempts` passes.
    Stable { attempts: u32 },
    /// Gave up after the retry bound. The polarity register is valid but may
    /// be armed for a level the pin has already left.
    Unstable { first: u32, second: u32 },
}

impl Convergence {
    pub fn is_stable(&self) -> bool {
        !matches!(self, Convergence::Unstable { .. })
    }
}

pub fn update_both_edge_detect(
    port: &mut dyn RegisterPort,
    regs: &BankRegisters,
    both_edge: u32,
) -> Convergence {
    if both_edge == 0 {
        return Convergence::Idle;
    }

    let mut first = 0;
    let mut second = 0;
    for attempt in 1..=BOTH_EDGE_LOOP_LIMIT + 1 {
        first = port.read(regs.input);
        let pos = port.read(regs.int_pos);
        let pos = (pos & !both_edge) | (!first & both_edge);
        port.write(regs.int_pos, pos);
        let status = port.read(regs.int_status);
        second = port.read(regs.input);
        if (first ^ second) & both_edge & !status == 0 {
            return Convergence::Stable { attempts: attempt };
        }
    }

    tracing::error!(
        "both-edge detect failed to reach a stable state: {:#010x} != {:#010x}",
        first,
        second
    );
    Convergence::Unstable { first, second }
}
