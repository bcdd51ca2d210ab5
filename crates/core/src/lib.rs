// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod bank;
pub mod both_edge;
pub mod bus;
pub mod controller;
pub mod demux;
pub mod flags;
pub mod interrupt;
pub mod mailbox;
pub mod metrics;
pub mod peripherals;
pub mod pinmux;
pub mod sleep;
pub mod smem;
pub mod snapshot;

use std::any::Any;


pub use bank::{BankDescriptor, BankId, BankTable, IrqMapping, PinLocation};
pub use controller::{ControllerConfig, GpioController};
pub use flags::{ConfigFlags, Flow, Trigger};
pub use interrupt::{InterruptController, IrqCore, IrqDescTable};
pub use mailbox::{FiredEvent, MailboxGeometry, SleepMailbox};
pub use sleep::{replay_channel, SleepConfig, SleepHandoff, WakeReplay};

/// Errors surfaced by the GPIO controller API.
///
/// Nothing in this crate panics on a bad pin or a missing mailbox; callers get
/// one of these and the rest of the controller keeps working.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GpioError {
    #[error("GPIO {0} is outside every registered bank")]
    OutOfRange(u32),
    #[error("IRQ {0} does not map to a registered GPIO")]
    IrqOutOfRange(u32),
    #[error("IRQ {0} already has a handler")]
    Busy(u32),
    #[error("GPIO {0} is not covered by any function-select block")]
    NoFunctionBlock(u32),
    #[error("Function {func} for GPIO {pin} does not fit the 4-bit select field")]
    InvalidFunction { pin: u32, func: u8 },
    #[error("Sleep mailbox is unavailable")]
    MailboxUnavailable,
    #[error("Sleep mailbox needs {needed} bytes but the region holds {actual}")]
    MailboxTooSmall { needed: usize, actual: usize },
    #[error("Invalid bank table: {0}")]
    InvalidBankTable(String),
}

pub type GpioResult<T> = Result<T, GpioError>;

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("No device mapped at {0:#x}")]
    Unmapped(u64),
    #[error("Unaligned register access at {0:#x}")]
    Unaligned(u64),
}

pub type SimResult<T> = Result<T, SimulationError>;

/// 32-bit register access used by the controller.
///
/// Register accesses on this block cannot fail, so the port hands back plain
/// values. Real hardware goes through [`bus::MmioPort`]; tests and the CLI go
/// through the simulated [`bus::SimBus`].
pub trait RegisterPort: Send {
    fn read(&mut self, addr: u64) -> u32;
    fn write(&mut self, addr: u64, value: u32);

    fn modify(&mut self, addr: u64, mask: u32, set: bool) {
        let v = self.read(addr);
        if set {
            self.write(addr, v | mask);
        } else {
            self.write(addr, v & !mask);
        }
    }
}

/// Trait representing a simulated memory-mapped device
pub trait Peripheral: std::fmt::Debug + Send {
    fn read(&mut self, offset: u64) -> SimResult<u32>;
    fn write(&mut self, offset: u64, value: u32) -> SimResult<()>;
    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        None
    }
    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}
