// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::bank::{
    BankDescriptor, BankId, BankRegisters, BankState, BankTable, IrqMapping, PinLocation,
    ACTIVE_SET, WAKE_SET,
};
use crate::both_edge::update_both_edge_detect;
use crate::flags::ConfigFlags;
use crate::metrics::ControllerMetrics;
use crate::pinmux::FunctionBlock;
use crate::snapshot::{BankRegisterDump, BankSnapshot, ControllerSnapshot};
use crate::{GpioError, GpioResult, RegisterPort};
use gpiobank_config::BoardDescriptor;
use std::sync::{Arc, Mutex, MutexGuard};

/// Boot-time description of the block handed over by board code.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub banks: Vec<BankDescriptor>,
    pub irq_base: u32,
    pub function_blocks: Vec<FunctionBlock>,
}

impl ControllerConfig {
    pub fn from_board(board: &BoardDescriptor) -> Self {
        Self {
            banks: board
                .banks
                .iter()
                .map(|b| BankDescriptor::from_config(b, &board.register_layout))
                .collect(),
            irq_base: board.irq_base,
            function_blocks: board
                .function_blocks
                .iter()
                .map(FunctionBlock::from_config)
                .collect(),
        }
    }
}

pub(crate) struct ControllerState<P> {
    pub(crate) port: P,
    pub(crate) banks: Vec<BankState>,
}

/// Owner of every bank's software state and of the register port.
///
/// One lock covers all banks. Each public operation takes it for the length
/// of its register sequence, including the bounded both-edge loop.
pub struct GpioController<P: RegisterPort> {
    pub(crate) table: BankTable,
    pub(crate) irqs: IrqMapping,
    pub(crate) function_blocks: Vec<FunctionBlock>,
    pub(crate) inner: Mutex<ControllerState<P>>,
    pub(crate) metrics: Arc<ControllerMetrics>,
}

impl<P: RegisterPort> GpioController<P> {
    /// Registers the banks and leaves every bank's interrupt enable cleared.
    ///
    /// Fails if the bank table is malformed or `irq_base` plus the pin count
    /// does not fit in a `u32`.
    pub fn new(config: ControllerConfig, mut port: P) -> GpioResult<Self> {
        let table = BankTable::new(config.banks)?;
        if config.irq_base.checked_add(table.pin_count()).is_none() {
            return Err(GpioError::InvalidBankTable(format!(
                "{} pins from irq base {} overflow the IRQ space",
                table.pin_count(),
                config.irq_base
            )));
        }
        for (_, bank) in table.iter() {
            port.write(bank.regs.int_en, 0);
        }
        let irqs = IrqMapping {
            base: config.irq_base,
            count: table.pin_count(),
        };
        tracing::info!(
            "GPIO controller: {} banks, {} pins, irqs {}..{}",
            table.len(),
            irqs.count,
            irqs.base,
            irqs.base + irqs.count
        );
        let banks = vec![BankState::default(); table.len()];
        Ok(Self {
            table,
            irqs,
            function_blocks: config.function_blocks,
            inner: Mutex::new(ControllerState { port, banks }),
            metrics: Arc::new(ControllerMetrics::new()),
        })
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ControllerState<P>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn table(&self) -> &BankTable {
        &self.table
    }

    pub fn irq_mapping(&self) -> IrqMapping {
        self.irqs
    }

    pub fn metrics(&self) -> Arc<ControllerMetrics> {
        self.metrics.clone()
    }

    /// Physical chained lines the banks report on.
    pub fn lines(&self) -> Vec<u32> {
        self.table.lines()
    }

    pub fn irq_for_pin(&self, pin: u32) -> GpioResult<u32> {
        self.table.resolve(pin)?;
        Ok(self.irqs.irq_for_pin(pin))
    }

    pub fn pin_for_irq(&self, irq: u32) -> GpioResult<u32> {
        self.irqs
            .pin_for_irq(irq)
            .filter(|pin| self.table.resolve(*pin).is_ok())
            .ok_or(GpioError::IrqOutOfRange(irq))
    }

    pub(crate) fn locate_irq(&self, irq: u32) -> GpioResult<PinLocation> {
        let pin = self.pin_for_irq(irq)?;
        self.table.resolve(pin)
    }

    /// Apply the option groups present in `flags` to `pin`.
    ///
    /// Groups absent from `flags` leave their registers untouched.
    pub fn configure(&self, pin: u32, flags: ConfigFlags) -> GpioResult<()> {
        let loc = self.table.resolve(pin)?;
        let mut state = self.lock();
        self.configure_locked(&mut state, loc, flags);
        Ok(())
    }

    pub(crate) fn configure_locked(
        &self,
        state: &mut ControllerState<P>,
        loc: PinLocation,
        flags: ConfigFlags,
    ) {
        let regs = self.table.get(loc.bank).regs;
        let b = loc.mask();
        let ControllerState { port, banks } = state;
        let bank = &mut banks[loc.bank.0];

        if flags.intersects(ConfigFlags::OUTPUT_GROUP) {
            port.modify(regs.out, b, flags.contains(ConfigFlags::OUTPUT_HIGH));
        }

        if flags.intersects(ConfigFlags::DIRECTION_GROUP) {
            port.modify(regs.oe, b, flags.contains(ConfigFlags::DRIVE_OUTPUT));
        }

        if flags.intersects(ConfigFlags::OWNER_GROUP) {
            port.modify(regs.owner, b, flags.contains(ConfigFlags::OWNER_APP));
        }

        if flags.intersects(ConfigFlags::TRIGGER_GROUP) {
            port.modify(regs.int_edge, b, flags.intersects(ConfigFlags::EDGE));
            if flags.contains(ConfigFlags::EDGE) {
                bank.both_edge |= b;
                self.run_both_edge(port, &regs, bank.both_edge);
            } else {
                bank.both_edge &= !b;
                let rising = flags.intersects(ConfigFlags::TRIGGER_RISING | ConfigFlags::TRIGGER_HIGH);
                port.modify(regs.int_pos, b, rising);
            }
        }

        if flags.intersects(ConfigFlags::INTERRUPT_GROUP) {
            let enable = flags.contains(ConfigFlags::ENABLE_INTERRUPT);
            if enable {
                // Level interrupts stay latched; drop a stale one first.
                if port.read(regs.int_edge) & b == 0 {
                    self.ack_locked(port, bank, loc.bank, b);
                }
                bank.enabled[ACTIVE_SET] |= b;
            } else {
                bank.enabled[ACTIVE_SET] &= !b;
                bank.shadow_pending &= !b;
            }
            port.write(regs.int_en, bank.enabled[ACTIVE_SET]);
        }

        if flags.intersects(ConfigFlags::WAKE_GROUP) {
            if flags.contains(ConfigFlags::ENABLE_WAKE) {
                bank.enabled[WAKE_SET] |= b;
            } else {
                bank.enabled[WAKE_SET] &= !b;
            }
        }
    }

    fn run_both_edge(&self, port: &mut P, regs: &BankRegisters, both_edge: u32) {
        if !update_both_edge_detect(port, regs, both_edge).is_stable() {
            self.metrics.record_convergence_failure();
        }
    }

    /// Clear `b` in hardware and keep every other enabled bit seen pending in
    /// the shadow, sampling status on both sides of the clear.
    ///
    /// The shadow never holds a disabled pin, so masking a pin forgets a
    /// pending edge the clear may have wiped.
    pub(crate) fn ack_locked(&self, port: &mut P, bank: &mut BankState, id: BankId, b: u32) {
        let desc = self.table.get(id);
        let regs = desc.regs;
        let before = port.read(regs.int_status);
        port.write(regs.int_clear, b);
        let after = port.read(regs.int_status);
        let observed = (before | after) & bank.enabled[ACTIVE_SET];
        bank.shadow_pending = (bank.shadow_pending | observed) & !b & desc.pin_mask();
        self.run_both_edge(port, &regs, bank.both_edge);
    }

    pub fn read(&self, pin: u32) -> GpioResult<bool> {
        let loc = self.table.resolve(pin)?;
        let regs = self.table.get(loc.bank).regs;
        let mut state = self.lock();
        Ok(state.port.read(regs.input) & loc.mask() != 0)
    }

    pub fn write(&self, pin: u32, level: bool) -> GpioResult<()> {
        let loc = self.table.resolve(pin)?;
        let regs = self.table.get(loc.bank).regs;
        let mut state = self.lock();
        state.port.modify(regs.out, loc.mask(), level);
        Ok(())
    }

    /// Pending as seen by the demultiplexer: hardware status or shadow.
    pub fn read_detect_status(&self, pin: u32) -> GpioResult<bool> {
        let loc = self.table.resolve(pin)?;
        let regs = self.table.get(loc.bank).regs;
        let mut state = self.lock();
        let status = state.port.read(regs.int_status) | state.banks[loc.bank.0].shadow_pending;
        Ok(status & loc.mask() != 0)
    }

    pub fn clear_detect_status(&self, pin: u32) -> GpioResult<()> {
        let loc = self.table.resolve(pin)?;
        let mut state = self.lock();
        let ControllerState { port, banks } = &mut *state;
        self.ack_locked(port, &mut banks[loc.bank.0], loc.bank, loc.mask());
        Ok(())
    }

    pub fn bank_state(&self, id: BankId) -> BankState {
        self.lock().banks[id.0]
    }

    /// Read back every bank's registers alongside its software state.
    pub fn snapshot(&self) -> ControllerSnapshot {
        let mut state = self.lock();
        let ControllerState { port, banks } = &mut *state;
        let banks = self
            .table
            .iter()
            .map(|(id, desc)| BankSnapshot {
                name: desc.name.clone(),
                start: desc.start,
                end: desc.end,
                registers: dump_registers(port, &desc.regs),
                state: banks[id.0],
            })
            .collect();
        ControllerSnapshot {
            banks,
            metrics: self.metrics.snapshot(),
        }
    }

    /// Log every bank's registers at debug level.
    pub fn dump(&self) {
        for bank in self.snapshot().banks {
            let r = bank.registers;
            tracing::debug!(
                "GPIO {} [{}..={}] out:{:x} in:{:x} sta:{:x} ena:{:x} edg:{:x} pos:{:x} oe:{:x} own:{:x}",
                bank.name,
                bank.start,
                bank.end,
                r.out,
                r.input,
                r.int_status,
                r.int_en,
                r.int_edge,
                r.int_pos,
                r.oe,
                r.owner
            );
        }
    }
}

fn dump_registers<P: RegisterPort>(port: &mut P, regs: &BankRegisters) -> BankRegisterDump {
    BankRegisterDump {
        out: port.read(regs.out),
        input: port.read(regs.input),
        int_status: port.read(regs.int_status),
        int_en: port.read(regs.int_en),
        int_edge: port.read(regs.int_edge),
        int_pos: port.read(regs.int_pos),
        oe: port.read(regs.oe),
        owner: port.read(regs.owner),
    }
}
