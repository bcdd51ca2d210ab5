// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Chained handler for the physical GPIO lines and the chip callbacks the
//! generic interrupt core drives per pin.

use crate::bank::ACTIVE_SET;
use crate::controller::{ControllerState, GpioController};
use crate::flags::{ConfigFlags, Flow, Trigger};
use crate::interrupt::{InterruptController, IrqCore};
use crate::{GpioResult, RegisterPort};

impl<P: RegisterPort> GpioController<P> {
    /// IRQs currently pending and enabled on the banks behind `line`,
    /// lowest pin first.
    ///
    /// A bit counts as pending if hardware reports it or the shadow kept it
    /// from an earlier clear that may have wiped it.
    pub fn pending_irqs(&self, line: u32) -> Vec<u32> {
        let mut pending = Vec::new();
        let mut state = self.lock();
        let ControllerState { port, banks } = &mut *state;
        for (id, desc) in self.table.on_line(line) {
            let bank = &banks[id.0];
            let status = port.read(desc.regs.int_status);
            let mut v = (status | bank.shadow_pending) & bank.enabled[ACTIVE_SET] & desc.pin_mask();
            while v != 0 {
                let bit = v.trailing_zeros();
                v &= v - 1;
                pending.push(self.irqs.irq_for_pin(desc.start + bit));
            }
        }
        pending
    }

    /// Fan one physical line out into per-pin IRQs, then ack the line.
    ///
    /// The lock is released before dispatch: the generic core calls back
    /// into [`InterruptController::ack`] for every IRQ it handles.
    pub fn handle_line(&self, line: u32, core: &dyn IrqCore) -> usize {
        let pending = self.pending_irqs(line);
        if pending.is_empty() {
            tracing::debug!("Spurious interrupt on GPIO line {}", line);
            self.metrics.record_spurious_line();
        }
        for irq in &pending {
            tracing::trace!("GPIO line {} -> irq {}", line, irq);
            core.generic_handle_irq(*irq);
        }
        self.metrics.record_dispatch(pending.len() as u64);
        core.ack_line(line);
        pending.len()
    }
}

impl<P: RegisterPort> InterruptController for GpioController<P> {
    fn name(&self) -> &str {
        "gpiobank"
    }

    fn mask(&self, irq: u32) -> GpioResult<()> {
        let loc = self.locate_irq(irq)?;
        let mut state = self.lock();
        self.configure_locked(&mut state, loc, ConfigFlags::DISABLE_INTERRUPT);
        Ok(())
    }

    fn unmask(&self, irq: u32) -> GpioResult<()> {
        let loc = self.locate_irq(irq)?;
        let mut state = self.lock();
        self.configure_locked(&mut state, loc, ConfigFlags::ENABLE_INTERRUPT);
        Ok(())
    }

    fn ack(&self, irq: u32) -> GpioResult<()> {
        let loc = self.locate_irq(irq)?;
        let mut state = self.lock();
        let ControllerState { port, banks } = &mut *state;
        self.ack_locked(port, &mut banks[loc.bank.0], loc.bank, loc.mask());
        Ok(())
    }

    fn set_type(&self, irq: u32, trigger: Trigger) -> GpioResult<()> {
        let loc = self.locate_irq(irq)?;
        let mut state = self.lock();
        self.configure_locked(&mut state, loc, trigger.flags());
        Ok(())
    }

    fn set_wake(&self, irq: u32, enable: bool) -> GpioResult<()> {
        let loc = self.locate_irq(irq)?;
        let flags = if enable {
            ConfigFlags::ENABLE_WAKE
        } else {
            ConfigFlags::DISABLE_WAKE
        };
        let mut state = self.lock();
        self.configure_locked(&mut state, loc, flags);
        Ok(())
    }

    fn flow(&self, irq: u32) -> GpioResult<Flow> {
        let loc = self.locate_irq(irq)?;
        let regs = self.table.get(loc.bank).regs;
        let edge = self.lock().port.read(regs.int_edge) & loc.mask() != 0;
        Ok(if edge { Flow::Edge } else { Flow::Level })
    }
}
