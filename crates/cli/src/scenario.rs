// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{anyhow, bail, Context, Result};
use gpiobank_config::{parse_size, BoardDescriptor, ScenarioAssertion, ScenarioStep};
use gpiobank_core::bus::{SimBus, SystemBus};
use gpiobank_core::peripherals::gpio_bank::GpioBankDevice;
use gpiobank_core::pinmux::{Direction, DriveStrength, PinFunction, Pull};
use gpiobank_core::sleep::ReplayReceiver;
use gpiobank_core::smem::{HeapPool, MappedRegion, SharedRegion};
use gpiobank_core::{
    replay_channel, ConfigFlags, ControllerConfig, GpioController, GpioError, IrqDescTable,
    MailboxGeometry, SleepConfig, SleepHandoff, SleepMailbox, Trigger,
};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A simulated board wired to the controller, the generic interrupt core and
/// the sleep mailbox, driven one scenario step at a time.
pub struct Session {
    pub bus: SimBus,
    pub ctrl: Arc<GpioController<SimBus>>,
    pub core: Arc<IrqDescTable>,
    handoff: SleepHandoff<SimBus>,
    replay: ReplayReceiver,
    /// The coprocessor's view of the mailbox region.
    coprocessor: Option<Box<dyn SharedRegion>>,
    dispatched: Arc<Mutex<Vec<u32>>>,
}

impl Session {
    /// Build the session. With `smem_file` the mailbox lives in a mapped
    /// file, otherwise in a heap pool sized by the board's `pool_size`.
    pub fn new(board: &BoardDescriptor, smem_file: Option<&Path>) -> Result<Self> {
        let bus = SimBus::new(SystemBus::from_board(board));
        let ctrl = Arc::new(
            GpioController::new(ControllerConfig::from_board(board), bus.clone())
                .context("Failed to register GPIO banks")?,
        );
        let core = Arc::new(IrqDescTable::new());
        core.register_chip(ctrl.irq_mapping().range(), ctrl.clone());

        let config = SleepConfig::from_board(board);
        let geometry =
            MailboxGeometry::for_pins(ctrl.table().pin_count(), config.groups, config.max_fired);
        let (tx, replay) = replay_channel();

        let (handoff, coprocessor) = match smem_file {
            Some(path) => {
                let region = MappedRegion::open(path, geometry.byte_len())
                    .with_context(|| format!("Failed to map mailbox file {:?}", path))?;
                let peer = MappedRegion::open(path, geometry.byte_len())
                    .with_context(|| format!("Failed to map mailbox file {:?}", path))?;
                let handoff = SleepHandoff::new(ctrl.clone(), Some(Box::new(region)), config, tx);
                (handoff, Some(Box::new(peer) as Box<dyn SharedRegion>))
            }
            None => {
                let capacity = parse_size(&board.mailbox.pool_size)? as usize;
                let mut pool = HeapPool::new(capacity);
                let handoff = SleepHandoff::from_allocator(ctrl.clone(), &mut pool, config, tx);
                let peer = pool
                    .region(config.smem_id)
                    .map(|r| Box::new(r) as Box<dyn SharedRegion>);
                (handoff, peer)
            }
        };

        Ok(Self {
            bus,
            ctrl,
            core,
            handoff,
            replay,
            coprocessor,
            dispatched: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Every IRQ the recording handlers saw, in dispatch order.
    pub fn dispatched(&self) -> Vec<u32> {
        self.dispatched
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn execute(&mut self, step: &ScenarioStep) -> Result<()> {
        match step {
            ScenarioStep::Configure { pin, flags } => {
                let flags = ConfigFlags::from_names(flags).map_err(anyhow::Error::msg)?;
                self.ctrl.configure(*pin, flags)?;
            }
            ScenarioStep::RequestIrq { pin, trigger, wake } => {
                let irq = self.ctrl.irq_for_pin(*pin)?;
                let trigger = trigger
                    .as_deref()
                    .map(str::parse::<Trigger>)
                    .transpose()
                    .map_err(anyhow::Error::msg)?;
                let sink = self.dispatched.clone();
                self.core.request_irq(
                    irq,
                    trigger,
                    Box::new(move |irq| {
                        sink.lock().unwrap_or_else(|e| e.into_inner()).push(irq);
                    }),
                )?;
                if *wake {
                    self.core.set_irq_wake(irq, true)?;
                }
            }
            ScenarioStep::FreeIrq { pin } => {
                self.core.free_irq(self.ctrl.irq_for_pin(*pin)?)?;
            }
            ScenarioStep::SetType { pin, trigger } => {
                let trigger: Trigger = trigger.parse().map_err(anyhow::Error::msg)?;
                self.core
                    .set_irq_type(self.ctrl.irq_for_pin(*pin)?, trigger)?;
            }
            ScenarioStep::SetWake { pin, enable } => {
                self.core
                    .set_irq_wake(self.ctrl.irq_for_pin(*pin)?, *enable)?;
            }
            ScenarioStep::Write { pin, level } => {
                self.ctrl.write(*pin, (*level).into())?;
            }
            ScenarioStep::SetLevel { pin, level } => {
                let table = self.ctrl.table();
                let loc = table.resolve(*pin)?;
                let name = &table.get(loc.bank).name;
                if !self.bus.set_pin_level(name, loc.bit, (*level).into()) {
                    bail!("No simulated bank '{}' for GPIO {}", name, pin);
                }
            }
            ScenarioStep::HandleLine { line } => {
                self.ctrl.handle_line(*line, self.core.as_ref());
            }
            ScenarioStep::HandlePending => {
                for line in self.ctrl.lines() {
                    if self.line_asserted(line) {
                        self.ctrl.handle_line(line, self.core.as_ref());
                    }
                }
            }
            ScenarioStep::EnterSleep { from_idle } => {
                self.handoff.enter_sleep(*from_idle)?;
            }
            ScenarioStep::CoprocessorFire { group, pin } => self.coprocessor_fire(*group, *pin)?,
            ScenarioStep::ExitSleep => {
                let queued = self.handoff.exit_sleep()?;
                tracing::debug!("exit_sleep queued {} wake events", queued);
            }
            ScenarioStep::DrainReplay => {
                let replayed = self.replay.drain(self.ctrl.as_ref(), self.core.as_ref());
                tracing::debug!("Replayed {} wake events", replayed);
            }
            ScenarioStep::SetFunction {
                pin,
                func,
                pull,
                drive_ma,
                output,
            } => {
                let pull: Pull = pull.parse().map_err(anyhow::Error::msg)?;
                let drive = match drive_ma {
                    Some(ma) => DriveStrength::from_ma(*ma)
                        .ok_or_else(|| anyhow!("Unsupported drive strength {} mA", ma))?,
                    None => DriveStrength::default(),
                };
                let direction = output
                    .map(|level| Direction::Output(level.into()))
                    .unwrap_or(Direction::Input);
                self.ctrl.set_function(&PinFunction {
                    pin: *pin,
                    func: *func,
                    pull,
                    drive,
                    direction,
                })?;
            }
        }
        Ok(())
    }

    fn line_asserted(&self, line: u32) -> bool {
        self.ctrl.table().on_line(line).any(|(_, desc)| {
            self.bus
                .with_device::<GpioBankDevice, _>(&desc.name, |dev| dev.line_asserted())
                .unwrap_or(false)
        })
    }

    /// Record a wake event the way the coprocessor does while the
    /// application core sleeps.
    fn coprocessor_fire(&mut self, group: usize, pin: u16) -> Result<()> {
        let geometry = self.handoff.mailbox().geometry();
        let region = self
            .coprocessor
            .as_mut()
            .ok_or(GpioError::MailboxUnavailable)?;
        let mut buf = vec![0u8; geometry.byte_len()];
        region.read_into(&mut buf);
        let mut mailbox = SleepMailbox::decode(geometry, &buf)?;
        if !mailbox.record_fired(group, pin) {
            tracing::warn!("Coprocessor dropped GPIO {} for group {}", pin, group);
        }
        mailbox.encode(&mut buf)?;
        region.write_from(&buf);
        Ok(())
    }

    pub fn check(&self, assertion: &ScenarioAssertion) -> Result<bool> {
        match assertion {
            ScenarioAssertion::Dispatched(a) => Ok(self.dispatched() == a.dispatched),
            ScenarioAssertion::MailboxWord(a) => {
                let d = &a.mailbox_word;
                let word = self
                    .handoff
                    .mailbox()
                    .words(d.array)
                    .get(d.index)
                    .copied()
                    .ok_or_else(|| anyhow!("Mailbox word {} is out of range", d.index))?;
                let mask = d.mask.unwrap_or(u32::MAX);
                Ok(word & mask == d.expected & mask)
            }
            ScenarioAssertion::RegisterValue(a) => {
                let d = &a.register_value;
                let table = self.ctrl.table();
                let id = table
                    .find(&d.bank)
                    .ok_or_else(|| anyhow!("Unknown bank '{}'", d.bank))?;
                let addr = table
                    .get(id)
                    .regs
                    .by_name(&d.register)
                    .ok_or_else(|| anyhow!("Unknown register '{}'", d.register))?;
                let value = self.bus.with_bus(|bus| bus.read_u32(addr))?;
                let mask = d.mask.unwrap_or(u32::MAX);
                Ok(value & mask == d.expected & mask)
            }
            ScenarioAssertion::PinLevel(a) => {
                let d = &a.pin_level;
                Ok(self.ctrl.read(d.pin)? == bool::from(d.level))
            }
        }
    }
}
