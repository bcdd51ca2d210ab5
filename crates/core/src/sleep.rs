// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::bank::{ACTIVE_SET, WAKE_SET};
use crate::controller::{ControllerState, GpioController};
use crate::interrupt::IrqCore;
use crate::mailbox::{FiredEvent, MailboxGeometry, SleepMailbox};
use crate::smem::{SharedRegion, SmemAllocator};
use crate::{GpioError, GpioResult, RegisterPort};
use gpiobank_config::BoardDescriptor;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepConfig {
    pub smem_id: u32,
    pub groups: usize,
    pub max_fired: usize,
    /// Dump registers and mailbox words on every entry.
    pub debug: bool,
}

impl SleepConfig {
    pub fn from_board(board: &BoardDescriptor) -> Self {
        Self {
            smem_id: board.mailbox.smem_id,
            groups: board.mailbox.groups,
            max_fired: board.mailbox.max_fired,
            debug: board.debug_sleep,
        }
    }
}

/// Wake events reported by the coprocessor, queued for the bottom half.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeReplay {
    pub events: Vec<FiredEvent>,
}

pub fn replay_channel() -> (Sender<WakeReplay>, ReplayReceiver) {
    let (tx, rx) = mpsc::channel();
    (tx, ReplayReceiver { rx })
}

/// Single consumer of the replay queue.
pub struct ReplayReceiver {
    rx: Receiver<WakeReplay>,
}

impl ReplayReceiver {
    /// Replay everything queued so far and return the number of dispatches.
    pub fn drain<P: RegisterPort>(&self, controller: &GpioController<P>, core: &dyn IrqCore) -> usize {
        self.rx
            .try_iter()
            .map(|replay| controller.replay_fired(&replay.events, core))
            .sum()
    }

    /// Run the bottom half on its own thread until every sender is gone.
    pub fn spawn<P, C>(self, controller: Arc<GpioController<P>>, core: Arc<C>) -> JoinHandle<usize>
    where
        P: RegisterPort + 'static,
        C: IrqCore + Send + Sync + 'static,
    {
        std::thread::spawn(move || {
            let mut total = 0;
            for replay in self.rx.iter() {
                total += controller.replay_fired(&replay.events, core.as_ref());
            }
            total
        })
    }
}

impl<P: RegisterPort> GpioController<P> {
    /// Write each bank's `int_en` to enable set `set` and pack that set with
    /// its trigger configuration into `mailbox`.
    pub(crate) fn program_sleep_enables(&self, set: usize, mailbox: &mut SleepMailbox) {
        let mut state = self.lock();
        let ControllerState { port, banks } = &mut *state;
        for (id, desc) in self.table.iter() {
            let enabled = banks[id.0].enabled[set];
            port.write(desc.regs.int_en, enabled);
            let detection = port.read(desc.regs.int_edge) & enabled;
            let polarity = port.read(desc.regs.int_pos) & enabled;
            mailbox.pack_bank(desc.start, enabled, detection, polarity);
        }
    }

    pub(crate) fn restore_active_enables(&self) {
        let mut state = self.lock();
        let ControllerState { port, banks } = &mut *state;
        for (id, desc) in self.table.iter() {
            port.write(desc.regs.int_en, banks[id.0].enabled[ACTIVE_SET]);
        }
    }

    /// Dispatch coprocessor-reported pins without consulting `int_status`:
    /// the hardware was not clocked while they fired.
    pub fn replay_fired(&self, events: &[FiredEvent], core: &dyn IrqCore) -> usize {
        let mut dispatched = 0;
        for event in events {
            match self.irq_for_pin(event.pin as u32) {
                Ok(irq) => {
                    tracing::info!("Replaying wake event: gpio {} (irq {})", event.pin, irq);
                    core.generic_handle_irq(irq);
                    dispatched += 1;
                }
                Err(e) => tracing::warn!("Dropping wake event from group {}: {}", event.group, e),
            }
        }
        self.metrics.record_wake_replay(dispatched as u64);
        dispatched
    }
}

/// Hands wake-capable interrupt state to the coprocessor around suspend.
///
/// Without a mailbox region both transitions still reprogram `int_en`; only
/// the exchange with the coprocessor is skipped.
pub struct SleepHandoff<P: RegisterPort> {
    controller: Arc<GpioController<P>>,
    region: Option<Box<dyn SharedRegion>>,
    mailbox: SleepMailbox,
    replay: Sender<WakeReplay>,
    debug: bool,
}

impl<P: RegisterPort> SleepHandoff<P> {
    pub fn new(
        controller: Arc<GpioController<P>>,
        region: Option<Box<dyn SharedRegion>>,
        config: SleepConfig,
        replay: Sender<WakeReplay>,
    ) -> Self {
        let geometry = MailboxGeometry::for_pins(
            controller.table().pin_count(),
            config.groups,
            config.max_fired,
        );
        let region = match region {
            Some(r) if r.len() < geometry.byte_len() => {
                let err = GpioError::MailboxTooSmall {
                    needed: geometry.byte_len(),
                    actual: r.len(),
                };
                tracing::warn!("{}; sleep handoff disabled", err);
                None
            }
            Some(r) => Some(r),
            None => {
                tracing::warn!("{}; sleep handoff disabled", GpioError::MailboxUnavailable);
                None
            }
        };
        Self {
            controller,
            region,
            mailbox: SleepMailbox::new(geometry),
            replay,
            debug: config.debug,
        }
    }

    /// Allocate the mailbox item from `pool`.
    pub fn from_allocator(
        controller: Arc<GpioController<P>>,
        pool: &mut dyn SmemAllocator,
        config: SleepConfig,
        replay: Sender<WakeReplay>,
    ) -> Self {
        let geometry = MailboxGeometry::for_pins(
            controller.table().pin_count(),
            config.groups,
            config.max_fired,
        );
        let region = pool.alloc(config.smem_id, geometry.byte_len());
        Self::new(controller, region, config, replay)
    }

    pub fn has_mailbox(&self) -> bool {
        self.region.is_some()
    }

    /// Mailbox contents as last written or read.
    pub fn mailbox(&self) -> &SleepMailbox {
        &self.mailbox
    }

    pub fn enter_sleep(&mut self, from_idle: bool) -> GpioResult<()> {
        let set = if from_idle { ACTIVE_SET } else { WAKE_SET };
        if self.debug {
            self.controller.dump();
        }

        self.mailbox.reset();
        self.controller.program_sleep_enables(set, &mut self.mailbox);

        let Some(region) = self.region.as_mut() else {
            return Ok(());
        };
        if self.debug {
            for (i, ((en, edge), pol)) in self
                .mailbox
                .enabled
                .iter()
                .zip(&self.mailbox.detection)
                .zip(&self.mailbox.polarity)
                .enumerate()
            {
                tracing::info!(
                    "enter_sleep gpio {}-{}: enable {:08x}, edge {:08x}, polarity {:08x}",
                    i * 32,
                    i * 32 + 31,
                    en,
                    edge,
                    pol
                );
            }
        }

        let mut buf = vec![0u8; self.mailbox.geometry().byte_len()];
        self.mailbox.encode(&mut buf)?;
        region.write_from(&buf);
        tracing::debug!("Sleep mailbox written (from_idle={})", from_idle);
        Ok(())
    }

    /// Restore active enables and queue any reported wake events. Returns the
    /// number of events queued.
    pub fn exit_sleep(&mut self) -> GpioResult<usize> {
        self.controller.restore_active_enables();

        let Some(region) = self.region.as_ref() else {
            return Ok(0);
        };
        let geometry = self.mailbox.geometry();
        let mut buf = vec![0u8; geometry.byte_len()];
        region.read_into(&mut buf);
        self.mailbox = SleepMailbox::decode(geometry, &buf)?;

        if !self.mailbox.has_fired() {
            return Ok(0);
        }
        if self.debug {
            tracing::info!("gpio: fired {:?}", self.mailbox.num_fired);
        }
        let events = self.mailbox.fired_events();
        let queued = events.len();
        if self.replay.send(WakeReplay { events }).is_err() {
            tracing::warn!("Wake replay queue is closed; dropping {} events", queued);
            return Ok(0);
        }
        Ok(queued)
    }
}
