// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::flags::{Flow, Trigger};
use crate::{GpioError, GpioResult};
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard};

/// Chip callbacks the generic interrupt core drives for a range of IRQs.
///
/// Implemented once per controller and registered for the IRQ range it
/// serves. Every call names a global IRQ number.
pub trait InterruptController: Send + Sync {
    fn name(&self) -> &str;

    /// Stop dispatching `irq`; the source itself keeps latching.
    fn mask(&self, irq: u32) -> GpioResult<()>;

    fn unmask(&self, irq: u32) -> GpioResult<()>;

    /// Consume the pending status of `irq`.
    fn ack(&self, irq: u32) -> GpioResult<()>;

    fn set_type(&self, irq: u32, trigger: Trigger) -> GpioResult<()>;

    /// Add or remove `irq` from the set allowed to wake the system.
    fn set_wake(&self, irq: u32, enable: bool) -> GpioResult<()>;

    /// Flow handler matching the trigger currently programmed for `irq`.
    fn flow(&self, irq: u32) -> GpioResult<Flow>;
}

/// Entry points a chained handler uses to hand work to the generic core.
pub trait IrqCore {
    fn generic_handle_irq(&self, irq: u32);

    /// Acknowledge the parent line once all of its children were dispatched.
    fn ack_line(&self, _line: u32) {}
}

pub type IrqHandler = Box<dyn FnMut(u32) + Send>;

struct ChipEntry {
    range: Range<u32>,
    chip: Arc<dyn InterruptController>,
}

struct IrqDesc {
    chip: Arc<dyn InterruptController>,
    handler: Option<IrqHandler>,
    enabled: bool,
    wake: bool,
    /// Handler is executing; it has been taken out of `handler`.
    running: bool,
    /// Dispatched again while running; the running invocation repeats.
    pending: bool,
    count: u64,
}

#[derive(Default)]
struct DescState {
    chips: Vec<ChipEntry>,
    descs: BTreeMap<u32, IrqDesc>,
    line_acks: BTreeMap<u32, u64>,
    unhandled: u64,
}

/// Minimal generic interrupt core: per-IRQ descriptors, flow handling and
/// handler invocation.
///
/// Handlers run without the table lock held, so they may call back into the
/// table or the chip (for example to disable themselves).
#[derive(Default)]
pub struct IrqDescTable {
    state: Mutex<DescState>,
}

impl IrqDescTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DescState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register_chip(&self, range: Range<u32>, chip: Arc<dyn InterruptController>) {
        tracing::debug!(
            "Registered irq chip '{}' for irqs {}..{}",
            chip.name(),
            range.start,
            range.end
        );
        self.lock().chips.push(ChipEntry { range, chip });
    }

    fn chip_for(&self, irq: u32) -> GpioResult<Arc<dyn InterruptController>> {
        self.lock()
            .chips
            .iter()
            .find(|c| c.range.contains(&irq))
            .map(|c| c.chip.clone())
            .ok_or(GpioError::IrqOutOfRange(irq))
    }

    /// Install `handler` for `irq`, program the trigger if given, and unmask.
    ///
    /// Fails with [`GpioError::Busy`] if `irq` already has a handler.
    pub fn request_irq(
        &self,
        irq: u32,
        trigger: Option<Trigger>,
        handler: IrqHandler,
    ) -> GpioResult<()> {
        let chip = self.chip_for(irq)?;
        if self.lock().descs.contains_key(&irq) {
            return Err(GpioError::Busy(irq));
        }
        if let Some(trigger) = trigger {
            chip.set_type(irq, trigger)?;
        }
        self.lock().descs.insert(
            irq,
            IrqDesc {
                chip: chip.clone(),
                handler: Some(handler),
                enabled: true,
                wake: false,
                running: false,
                pending: false,
                count: 0,
            },
        );
        chip.unmask(irq)
    }

    pub fn free_irq(&self, irq: u32) -> GpioResult<()> {
        let desc = self
            .lock()
            .descs
            .remove(&irq)
            .ok_or(GpioError::IrqOutOfRange(irq))?;
        desc.chip.mask(irq)?;
        if desc.wake {
            desc.chip.set_wake(irq, false)?;
        }
        Ok(())
    }

    pub fn set_irq_type(&self, irq: u32, trigger: Trigger) -> GpioResult<()> {
        self.chip_for(irq)?.set_type(irq, trigger)
    }

    pub fn set_irq_wake(&self, irq: u32, enable: bool) -> GpioResult<()> {
        self.chip_for(irq)?.set_wake(irq, enable)?;
        if let Some(desc) = self.lock().descs.get_mut(&irq) {
            desc.wake = enable;
        }
        Ok(())
    }

    pub fn enable_irq(&self, irq: u32) -> GpioResult<()> {
        self.set_enabled(irq, true)
    }

    pub fn disable_irq(&self, irq: u32) -> GpioResult<()> {
        self.set_enabled(irq, false)
    }

    fn set_enabled(&self, irq: u32, enabled: bool) -> GpioResult<()> {
        let chip = {
            let mut state = self.lock();
            let desc = state
                .descs
                .get_mut(&irq)
                .ok_or(GpioError::IrqOutOfRange(irq))?;
            desc.enabled = enabled;
            desc.chip.clone()
        };
        if enabled {
            chip.unmask(irq)
        } else {
            chip.mask(irq)
        }
    }

    /// Times the handler of `irq` ran.
    pub fn count(&self, irq: u32) -> u64 {
        self.lock().descs.get(&irq).map(|d| d.count).unwrap_or(0)
    }

    /// Dispatches that found no enabled handler.
    pub fn unhandled(&self) -> u64 {
        self.lock().unhandled
    }

    pub fn line_acks(&self, line: u32) -> u64 {
        self.lock().line_acks.get(&line).copied().unwrap_or(0)
    }

    fn handle_unclaimed(&self, irq: u32) {
        self.lock().unhandled += 1;
        match self.chip_for(irq) {
            Ok(chip) => {
                tracing::warn!("No handler for irq {}; masking it", irq);
                if let Err(e) = chip.ack(irq) {
                    tracing::warn!("Ack of unclaimed irq {} failed: {}", irq, e);
                }
                if let Err(e) = chip.mask(irq) {
                    tracing::warn!("Masking unclaimed irq {} failed: {}", irq, e);
                }
            }
            Err(e) => tracing::warn!("Dispatch of irq {} dropped: {}", irq, e),
        }
    }

    fn run_handler(&self, irq: u32) {
        let mut handler = {
            let mut state = self.lock();
            let Some(desc) = state.descs.get_mut(&irq) else {
                return;
            };
            if desc.running {
                desc.pending = true;
                return;
            }
            let Some(handler) = desc.handler.take() else {
                return;
            };
            desc.running = true;
            desc.count += 1;
            handler
        };
        loop {
            handler(irq);
            let mut state = self.lock();
            let Some(desc) = state.descs.get_mut(&irq) else {
                // Freed while running.
                return;
            };
            if desc.running && desc.pending && desc.enabled {
                desc.pending = false;
                desc.count += 1;
                continue;
            }
            desc.pending = false;
            desc.running = false;
            if desc.handler.is_none() {
                desc.handler = Some(handler);
            }
            return;
        }
    }
}

impl IrqCore for IrqDescTable {
    fn generic_handle_irq(&self, irq: u32) {
        let claimed = {
            let state = self.lock();
            state
                .descs
                .get(&irq)
                .filter(|d| d.enabled && (d.handler.is_some() || d.running))
                .map(|d| d.chip.clone())
        };
        let Some(chip) = claimed else {
            self.handle_unclaimed(irq);
            return;
        };

        let flow = chip.flow(irq).unwrap_or(Flow::Edge);
        let res = match flow {
            Flow::Edge => chip.ack(irq).map(|_| self.run_handler(irq)),
            Flow::Level => chip
                .mask(irq)
                .and_then(|_| chip.ack(irq))
                .map(|_| self.run_handler(irq))
                .and_then(|_| {
                    let still_enabled = self
                        .lock()
                        .descs
                        .get(&irq)
                        .map(|d| d.enabled)
                        .unwrap_or(false);
                    if still_enabled {
                        chip.unmask(irq)
                    } else {
                        Ok(())
                    }
                }),
        };
        if let Err(e) = res {
            tracing::warn!("Flow handling of irq {} failed: {}", irq, e);
        }
    }

    fn ack_line(&self, line: u32) {
        *self.lock().line_acks.entry(line).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records chip calls in order.
    #[derive(Default)]
    struct RecordingChip {
        calls: Mutex<Vec<String>>,
        level: bool,
        fail_ack: bool,
    }

    impl RecordingChip {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn push(&self, s: String) -> GpioResult<()> {
            self.calls.lock().unwrap().push(s);
            Ok(())
        }
    }

    impl InterruptController for RecordingChip {
        fn name(&self) -> &str {
            "recording"
        }
        fn mask(&self, irq: u32) -> GpioResult<()> {
            self.push(format!("mask {irq}"))
        }
        fn unmask(&self, irq: u32) -> GpioResult<()> {
            self.push(format!("unmask {irq}"))
        }
        fn ack(&self, irq: u32) -> GpioResult<()> {
            self.push(format!("ack {irq}"))?;
            if self.fail_ack {
                return Err(GpioError::IrqOutOfRange(irq));
            }
            Ok(())
        }
        fn set_type(&self, irq: u32, trigger: Trigger) -> GpioResult<()> {
            self.push(format!("type {irq} {trigger:?}"))
        }
        fn set_wake(&self, irq: u32, enable: bool) -> GpioResult<()> {
            self.push(format!("wake {irq} {enable}"))
        }
        fn flow(&self, _irq: u32) -> GpioResult<Flow> {
            Ok(if self.level { Flow::Level } else { Flow::Edge })
        }
    }

    fn table(level: bool) -> (IrqDescTable, Arc<RecordingChip>, Arc<Mutex<Vec<u32>>>) {
        let chip = Arc::new(RecordingChip {
            level,
            ..Default::default()
        });
        let table = IrqDescTable::new();
        table.register_chip(64..96, chip.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        table
            .request_irq(
                70,
                Some(Trigger::EdgeFalling),
                Box::new(move |irq| sink.lock().unwrap().push(irq)),
            )
            .unwrap();
        (table, chip, seen)
    }

    #[test]
    fn test_request_programs_trigger_and_unmasks() {
        let (_table, chip, _) = table(false);
        assert_eq!(chip.calls(), vec!["type 70 EdgeFalling", "unmask 70"]);
    }

    #[test]
    fn test_edge_flow_acks_before_handler() {
        let (table, chip, seen) = table(false);
        table.generic_handle_irq(70);
        assert_eq!(*seen.lock().unwrap(), vec![70]);
        assert_eq!(&chip.calls()[2..], &["ack 70"]);
        assert_eq!(table.count(70), 1);
    }

    #[test]
    fn test_level_flow_masks_around_handler() {
        let (table, chip, _) = table(true);
        table.generic_handle_irq(70);
        assert_eq!(&chip.calls()[2..], &["mask 70", "ack 70", "unmask 70"]);
    }

    #[test]
    fn test_unclaimed_irq_is_masked() {
        let (table, chip, seen) = table(false);
        table.generic_handle_irq(71);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(&chip.calls()[2..], &["ack 71", "mask 71"]);
        assert_eq!(table.unhandled(), 1);

        table.generic_handle_irq(200);
        assert_eq!(table.unhandled(), 2);
    }

    #[test]
    fn test_unclaimed_irq_masked_even_if_ack_fails() {
        let chip = Arc::new(RecordingChip {
            fail_ack: true,
            ..Default::default()
        });
        let table = IrqDescTable::new();
        table.register_chip(64..96, chip.clone());
        table.generic_handle_irq(80);
        assert_eq!(chip.calls(), vec!["ack 80", "mask 80"]);
        assert_eq!(table.unhandled(), 1);
    }

    #[test]
    fn test_free_irq_drops_wake() {
        let (table, chip, _) = table(false);
        table.set_irq_wake(70, true).unwrap();
        table.free_irq(70).unwrap();
        assert_eq!(&chip.calls()[2..], &["wake 70 true", "mask 70", "wake 70 false"]);
        assert!(table.free_irq(70).is_err());
        assert!(table.set_irq_type(10, Trigger::LevelHigh).is_err());
    }

    #[test]
    fn test_handler_may_disable_itself() {
        let chip = Arc::new(RecordingChip::default());
        let table = Arc::new(IrqDescTable::new());
        table.register_chip(64..96, chip.clone());
        let inner = table.clone();
        table
            .request_irq(
                65,
                None,
                Box::new(move |irq| {
                    let _ = inner.disable_irq(irq);
                }),
            )
            .unwrap();
        table.generic_handle_irq(65);
        table.generic_handle_irq(65);
        assert_eq!(table.count(65), 1);
        assert_eq!(table.unhandled(), 1);
    }

    #[test]
    fn test_redispatch_while_running_reruns_handler() {
        let chip = Arc::new(RecordingChip::default());
        let table = Arc::new(IrqDescTable::new());
        table.register_chip(64..96, chip.clone());
        let runs = Arc::new(Mutex::new(0u32));
        let (inner, counter) = (table.clone(), runs.clone());
        table
            .request_irq(
                93,
                Some(Trigger::EdgeFalling),
                Box::new(move |irq| {
                    let first = {
                        let mut n = counter.lock().unwrap();
                        *n += 1;
                        *n == 1
                    };
                    if first {
                        inner.generic_handle_irq(irq);
                    }
                }),
            )
            .unwrap();

        table.generic_handle_irq(93);
        assert_eq!(*runs.lock().unwrap(), 2);
        assert_eq!(table.count(93), 2);
        assert_eq!(table.unhandled(), 0);
        assert!(!chip.calls().iter().any(|c| c == "mask 93"));

        // Back to idle: a later dispatch runs the handler normally.
        table.generic_handle_irq(93);
        assert_eq!(table.count(93), 3);
    }

    #[test]
    fn test_request_twice_is_busy() {
        let (table, _chip, _) = table(false);
        let err = table
            .request_irq(70, None, Box::new(|_| {}))
            .unwrap_err();
        assert_eq!(err, GpioError::Busy(70));
        table.free_irq(70).unwrap();
        assert!(table.request_irq(70, None, Box::new(|_| {})).is_ok());
    }
}
