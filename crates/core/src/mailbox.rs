// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! The sleep mailbox shared with the coprocessor.
//!
//! Byte layout, little endian, no padding:
//!
//! ```text
//! u16 num_fired[G]
//! u16 fired[G][K]
//! u32 enabled[W]
//! u32 detection[W]
//! u32 polarity[W]
//! ```
//!
//! with `W = ceil(pin_count / 32)`. The three bit arrays cover the global pin
//! space, so a bank whose range is not 32-aligned lands in two words.
//!
//! Neither side locks the region. The application core writes it only
//! before the power-state handshake and reads it only after the coprocessor
//! signalled resume.

use crate::bank::width_mask;
use crate::{GpioError, GpioResult};
use gpiobank_config::MailboxArray;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MailboxGeometry {
    pub groups: usize,
    pub max_fired: usize,
    pub words: usize,
}

impl MailboxGeometry {
    pub fn for_pins(pin_count: u32, groups: usize, max_fired: usize) -> Self {
        Self {
            groups,
            max_fired,
            words: pin_count.div_ceil(32) as usize,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.arrays_offset() + 3 * 4 * self.words
    }

    fn fired_offset(&self) -> usize {
        2 * self.groups
    }

    fn arrays_offset(&self) -> usize {
        self.fired_offset() + 2 * self.groups * self.max_fired
    }
}

/// A wake event the coprocessor recorded while the application core slept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FiredEvent {
    pub group: usize,
    pub pin: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SleepMailbox {
    #[serde(skip)]
    geometry: MailboxGeometry,
    pub num_fired: Vec<u16>,
    pub fired: Vec<Vec<u16>>,
    pub enabled: Vec<u32>,
    pub detection: Vec<u32>,
    pub polarity: Vec<u32>,
}

impl SleepMailbox {
    pub fn new(geometry: MailboxGeometry) -> Self {
        Self {
            geometry,
            num_fired: vec![0; geometry.groups],
            fired: vec![vec![0; geometry.max_fired]; geometry.groups],
            enabled: vec![0; geometry.words],
            detection: vec![0; geometry.words],
            polarity: vec![0; geometry.words],
        }
    }

    pub fn geometry(&self) -> MailboxGeometry {
        self.geometry
    }

    /// Zero every field; the mailbox is rebuilt from scratch on each entry.
    pub fn reset(&mut self) {
        *self = Self::new(self.geometry);
    }

    pub fn words(&self, array: MailboxArray) -> &[u32] {
        match array {
            MailboxArray::Enabled => &self.enabled,
            MailboxArray::Detection => &self.detection,
            MailboxArray::Polarity => &self.polarity,
        }
    }

    /// OR one bank's masks in at the bank's global pin offset.
    pub fn pack_bank(&mut self, start: u32, enabled: u32, detection: u32, polarity: u32) {
        pack_bits(&mut self.enabled, start, enabled);
        pack_bits(&mut self.detection, start, detection);
        pack_bits(&mut self.polarity, start, polarity);
    }

    /// Inverse of [`pack_bank`](Self::pack_bank): `(enabled, detection, polarity)`.
    pub fn unpack_bank(&self, start: u32, width: u32) -> (u32, u32, u32) {
        (
            unpack_bits(&self.enabled, start, width),
            unpack_bits(&self.detection, start, width),
            unpack_bits(&self.polarity, start, width),
        )
    }

    /// Coprocessor side: append a fired pin to `group`. Returns false once the
    /// group is full.
    pub fn record_fired(&mut self, group: usize, pin: u16) -> bool {
        let Some(count) = self.num_fired.get_mut(group) else {
            return false;
        };
        let slot = *count as usize;
        if slot >= self.geometry.max_fired {
            return false;
        }
        let Some(entry) = self.fired.get_mut(group).and_then(|l| l.get_mut(slot)) else {
            return false;
        };
        *entry = pin;
        *count += 1;
        true
    }

    pub fn has_fired(&self) -> bool {
        self.num_fired.iter().any(|n| *n > 0)
    }

    /// Reported events in group order. A count above the list capacity is
    /// clamped rather than trusted.
    pub fn fired_events(&self) -> Vec<FiredEvent> {
        let mut events = Vec::new();
        for (group, count) in self.num_fired.iter().enumerate() {
            let list = self.fired.get(group).map(Vec::as_slice).unwrap_or(&[]);
            let mut count = *count as usize;
            if count > list.len() {
                tracing::warn!(
                    "Mailbox group {} reports {} fired events, list holds {}",
                    group,
                    count,
                    list.len()
                );
                count = list.len();
            }
            events.extend(
                list[..count]
                    .iter()
                    .map(|pin| FiredEvent { group, pin: *pin }),
            );
        }
        events
    }

    pub fn encode(&self, buf: &mut [u8]) -> GpioResult<()> {
        let g = self.geometry;
        let needed = g.byte_len();
        if buf.len() < needed {
            return Err(GpioError::MailboxTooSmall {
                needed,
                actual: buf.len(),
            });
        }
        let halves = self.num_fired.iter().chain(self.fired.iter().flatten());
        for (chunk, v) in buf.chunks_exact_mut(2).zip(halves) {
            chunk.copy_from_slice(&v.to_le_bytes());
        }
        let words = self
            .enabled
            .iter()
            .chain(&self.detection)
            .chain(&self.polarity);
        for (chunk, v) in buf[g.arrays_offset()..needed].chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&v.to_le_bytes());
        }
        Ok(())
    }

    pub fn decode(geometry: MailboxGeometry, buf: &[u8]) -> GpioResult<Self> {
        let needed = geometry.byte_len();
        if buf.len() < needed {
            return Err(GpioError::MailboxTooSmall {
                needed,
                actual: buf.len(),
            });
        }
        let halves: Vec<u16> = buf[..geometry.arrays_offset()]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        let words: Vec<u32> = buf[geometry.arrays_offset()..needed]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        let (num_fired, fired) = halves.split_at(geometry.groups);
        let w = geometry.words;
        Ok(Self {
            geometry,
            num_fired: num_fired.to_vec(),
            fired: (0..geometry.groups)
                .map(|g| {
                    let k = geometry.max_fired;
                    fired.get(g * k..(g + 1) * k).unwrap_or(&[]).to_vec()
                })
                .collect(),
            enabled: words[..w].to_vec(),
            detection: words[w..2 * w].to_vec(),
            polarity: words[2 * w..].to_vec(),
        })
    }
}

/// OR `bits` into `words` starting at global bit `start`, spilling the high
/// part into the next word when the range crosses a word boundary.
pub fn pack_bits(words: &mut [u32], start: u32, bits: u32) {
    let index = (start / 32) as usize;
    let wide = (bits as u64) << (start % 32);
    let (low, high) = (wide as u32, (wide >> 32) as u32);
    match words.get_mut(index) {
        Some(w) => *w |= low,
        None => {
            tracing::warn!("Bits at pin {} fall outside the mailbox", start);
            return;
        }
    }
    if high != 0 {
        match words.get_mut(index + 1) {
            Some(w) => *w |= high,
            None => tracing::warn!("Bits above pin {} fall outside the mailbox", start),
        }
    }
}

/// Gather `width` bits starting at global bit `start`.
pub fn unpack_bits(words: &[u32], start: u32, width: u32) -> u32 {
    let index = (start / 32) as usize;
    let low = words.get(index).copied().unwrap_or(0) as u64;
    let high = words.get(index + 1).copied().unwrap_or(0) as u64;
    (((high << 32) | low) >> (start % 32)) as u32 & width_mask(width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_for_six_banks() {
        let g = MailboxGeometry::for_pins(122, 2, 8);
        assert_eq!(g.words, 4);
        assert_eq!(g.byte_len(), 4 + 32 + 48);
        assert_eq!(MailboxGeometry::for_pins(32, 2, 8).words, 1);
        assert_eq!(MailboxGeometry::for_pins(33, 2, 8).words, 2);
    }

    #[test]
    fn test_pack_straddling_bank() {
        let mut words = [0u32; 2];
        // Pins 16..=42: bits 16..31 of word 0, 0..10 of word 1.
        pack_bits(&mut words, 16, 0x07FF_FFFF);
        assert_eq!(words, [0xFFFF_0000, 0x0000_07FF]);
        assert_eq!(unpack_bits(&words, 16, 27), 0x07FF_FFFF);

        pack_bits(&mut words, 43, 0x1);
        assert_eq!(words[1], 0x0000_0FFF);
        assert_eq!(unpack_bits(&words, 16, 27), 0x07FF_FFFF);
    }

    #[test]
    fn test_pack_last_word_has_no_spill() {
        let mut words = [0u32; 4];
        pack_bits(&mut words, 107, 0x7FFF);
        assert_eq!(words[3], 0x7FFF << 11);
        assert_eq!(unpack_bits(&words, 107, 15), 0x7FFF);
    }

    #[test]
    fn test_round_trip_all_banks() {
        let banks = [(0, 16), (16, 27), (43, 25), (68, 27), (95, 12), (107, 15)];
        let mut mb = SleepMailbox::new(MailboxGeometry::for_pins(122, 2, 8));
        for (i, (start, width)) in banks.iter().enumerate() {
            let seed = 0x9E37_79B9u32.rotate_left(i as u32 * 5) & width_mask(*width);
            mb.pack_bank(*start, seed, seed & 0x5555_5555, seed & 0x0F0F_0F0F);
        }
        for (i, (start, width)) in banks.iter().enumerate() {
            let seed = 0x9E37_79B9u32.rotate_left(i as u32 * 5) & width_mask(*width);
            assert_eq!(
                mb.unpack_bank(*start, *width),
                (seed, seed & 0x5555_5555, seed & 0x0F0F_0F0F)
            );
        }
    }

    #[test]
    fn test_fired_list_is_bounded() {
        let mut mb = SleepMailbox::new(MailboxGeometry::for_pins(43, 2, 2));
        assert!(mb.record_fired(1, 29));
        assert!(mb.record_fired(1, 30));
        assert!(!mb.record_fired(1, 31));
        assert!(!mb.record_fired(2, 5));
        assert_eq!(
            mb.fired_events(),
            vec![
                FiredEvent { group: 1, pin: 29 },
                FiredEvent { group: 1, pin: 30 }
            ]
        );

        // A corrupt count from the other side is clamped.
        mb.num_fired[1] = 500;
        assert_eq!(mb.fired_events().len(), 2);
    }

    #[test]
    fn test_zero_slot_mailbox_ignores_reported_counts() {
        let geometry = MailboxGeometry::for_pins(43, 2, 0);
        let mut buf = vec![0u8; geometry.byte_len()];
        buf[0] = 1;
        buf[2] = 3;

        let mb = SleepMailbox::decode(geometry, &buf).unwrap();
        assert_eq!(mb.fired.len(), 2);
        assert!(mb.fired.iter().all(Vec::is_empty));
        assert_eq!(mb.num_fired, vec![1, 3]);
        assert!(mb.fired_events().is_empty());

        let mut local = SleepMailbox::new(geometry);
        assert!(!local.record_fired(0, 7));
        assert!(local.fired_events().is_empty());
    }

    #[test]
    fn test_encode_layout_is_little_endian() {
        let mut mb = SleepMailbox::new(MailboxGeometry::for_pins(43, 2, 8));
        mb.record_fired(0, 0x0102);
        mb.enabled[1] = 0xAABB_CCDD;
        mb.polarity[0] = 1;

        let mut buf = vec![0u8; mb.geometry().byte_len()];
        mb.encode(&mut buf).unwrap();
        assert_eq!(&buf[0..2], &[1, 0]);
        assert_eq!(&buf[4..6], &[0x02, 0x01]);
        // enabled[1] after 4 + 32 bytes of counters and lists, plus one word.
        assert_eq!(&buf[40..44], &[0xDD, 0xCC, 0xBB, 0xAA]);
        assert_eq!(buf[36 + 16], 1);

        let back = SleepMailbox::decode(mb.geometry(), &buf).unwrap();
        assert_eq!(back, mb);
        assert!(matches!(
            mb.encode(&mut [0u8; 8]),
            Err(GpioError::MailboxTooSmall { needed: 60, actual: 8 })
        ));
    }
}
