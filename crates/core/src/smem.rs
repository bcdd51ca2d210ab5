// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use memmap2::MmapMut;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Byte region visible to both processors.
pub trait SharedRegion: Send {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the start of the region into `buf`.
    fn read_into(&self, buf: &mut [u8]);

    /// Overwrite the start of the region with `data`.
    fn write_from(&mut self, data: &[u8]);
}

/// Shared-memory item allocator keyed by item id, in the style of the
/// coprocessor's smem heap: allocating an existing id hands back that item.
pub trait SmemAllocator {
    fn alloc(&mut self, id: u32, size: usize) -> Option<Box<dyn SharedRegion>>;
}

/// In-process region; clones alias the same bytes.
#[derive(Debug, Clone, Default)]
pub struct HeapRegion(Arc<Mutex<Vec<u8>>>);

impl HeapRegion {
    pub fn new(size: usize) -> Self {
        Self(Arc::new(Mutex::new(vec![0; size])))
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl SharedRegion for HeapRegion {
    fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn read_into(&self, buf: &mut [u8]) {
        let data = self.0.lock().unwrap_or_else(|e| e.into_inner());
        let n = buf.len().min(data.len());
        buf[..n].copy_from_slice(&data[..n]);
    }

    fn write_from(&mut self, data: &[u8]) {
        let mut mem = self.0.lock().unwrap_or_else(|e| e.into_inner());
        let n = data.len().min(mem.len());
        mem[..n].copy_from_slice(&data[..n]);
    }
}

/// File-backed region for handing the mailbox to an out-of-process
/// coprocessor model.
pub struct MappedRegion {
    mmap: MmapMut,
}

impl MappedRegion {
    pub fn open<P: AsRef<Path>>(path: P, size: usize) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.set_len(size as u64)?;
        // SAFETY: the file is sized above; concurrent writers are the external
        // coprocessor model, which only touches it across the sleep handshake.
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self { mmap })
    }
}

impl SharedRegion for MappedRegion {
    fn len(&self) -> usize {
        self.mmap.len()
    }

    fn read_into(&self, buf: &mut [u8]) {
        let n = buf.len().min(self.mmap.len());
        buf[..n].copy_from_slice(&self.mmap[..n]);
    }

    fn write_from(&mut self, data: &[u8]) {
        let n = data.len().min(self.mmap.len());
        self.mmap[..n].copy_from_slice(&data[..n]);
        if let Err(e) = self.mmap.flush() {
            tracing::warn!("Failed to flush shared memory mapping: {}", e);
        }
    }
}

/// Fixed-capacity pool of [`HeapRegion`] items.
#[derive(Debug, Default)]
pub struct HeapPool {
    capacity: usize,
    used: usize,
    items: BTreeMap<u32, HeapRegion>,
}

impl HeapPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Another handle on an allocated item, as the coprocessor would see it.
    pub fn region(&self, id: u32) -> Option<HeapRegion> {
        self.items.get(&id).cloned()
    }

    pub fn used(&self) -> usize {
        self.used
    }
}

impl SmemAllocator for HeapPool {
    fn alloc(&mut self, id: u32, size: usize) -> Option<Box<dyn SharedRegion>> {
        if let Some(item) = self.items.get(&id) {
            if item.len() < size {
                tracing::warn!(
                    "smem item {:#x} holds {} bytes, {} requested",
                    id,
                    item.len(),
                    size
                );
                return None;
            }
            return Some(Box::new(item.clone()));
        }
        if self.used + size > self.capacity {
            tracing::warn!(
                "smem pool exhausted: {} of {} bytes used, {} requested",
                self.used,
                self.capacity,
                size
            );
            return None;
        }
        let item = HeapRegion::new(size);
        self.used += size;
        self.items.insert(id, item.clone());
        Some(Box::new(item))
    }
}
