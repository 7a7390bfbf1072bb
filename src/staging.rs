// src/staging.rs
use crate::error::StagingError;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct SlotStats {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

/// Acquire/release totals for one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotCounts {
    pub acquired: usize,
    pub released: usize,
}

impl SlotCounts {
    pub fn merge(self, other: SlotCounts) -> SlotCounts {
        SlotCounts {
            acquired: self.acquired + other.acquired,
            released: self.released + other.released,
        }
    }
}

/// One tile-sized working buffer, exclusively owned by its holder.
pub struct Slot {
    data: Option<Box<[f32]>>,
    filled: bool,
    home: Sender<Box<[f32]>>,
    stats: Arc<SlotStats>,
}

impl Slot {
    /// Copy a whole tile in. Partial tiles are refused.
    pub fn copy_in(&mut self, src: &[f32]) -> Result<(), StagingError> {
        let buf = self.buf_mut();
        if src.len() != buf.len() {
            return Err(StagingError::LengthMismatch { expected: buf.len(), actual: src.len() });
        }
        buf.copy_from_slice(src);
        self.filled = true;
        Ok(())
    }

    /// Copy the whole tile out.
    pub fn copy_out(&self, dst: &mut [f32]) -> Result<(), StagingError> {
        let buf = self.as_slice();
        if dst.len() != buf.len() {
            return Err(StagingError::LengthMismatch { expected: buf.len(), actual: dst.len() });
        }
        dst.copy_from_slice(buf);
        Ok(())
    }

    /// Whether `copy_in` has completed on this slot since it was acquired.
    pub fn is_filled(&self) -> bool {
        self.filled
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn as_slice(&self) -> &[f32] {
        self.data.as_deref().unwrap_or_default()
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        self.buf_mut()
    }

    fn buf_mut(&mut self) -> &mut [f32] {
        self.data.as_deref_mut().unwrap_or_default()
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            // The free list has room for every slot the queue created. If the
            // queue is already gone the storage is simply freed.
            let _ = self.home.try_send(data);
            self.stats.released.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot").field("len", &self.len()).field("filled", &self.filled).finish()
    }
}

/// Bounded pool of `depth` slots plus the FIFO hand-off between the transfer
/// and compute stages.
pub struct TileQueue {
    name: &'static str,
    depth: usize,
    free_tx: Sender<Box<[f32]>>,
    free_rx: Receiver<Box<[f32]>>,
    ready_tx: Sender<Slot>,
    ready_rx: Receiver<Slot>,
    stats: Arc<SlotStats>,
}

impl TileQueue {
    pub fn new(name: &'static str, depth: usize, tile_len: usize) -> Self {
        let (free_tx, free_rx) = bounded(depth);
        let (ready_tx, ready_rx) = bounded(depth);
        for _ in 0..depth {
            // Capacity equals depth, so this cannot fail.
            let _ = free_tx.try_send(vec![0.0f32; tile_len].into_boxed_slice());
        }
        Self {
            name,
            depth,
            free_tx,
            free_rx,
            ready_tx,
            ready_rx,
            stats: Arc::new(SlotStats::default()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Reserve a free slot. Fails when every slot is in flight; the caller
    /// must drain one before trying again.
    pub fn acquire(&self) -> Result<Slot, StagingError> {
        let data = self
            .free_rx
            .try_recv()
            .map_err(|_| StagingError::Exhausted { queue: self.name, depth: self.depth })?;
        self.stats.acquired.fetch_add(1, Ordering::Relaxed);
        Ok(Slot {
            data: Some(data),
            filled: false,
            home: self.free_tx.clone(),
            stats: Arc::clone(&self.stats),
        })
    }

    /// Hand a filled slot to the compute stage.
    pub fn enqueue(&self, slot: Slot) -> Result<(), StagingError> {
        if !slot.is_filled() {
            return Err(StagingError::NotFilled { queue: self.name });
        }
        self.ready_tx.try_send(slot).map_err(|e| match e {
            TrySendError::Full(_) | TrySendError::Disconnected(_) => {
                StagingError::Exhausted { queue: self.name, depth: self.depth }
            }
        })
    }

    /// Oldest filled slot, if any.
    pub fn dequeue(&self) -> Option<Slot> {
        self.ready_rx.try_recv().ok()
    }

    /// Return a slot to the free list.
    pub fn release(&self, slot: Slot) {
        drop(slot);
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.free_rx.len()
    }

    /// Filled slots waiting for compute.
    pub fn in_flight(&self) -> usize {
        self.ready_rx.len()
    }

    pub fn counts(&self) -> SlotCounts {
        SlotCounts {
            acquired: self.stats.acquired.load(Ordering::Relaxed),
            released: self.stats.released.load(Ordering::Relaxed),
        }
    }

    fn drain(&self) {
        while let Some(slot) = self.dequeue() {
            drop(slot);
        }
    }
}

/// One streaming pass over a row: how a tile gets into a slot, and what the
/// compute step does with it.
pub trait TileStage {
    fn copy_in(&mut self, tile: usize, slot: &mut Slot) -> Result<(), StagingError>;
    fn compute(&mut self, tile: usize, slot: Slot) -> Result<(), StagingError>;
}

struct DrainOnExit<'a>(&'a TileQueue);

impl Drop for DrainOnExit<'_> {
    fn drop(&mut self) {
        self.0.drain();
    }
}

/// Stream `tiles` tiles through `queue` with up to `depth` tiles prefetched.
///
/// When every slot is in flight the transfer side yields to the compute side,
/// which consumes the oldest tile and frees its slot. Tiles reach `compute`
/// in order.
pub fn stream_tiles<S: TileStage>(
    queue: &TileQueue,
    tiles: usize,
    stage: &mut S,
) -> Result<(), StagingError> {
    let _guard = DrainOnExit(queue);
    let mut next = 0;
    for done in 0..tiles {
        while next < tiles && queue.available() > 0 {
            let mut slot = queue.acquire()?;
            stage.copy_in(next, &mut slot)?;
            queue.enqueue(slot)?;
            next += 1;
        }
        let slot = queue
            .dequeue()
            .ok_or(StagingError::Exhausted { queue: queue.name(), depth: queue.depth() })?;
        stage.compute(done, slot)?;
    }
    Ok(())
}
