// src/phases.rs
use crate::error::StagingError;
use crate::ops;
use crate::staging::{stream_tiles, Slot, TileQueue, TileStage};
use crate::unit::UnitBuffers;
use std::ops::Range;

/// Scalars a row produced on its way through the passes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowOutcome {
    pub max: f32,
    pub sum: f32,
    /// The sum was not a positive finite number and the row was zeroed.
    pub degenerate: bool,
}

fn tile_range(tile: usize, tile_len: usize) -> Range<usize> {
    tile * tile_len..(tile + 1) * tile_len
}

struct MaxFind<'a> {
    src: &'a [f32],
    acc: f32,
}

impl TileStage for MaxFind<'_> {
    fn copy_in(&mut self, tile: usize, slot: &mut Slot) -> Result<(), StagingError> {
        slot.copy_in(&self.src[tile_range(tile, slot.len())])
    }

    fn compute(&mut self, _tile: usize, slot: Slot) -> Result<(), StagingError> {
        self.acc = ops::reduce_max(self.acc, slot.as_slice());
        Ok(())
    }
}

/// Row maximum, starting from [`ops::MAX_SENTINEL`].
pub fn find_max(bufs: &UnitBuffers, src_row: &[f32]) -> Result<f32, StagingError> {
    let mut stage = MaxFind { src: src_row, acc: ops::MAX_SENTINEL };
    stream_tiles(&bufs.input, bufs.tiles_per_row, &mut stage)?;
    Ok(stage.acc)
}

struct ExpSum<'a> {
    src: &'a [f32],
    dst: &'a mut [f32],
    max_tile: &'a [f32],
    scratch: &'a TileQueue,
    sum: f32,
}

impl TileStage for ExpSum<'_> {
    fn copy_in(&mut self, tile: usize, slot: &mut Slot) -> Result<(), StagingError> {
        slot.copy_in(&self.src[tile_range(tile, slot.len())])
    }

    fn compute(&mut self, tile: usize, x: Slot) -> Result<(), StagingError> {
        let mut e = self.scratch.acquire()?;
        ops::sub(e.as_mut_slice(), x.as_slice(), self.max_tile);
        ops::exp_in_place(e.as_mut_slice());
        self.sum = ops::sum_into(self.sum, e.as_slice());
        e.copy_out(&mut self.dst[tile_range(tile, x.len())])
    }
}

/// Write `exp(x - max)` into `dst_row` and return the sum of those values.
pub fn exp_and_sum(
    bufs: &mut UnitBuffers,
    src_row: &[f32],
    dst_row: &mut [f32],
    max: f32,
) -> Result<f32, StagingError> {
    ops::duplicate(&mut bufs.calc, max);
    let mut stage = ExpSum {
        src: src_row,
        dst: dst_row,
        max_tile: &bufs.calc,
        scratch: &bufs.scratch,
        sum: 0.0,
    };
    stream_tiles(&bufs.input, bufs.tiles_per_row, &mut stage)?;
    Ok(stage.sum)
}

struct Normalize<'a> {
    row: &'a mut [f32],
    scale_tile: &'a [f32],
    output: &'a TileQueue,
    zero: bool,
}

impl TileStage for Normalize<'_> {
    fn copy_in(&mut self, tile: usize, slot: &mut Slot) -> Result<(), StagingError> {
        slot.copy_in(&self.row[tile_range(tile, slot.len())])
    }

    fn compute(&mut self, tile: usize, e: Slot) -> Result<(), StagingError> {
        let mut z = self.output.acquire()?;
        if self.zero {
            // Multiplying by zero would keep NaN scratch values alive.
            ops::duplicate(z.as_mut_slice(), 0.0);
        } else {
            ops::mul(z.as_mut_slice(), e.as_slice(), self.scale_tile);
        }
        z.copy_out(&mut self.row[tile_range(tile, e.len())])
    }
}

/// Scale the scratch exponentials in `dst_row` by `1 / sum`.
///
/// Returns `true` when `sum` was not positive and finite; the row is then
/// written as all zeros.
pub fn normalize(bufs: &mut UnitBuffers, dst_row: &mut [f32], sum: f32) -> Result<bool, StagingError> {
    let degenerate = !(sum > 0.0 && sum.is_finite());
    let reciprocal = if degenerate { 0.0 } else { 1.0 / sum };
    ops::duplicate(&mut bufs.calc, reciprocal);
    let mut stage = Normalize {
        row: dst_row,
        scale_tile: &bufs.calc,
        output: &bufs.output,
        zero: degenerate,
    };
    stream_tiles(&bufs.scratch, bufs.tiles_per_row, &mut stage)?;
    Ok(degenerate)
}

/// All three passes over one row.
pub fn stable_row(
    bufs: &mut UnitBuffers,
    src_row: &[f32],
    dst_row: &mut [f32],
) -> Result<RowOutcome, StagingError> {
    let max = find_max(bufs, src_row)?;
    tracing::trace!(max, "max-find done");
    let sum = exp_and_sum(bufs, src_row, dst_row, max)?;
    tracing::trace!(sum, "exp-sum done");
    let degenerate = normalize(bufs, dst_row, sum)?;
    Ok(RowOutcome { max, sum, degenerate })
}
