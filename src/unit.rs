// src/unit.rs
use crate::config::{LaunchParams, Partition};
use crate::error::{Result, SoftmaxError};
use crate::phases::{self, RowOutcome};
use crate::staging::{SlotCounts, TileQueue};
use crate::vector;

/// Row algorithm a unit runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Variant {
    /// Max-find, `exp(x - max)` with scratch reuse, then normalise.
    #[default]
    Stabilized,
    /// Tile-shaped accumulator with reduce + broadcast and no max
    /// subtraction. Overflows once `exp(x)` leaves f32 range.
    Unstabilized,
}

/// A unit's private working memory: three slot queues and one calc tile.
pub struct UnitBuffers {
    pub(crate) input: TileQueue,
    pub(crate) scratch: TileQueue,
    pub(crate) output: TileQueue,
    pub(crate) calc: Vec<f32>,
    pub(crate) tiles_per_row: usize,
}

impl UnitBuffers {
    pub fn new(tile_length: usize, tiles_per_row: usize, buffer_depth: usize) -> Self {
        Self {
            input: TileQueue::new("input", buffer_depth, tile_length),
            scratch: TileQueue::new("scratch", buffer_depth, tile_length),
            output: TileQueue::new("output", buffer_depth, tile_length),
            calc: vec![0.0; tile_length],
            tiles_per_row,
        }
    }

    pub fn counts(&self) -> SlotCounts {
        self.input.counts().merge(self.scratch.counts()).merge(self.output.counts())
    }

    /// Free slots across all queues.
    pub fn available(&self) -> usize {
        self.input.available() + self.scratch.available() + self.output.available()
    }
}

/// What one unit did with its partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitReport {
    pub unit_index: usize,
    pub rows: usize,
    /// Global indices of rows that fell back to zero output.
    pub degenerate_rows: Vec<usize>,
    pub slots: SlotCounts,
    /// Free slots once the unit finished; equals `3 * buffer_depth`.
    pub slots_free_after: usize,
}

/// One compute unit: identifies its partition from its ordinal and the
/// launch parameters, then runs every row of it.
pub struct ComputeUnit {
    index: usize,
    params: LaunchParams,
    partition: Partition,
    bufs: UnitBuffers,
}

impl ComputeUnit {
    pub fn new(index: usize, params: LaunchParams) -> Self {
        let bufs = UnitBuffers::new(
            params.tile_length as usize,
            params.tiles_per_row as usize,
            params.buffer_depth as usize,
        );
        Self { index, params, partition: params.partition_for(index), bufs }
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    /// Run every row of the partition.
    ///
    /// `src` is the whole backing buffer; the unit reads only its own
    /// partition of it. `dst` is this unit's partition of the destination.
    pub fn run(&mut self, variant: Variant, src: &[f32], dst: &mut [f32]) -> Result<UnitReport> {
        let part = self.partition;
        let src = src.get(part.range()).ok_or(SoftmaxError::RegionTooSmall {
            region: "source",
            required: part.range().end,
            actual: src.len(),
        })?;
        if dst.len() != part.length {
            return Err(SoftmaxError::RegionTooSmall {
                region: "destination partition",
                required: part.length,
                actual: dst.len(),
            });
        }

        let width = self.params.row_width as usize;
        let first_row = self.index * self.params.rows_per_unit as usize;
        let mut degenerate_rows = Vec::new();
        for (r, (src_row, dst_row)) in src.chunks_exact(width).zip(dst.chunks_exact_mut(width)).enumerate() {
            let outcome = self.run_row(variant, src_row, dst_row)?;
            let row = first_row + r;
            if variant == Variant::Unstabilized && !outcome.sum.is_finite() {
                return Err(SoftmaxError::NonFiniteSum { unit: self.index, row });
            }
            if outcome.degenerate {
                tracing::warn!(unit = self.index, row, sum = outcome.sum, "degenerate row zeroed");
                degenerate_rows.push(row);
            }
        }

        Ok(UnitReport {
            unit_index: self.index,
            rows: self.params.rows_per_unit as usize,
            degenerate_rows,
            slots: self.bufs.counts(),
            slots_free_after: self.bufs.available(),
        })
    }

    fn run_row(&mut self, variant: Variant, src_row: &[f32], dst_row: &mut [f32]) -> Result<RowOutcome> {
        let outcome = match variant {
            Variant::Stabilized => phases::stable_row(&mut self.bufs, src_row, dst_row)?,
            Variant::Unstabilized => vector::unstable_row(&mut self.bufs, src_row, dst_row)?,
        };
        Ok(outcome)
    }
}
