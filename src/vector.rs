// src/vector.rs
// Reduce/broadcast variant without max subtraction. Any `x` above about 88.7
// overflows `exp` in f32; the unit turns the resulting non-finite sum into an
// error. Use the stabilized pipeline unless the input range is bounded.

use crate::error::StagingError;
use crate::ops;
use crate::phases::RowOutcome;
use crate::staging::{stream_tiles, Slot, TileQueue, TileStage};
use crate::unit::UnitBuffers;

struct ExpAccumulate<'a> {
    src: &'a [f32],
    acc: &'a mut [f32],
}

impl TileStage for ExpAccumulate<'_> {
    fn copy_in(&mut self, tile: usize, slot: &mut Slot) -> Result<(), StagingError> {
        let n = slot.len();
        slot.copy_in(&self.src[tile * n..(tile + 1) * n])
    }

    fn compute(&mut self, _tile: usize, mut x: Slot) -> Result<(), StagingError> {
        ops::exp_in_place(x.as_mut_slice());
        ops::accumulate(self.acc, x.as_slice());
        Ok(())
    }
}

struct ExpDivide<'a> {
    src: &'a [f32],
    dst: &'a mut [f32],
    sum_tile: &'a [f32],
    output: &'a TileQueue,
    zero: bool,
}

impl TileStage for ExpDivide<'_> {
    fn copy_in(&mut self, tile: usize, slot: &mut Slot) -> Result<(), StagingError> {
        let n = slot.len();
        slot.copy_in(&self.src[tile * n..(tile + 1) * n])
    }

    fn compute(&mut self, tile: usize, mut x: Slot) -> Result<(), StagingError> {
        let n = x.len();
        let mut z = self.output.acquire()?;
        if self.zero {
            ops::duplicate(z.as_mut_slice(), 0.0);
        } else {
            ops::exp_in_place(x.as_mut_slice());
            ops::div(z.as_mut_slice(), x.as_slice(), self.sum_tile);
        }
        z.copy_out(&mut self.dst[tile * n..(tile + 1) * n])
    }
}

/// One row through the reduce/broadcast path.
///
/// `max` in the outcome is always `NAN`: this path never computes it.
pub fn unstable_row(
    bufs: &mut UnitBuffers,
    src_row: &[f32],
    dst_row: &mut [f32],
) -> Result<RowOutcome, StagingError> {
    ops::duplicate(&mut bufs.calc, 0.0);
    let mut stage = ExpAccumulate { src: src_row, acc: &mut bufs.calc };
    stream_tiles(&bufs.input, bufs.tiles_per_row, &mut stage)?;

    let sum = ops::reduce_sum(&bufs.calc);
    let reduced = [sum];
    ops::broadcast(&mut bufs.calc, &reduced);
    tracing::trace!(sum, "reduce + broadcast done");

    // Overflowed rows are rejected by the caller; only an all-underflow row
    // (sum == 0) reaches the zero fallback.
    let degenerate = !(sum > 0.0 && sum.is_finite());
    if !sum.is_finite() {
        return Ok(RowOutcome { max: f32::NAN, sum, degenerate });
    }
    let mut stage = ExpDivide {
        src: src_row,
        dst: dst_row,
        sum_tile: &bufs.calc,
        output: &bufs.output,
        zero: degenerate,
    };
    stream_tiles(&bufs.input, bufs.tiles_per_row, &mut stage)?;
    Ok(RowOutcome { max: f32::NAN, sum, degenerate })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_stable_path_on_small_inputs() {
        let mut b = UnitBuffers::new(2, 2, 2);
        let src = [1.0f32, 2.0, 3.0, 4.0];
        let mut dst = [0.0f32; 4];
        let out = unstable_row(&mut b, &src, &mut dst).unwrap();
        assert!(!out.degenerate);
        let expected = [0.0320586f32, 0.0871443, 0.2368828, 0.6439143];
        for (got, want) in dst.iter().zip(expected) {
            assert!((got - want).abs() < 1e-5, "{got} vs {want}");
        }
    }

    #[test]
    fn large_inputs_overflow_the_sum() {
        let mut b = UnitBuffers::new(2, 2, 2);
        let src = [0.0f32, 0.0, 100.0, 0.0];
        let mut dst = [0.0f32; 4];
        let out = unstable_row(&mut b, &src, &mut dst).unwrap();
        assert!(out.sum.is_infinite());
        assert_eq!(b.counts().acquired, b.counts().released);
    }

    #[test]
    fn full_underflow_falls_back_to_zeros() {
        let mut b = UnitBuffers::new(2, 2, 2);
        let src = [-200.0f32; 4];
        let mut dst = [1.0f32; 4];
        let out = unstable_row(&mut b, &src, &mut dst).unwrap();
        assert!(out.degenerate);
        assert_eq!(dst, [0.0; 4]);
    }
}
