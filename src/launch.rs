// src/launch.rs
use crate::config::TilingPlan;
use crate::error::{Result, SoftmaxError};
use crate::staging::SlotCounts;
use crate::unit::{ComputeUnit, UnitReport, Variant};
use rayon::prelude::*;

/// Aggregate of every unit's report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub units: usize,
    pub rows: usize,
    /// Rows zeroed because their sum of exponentials was not positive.
    pub degenerate_rows: Vec<usize>,
    pub slots: SlotCounts,
    pub slots_free_after: usize,
    /// Slots that were free before the run, summed over units.
    pub slots_total: usize,
}

impl RunReport {
    fn from_units(reports: Vec<UnitReport>, slots_per_unit: usize) -> Self {
        let mut run = RunReport::default();
        for r in reports {
            run.units += 1;
            run.rows += r.rows;
            run.degenerate_rows.extend(r.degenerate_rows);
            run.slots = run.slots.merge(r.slots);
            run.slots_free_after += r.slots_free_after;
            run.slots_total += slots_per_unit;
        }
        run
    }

    /// Every acquired slot came back.
    pub fn is_balanced(&self) -> bool {
        self.slots.acquired == self.slots.released && self.slots_free_after == self.slots_total
    }
}

/// Thread pool plus the plan it was built for.
pub struct Launcher {
    plan: TilingPlan,
    pool: rayon::ThreadPool,
}

impl Launcher {
    pub fn new(plan: TilingPlan) -> Result<Self> {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(plan.unit_count())
            .max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("softmax-unit-{idx}"))
            .build()?;
        tracing::debug!(
            units = plan.unit_count(),
            threads,
            rows_per_unit = plan.rows_per_unit(),
            tile_length = plan.tile_length(),
            buffer_depth = plan.buffer_depth(),
            "launcher ready"
        );
        Ok(Self { plan, pool })
    }

    pub fn plan(&self) -> &TilingPlan {
        &self.plan
    }

    pub fn run(&self, src: &[f32], dst: &mut [f32]) -> Result<RunReport> {
        self.run_variant(Variant::Stabilized, src, dst)
    }

    pub fn run_variant(&self, variant: Variant, src: &[f32], dst: &mut [f32]) -> Result<RunReport> {
        let total = self.plan.total_len();
        if src.len() < total {
            return Err(SoftmaxError::RegionTooSmall { region: "source", required: total, actual: src.len() });
        }
        if dst.len() < total {
            return Err(SoftmaxError::RegionTooSmall {
                region: "destination",
                required: total,
                actual: dst.len(),
            });
        }

        let params = self.plan.launch_params();
        let partition_len = self.plan.partition_len();
        let src = &src[..total];
        let dst = &mut dst[..total];
        let reports = self.pool.install(|| {
            dst.par_chunks_mut(partition_len)
                .enumerate()
                .map(|(unit_index, dst_part)| ComputeUnit::new(unit_index, params).run(variant, src, dst_part))
                .collect::<Result<Vec<_>>>()
        })?;

        let report = RunReport::from_units(reports, 3 * self.plan.buffer_depth());
        tracing::debug!(
            units = report.units,
            rows = report.rows,
            degenerate = report.degenerate_rows.len(),
            ?variant,
            "launch complete"
        );
        Ok(report)
    }

    /// Run over raw byte regions holding native-endian f32 values.
    pub fn run_bytes(&self, src: &[u8], dst: &mut [u8]) -> Result<RunReport> {
        let src: &[f32] = bytemuck::try_cast_slice(src).map_err(SoftmaxError::Misaligned)?;
        let dst: &mut [f32] = bytemuck::try_cast_slice_mut(dst).map_err(SoftmaxError::Misaligned)?;
        self.run(src, dst)
    }
}

/// One-shot launch of the stabilized pipeline.
pub fn launch(plan: &TilingPlan, src: &[f32], dst: &mut [f32]) -> Result<RunReport> {
    Launcher::new(*plan)?.run(src, dst)
}

/// One-shot launch over byte regions.
pub fn launch_bytes(plan: &TilingPlan, src: &[u8], dst: &mut [u8]) -> Result<RunReport> {
    Launcher::new(*plan)?.run_bytes(src, dst)
}
