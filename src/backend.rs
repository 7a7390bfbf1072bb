// src/backend.rs
use anyhow::{Context, Result};

use crate::config::SoftmaxConfig;
use crate::launch::{Launcher, RunReport};
use crate::unit::Variant;

pub trait Softmax {
    /// Row softmax of a `rows × cols` matrix from `src` into `dst`.
    fn softmax_rows(&mut self, rows: usize, cols: usize, src: &[f32], dst: &mut [f32]) -> Result<()>;
}

/// Partitioned, staged pipeline. Keeps its launcher across calls while the
/// matrix shape stays the same.
pub struct TiledBackend {
    config: SoftmaxConfig,
    variant: Variant,
    launcher: Option<Launcher>,
    last_report: Option<RunReport>,
}

impl TiledBackend {
    pub fn new(config: SoftmaxConfig) -> Self {
        Self { config, variant: Variant::Stabilized, launcher: None, last_report: None }
    }

    /// Same launch layout, running the reduce/broadcast variant.
    pub fn unstabilized(config: SoftmaxConfig) -> Self {
        Self { variant: Variant::Unstabilized, ..Self::new(config) }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Report of the most recent successful call.
    pub fn last_report(&self) -> Option<&RunReport> {
        self.last_report.as_ref()
    }

    fn launcher_for(&mut self, rows: usize, cols: usize) -> Result<&Launcher> {
        let config = self.config.with_shape(rows, cols);
        let stale = self.launcher.as_ref().map_or(true, |l| *l.plan().config() != config);
        if stale {
            let plan = config
                .plan()
                .with_context(|| format!("invalid tiling for {rows}x{cols} over {} units", config.unit_count))?;
            self.launcher = Some(Launcher::new(plan).context("start compute units")?);
        }
        self.launcher.as_ref().context("launcher missing after setup")
    }
}

impl Softmax for TiledBackend {
    fn softmax_rows(&mut self, rows: usize, cols: usize, src: &[f32], dst: &mut [f32]) -> Result<()> {
        let variant = self.variant;
        // Degenerate rows are logged per row by their unit; they stay in the report.
        let report = self.launcher_for(rows, cols)?.run_variant(variant, src, dst)?;
        self.last_report = Some(report);
        Ok(())
    }
}

pub enum Backend {
    Cpu(crate::cpu::CpuBackend),
    Tiled(TiledBackend),
}

impl Softmax for Backend {
    fn softmax_rows(&mut self, rows: usize, cols: usize, src: &[f32], dst: &mut [f32]) -> Result<()> {
        match self {
            Backend::Cpu(bk) => bk.softmax_rows(rows, cols, src, dst),
            Backend::Tiled(bk) => bk.softmax_rows(rows, cols, src, dst),
        }
    }
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Cpu(_) => "cpu",
            Backend::Tiled(bk) => match bk.variant() {
                Variant::Stabilized => "tiled",
                Variant::Unstabilized => "vector",
            },
        }
    }

    pub fn last_report(&self) -> Option<&RunReport> {
        match self {
            Backend::Cpu(_) => None,
            Backend::Tiled(bk) => bk.last_report(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiled_backend_replans_when_shape_changes() {
        let mut bk = TiledBackend::new(SoftmaxConfig::default().with_units(2));
        let src = vec![0.5f32; 8 * 8];
        let mut dst = vec![0.0f32; 8 * 8];
        bk.softmax_rows(8, 8, &src, &mut dst).unwrap();
        assert_eq!(bk.launcher.as_ref().unwrap().plan().row_width(), 8);
        assert_eq!(bk.last_report().unwrap().rows, 8);

        bk.softmax_rows(4, 16, &src, &mut dst).unwrap();
        let plan = *bk.launcher.as_ref().unwrap().plan();
        assert_eq!((plan.total_rows(), plan.row_width()), (4, 16));
        assert!(dst.iter().all(|&v| (v - 1.0 / 16.0).abs() < 1e-7));
    }

    #[test]
    fn degenerate_rows_land_in_the_last_report() {
        let mut bk = TiledBackend::new(SoftmaxConfig::default().with_units(2));
        let mut src = vec![0.0f32; 4 * 8];
        src[8..16].fill(f32::NEG_INFINITY);
        let mut dst = vec![1.0f32; 4 * 8];
        bk.softmax_rows(4, 8, &src, &mut dst).unwrap();
        assert_eq!(bk.last_report().unwrap().degenerate_rows, vec![1]);
        assert_eq!(&dst[8..16], &[0.0; 8]);
    }

    #[test]
    fn invalid_shape_surfaces_config_error() {
        let mut bk = Backend::Tiled(TiledBackend::new(SoftmaxConfig::default()));
        let src = vec![0.0f32; 3 * 10];
        let mut dst = vec![0.0f32; 3 * 10];
        let err = bk.softmax_rows(3, 10, &src, &mut dst).unwrap_err();
        assert!(format!("{err:#}").contains("invalid tiling for 3x10"));
    }
}
