// src/cpu.rs
use crate::backend::Softmax;
use anyhow::{ensure, Context, Result};

/// Single-unit row softmax straight over the full rows, no staging. Serves
/// as the reference the partitioned backends are checked against.
#[derive(Debug, Default)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Softmax for CpuBackend {
    fn softmax_rows(&mut self, rows: usize, cols: usize, src: &[f32], dst: &mut [f32]) -> Result<()> {
        let n = rows.checked_mul(cols).with_context(|| format!("{rows}x{cols} matrix overflows usize"))?;
        ensure!(cols > 0, "row width must be non-zero");
        ensure!(src.len() >= n && dst.len() >= n, "buffers shorter than {rows}x{cols}");

        for (x, out) in src[..n].chunks_exact(cols).zip(dst[..n].chunks_exact_mut(cols)) {
            let maxv = x.iter().copied().fold(f32::MIN, |m, v| if v > m { v } else { m });
            let mut sum = 0.0f32;
            for (o, &v) in out.iter_mut().zip(x) {
                *o = (v - maxv).exp();
                sum += *o;
            }
            if sum > 0.0 && sum.is_finite() {
                let inv = 1.0 / sum;
                for o in out.iter_mut() {
                    *o *= inv;
                }
            } else {
                out.fill(0.0);
            }
        }
        Ok(())
    }
}
