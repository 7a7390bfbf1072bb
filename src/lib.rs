//! Row softmax over a matrix held in one flat `f32` buffer, split across
//! independent compute units.
//!
//! Each unit owns `rows_per_unit` consecutive rows and streams them through
//! small double-buffered tile queues in three passes per row: max-find,
//! `exp(x - max)` plus sum (cached in the destination), and normalisation.
//!
//! ```
//! use staged_softmax::{launch, SoftmaxConfig};
//!
//! let plan = SoftmaxConfig::default().with_shape(2, 4).with_units(2).with_tile_factor(1).plan()?;
//! let src = [1.0f32, 2.0, 3.0, 4.0, 5.0, 5.0, 5.0, 5.0];
//! let mut dst = [0.0f32; 8];
//! let report = launch(&plan, &src, &mut dst)?;
//! assert!(report.is_balanced());
//! assert_eq!(&dst[4..], &[0.25; 4]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backend;
pub mod config;
pub mod cpu;
pub mod error;
pub mod launch;
pub mod ops;
pub mod phases;
pub mod staging;
pub mod unit;
pub mod vector;

pub use backend::{Backend, Softmax, TiledBackend};
pub use config::{LaunchParams, Partition, SoftmaxConfig, TilingPlan};
pub use cpu::CpuBackend;
pub use error::{ConfigError, SoftmaxError, StagingError};
pub use launch::{launch, launch_bytes, Launcher, RunReport};
pub use unit::{ComputeUnit, Variant};
