use std::ops::Range;
use std::time::Instant;

use anyhow::{ensure, Result};
use clap::{Parser, ValueEnum};
use rand::{rngs::StdRng, Rng, SeedableRng};
use staged_softmax::{Backend, CpuBackend, Softmax, SoftmaxConfig, TiledBackend, TilingPlan};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum VariantArg {
    /// Max-subtracted three-pass pipeline
    Tiled,
    /// Reduce/broadcast pipeline without max subtraction
    Vector,
}

/// Run the partitioned softmax on random input and compare it with the
/// single-unit reference.
#[derive(Parser, Debug)]
#[command(name = "staged-softmax")]
#[command(version)]
struct Args {
    /// Rows in the matrix
    #[arg(long, default_value_t = 64)]
    rows: usize,

    /// Elements per row
    #[arg(long, default_value_t = 64)]
    row_width: usize,

    /// Parallel compute units
    #[arg(long, default_value_t = 16)]
    units: usize,

    /// Tiles per row per buffer slot
    #[arg(long, default_value_t = 2)]
    tile_factor: usize,

    /// Slots per working queue (2 = double buffering)
    #[arg(long, default_value_t = 2)]
    buffer_depth: usize,

    /// RNG seed for the input
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Lower bound of the uniform input range
    #[arg(long, default_value_t = -5.0, allow_hyphen_values = true)]
    low: f32,

    /// Upper bound of the uniform input range
    #[arg(long, default_value_t = 5.0, allow_hyphen_values = true)]
    high: f32,

    #[arg(long, value_enum, default_value_t = VariantArg::Tiled)]
    variant: VariantArg,
}

/// Uniform input sized from a validated plan, so an oversized shape fails in
/// `plan()` before anything is allocated.
fn random_input(plan: &TilingPlan, seed: u64, range: Range<f32>) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..plan.total_len()).map(|_| rng.gen_range(range.clone())).collect()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    ensure!(args.low < args.high, "--low must be below --high");
    let rows = args.rows;
    let cols = args.row_width;

    let config = SoftmaxConfig::default()
        .with_shape(rows, cols)
        .with_units(args.units)
        .with_tile_factor(args.tile_factor)
        .with_buffer_depth(args.buffer_depth);
    let plan = config.plan()?;
    println!(
        "Matrix {rows}x{cols}: {} units x {} rows, tile {} x {} per row, depth {}",
        plan.unit_count(),
        plan.rows_per_unit(),
        plan.tile_length(),
        plan.tiles_per_row(),
        plan.buffer_depth()
    );

    let data = random_input(&plan, args.seed, args.low..args.high);

    let mut cpu = Backend::Cpu(CpuBackend::new());
    let mut staged = Backend::Tiled(match args.variant {
        VariantArg::Tiled => TiledBackend::new(config),
        VariantArg::Vector => TiledBackend::unstabilized(config),
    });

    let mut z_cpu = vec![0.0f32; data.len()];
    let mut z_staged = vec![0.0f32; data.len()];

    let t0 = Instant::now();
    cpu.softmax_rows(rows, cols, &data, &mut z_cpu)?;
    println!("{} softmax: {:.3} ms", cpu.name(), t0.elapsed().as_secs_f64() * 1e3);

    let t1 = Instant::now();
    staged.softmax_rows(rows, cols, &data, &mut z_staged)?;
    println!("{} softmax: {:.3} ms", staged.name(), t1.elapsed().as_secs_f64() * 1e3);

    if let Some(report) = staged.last_report() {
        println!(
            "Slots: {} acquired, {} released, degenerate rows: {}",
            report.slots.acquired,
            report.slots.released,
            report.degenerate_rows.len()
        );
    }

    let diff = z_cpu.iter().zip(&z_staged).map(|(a, b)| (a - b).abs()).fold(0.0, f32::max);
    println!("Max abs diff: {:.6}", diff);
    let worst_row = z_staged
        .chunks_exact(cols)
        .map(|row| (row.iter().sum::<f32>() - 1.0).abs())
        .fold(0.0, f32::max);
    println!("Max |row sum - 1|: {:.6}", worst_row);
    Ok(())
}
