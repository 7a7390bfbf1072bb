// src/error.rs
use thiserror::Error;

/// Static tiling configuration rejected before launch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{field} must be non-zero")]
    Zero { field: &'static str },
    #[error("total_rows ({total_rows}) is not divisible by unit_count ({unit_count})")]
    RowsNotDivisible { total_rows: usize, unit_count: usize },
    #[error(
        "row_width ({row_width}) is not divisible by tile_factor * buffer_depth ({tile_factor} * {buffer_depth})"
    )]
    RowNotDivisible {
        row_width: usize,
        tile_factor: usize,
        buffer_depth: usize,
    },
    #[error("vector of {total_len} elements is not a whole number of {block_len}-element blocks")]
    VectorNotDivisible { total_len: usize, block_len: usize },
    #[error("{field} ({value}) does not fit the 32-bit launch parameter block")]
    Overflow { field: &'static str, value: usize },
    #[error("{field} = {lhs} * {rhs} overflows usize")]
    ProductOverflow { field: &'static str, lhs: usize, rhs: usize },
}

/// Misuse of a unit's working-buffer queues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StagingError {
    #[error("tile transfer of {actual} elements into a {expected}-element slot")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("slot of the {queue} queue enqueued before its copy-in completed")]
    NotFilled { queue: &'static str },
    #[error("all {depth} slots of the {queue} queue are in flight")]
    Exhausted { queue: &'static str, depth: usize },
}

#[derive(Debug, Error)]
pub enum SoftmaxError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Staging(#[from] StagingError),
    #[error("{region} region holds {actual} elements, launch needs {required}")]
    RegionTooSmall {
        region: &'static str,
        required: usize,
        actual: usize,
    },
    #[error("byte region is not a whole, 4-byte aligned run of f32: {0}")]
    Misaligned(bytemuck::PodCastError),
    #[error("failed to build compute-unit thread pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("row {row} of unit {unit} accumulated a non-finite sum of exponentials")]
    NonFiniteSum { unit: usize, row: usize },
}

pub type Result<T, E = SoftmaxError> = std::result::Result<T, E>;
