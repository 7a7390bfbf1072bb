// src/config.rs
use crate::error::ConfigError;
use bytemuck::{Pod, Zeroable};
use std::ops::Range;

/// User-facing launch configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftmaxConfig {
    /// Rows in the backing matrix.
    pub total_rows: usize,
    /// Elements per row (the softmax axis).
    pub row_width: usize,
    /// Number of parallel compute units.
    pub unit_count: usize,
    /// Tiles per row per buffer slot.
    pub tile_factor: usize,
    /// Slots per working queue. 2 = double buffering.
    pub buffer_depth: usize,
}

impl Default for SoftmaxConfig {
    fn default() -> Self {
        Self::matrix_64()
    }
}

impl SoftmaxConfig {
    /// 64×64 matrix over 16 units, four rows each.
    pub fn matrix_64() -> Self {
        Self {
            total_rows: 64,
            row_width: 64,
            unit_count: 16,
            tile_factor: 2,
            buffer_depth: 2,
        }
    }

    /// 96×96 matrix, one row per unit.
    pub fn matrix_96() -> Self {
        Self {
            total_rows: 96,
            row_width: 96,
            unit_count: 96,
            tile_factor: 1,
            buffer_depth: 2,
        }
    }

    /// Flat vector normalised independently in blocks of `block_len`.
    pub fn vector_blocks(total_len: usize, block_len: usize, unit_count: usize) -> Result<Self, ConfigError> {
        if block_len == 0 {
            return Err(ConfigError::Zero { field: "row_width" });
        }
        if total_len % block_len != 0 {
            return Err(ConfigError::VectorNotDivisible { total_len, block_len });
        }
        Ok(Self {
            total_rows: total_len / block_len,
            row_width: block_len,
            unit_count,
            tile_factor: 2,
            buffer_depth: 2,
        })
    }

    pub fn with_shape(mut self, total_rows: usize, row_width: usize) -> Self {
        self.total_rows = total_rows;
        self.row_width = row_width;
        self
    }

    pub fn with_units(mut self, unit_count: usize) -> Self {
        self.unit_count = unit_count;
        self
    }

    pub fn with_tile_factor(mut self, tile_factor: usize) -> Self {
        self.tile_factor = tile_factor;
        self
    }

    pub fn with_buffer_depth(mut self, buffer_depth: usize) -> Self {
        self.buffer_depth = buffer_depth;
        self
    }

    /// Validate and derive all sizes.
    pub fn plan(&self) -> Result<TilingPlan, ConfigError> {
        for (field, value) in [
            ("total_rows", self.total_rows),
            ("row_width", self.row_width),
            ("unit_count", self.unit_count),
            ("tile_factor", self.tile_factor),
            ("buffer_depth", self.buffer_depth),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }
        if self.total_rows % self.unit_count != 0 {
            return Err(ConfigError::RowsNotDivisible {
                total_rows: self.total_rows,
                unit_count: self.unit_count,
            });
        }
        let tiles_per_row = self
            .tile_factor
            .checked_mul(self.buffer_depth)
            .ok_or(ConfigError::ProductOverflow {
                field: "tiles_per_row",
                lhs: self.tile_factor,
                rhs: self.buffer_depth,
            })?;
        if self.row_width % tiles_per_row != 0 {
            return Err(ConfigError::RowNotDivisible {
                row_width: self.row_width,
                tile_factor: self.tile_factor,
                buffer_depth: self.buffer_depth,
            });
        }
        let total_len = self
            .total_rows
            .checked_mul(self.row_width)
            .ok_or(ConfigError::ProductOverflow {
                field: "total_len",
                lhs: self.total_rows,
                rhs: self.row_width,
            })?;
        let plan = TilingPlan {
            config: *self,
            rows_per_unit: self.total_rows / self.unit_count,
            tiles_per_row,
            tile_length: self.row_width / tiles_per_row,
            total_len,
        };
        // Every derived size must survive the trip through `LaunchParams`.
        for (field, value) in [
            ("total_rows", plan.config.total_rows),
            ("row_width", plan.config.row_width),
            ("unit_count", plan.config.unit_count),
            ("total_len", plan.total_len),
        ] {
            if u32::try_from(value).is_err() {
                return Err(ConfigError::Overflow { field, value });
            }
        }
        Ok(plan)
    }
}

/// Validated configuration with derived sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilingPlan {
    config: SoftmaxConfig,
    rows_per_unit: usize,
    tiles_per_row: usize,
    tile_length: usize,
    total_len: usize,
}

impl TilingPlan {
    pub fn config(&self) -> &SoftmaxConfig {
        &self.config
    }

    pub fn unit_count(&self) -> usize {
        self.config.unit_count
    }

    pub fn row_width(&self) -> usize {
        self.config.row_width
    }

    pub fn total_rows(&self) -> usize {
        self.config.total_rows
    }

    pub fn buffer_depth(&self) -> usize {
        self.config.buffer_depth
    }

    pub fn rows_per_unit(&self) -> usize {
        self.rows_per_unit
    }

    pub fn tiles_per_row(&self) -> usize {
        self.tiles_per_row
    }

    pub fn tile_length(&self) -> usize {
        self.tile_length
    }

    /// Elements in the whole backing buffer.
    pub fn total_len(&self) -> usize {
        self.total_len
    }

    /// Elements owned by one unit.
    pub fn partition_len(&self) -> usize {
        self.rows_per_unit * self.config.row_width
    }

    pub fn partition(&self, unit_index: usize) -> Partition {
        let length = self.partition_len();
        Partition { unit_index, start_offset: length * unit_index, length }
    }

    pub fn partitions(&self) -> impl Iterator<Item = Partition> + '_ {
        (0..self.unit_count()).map(|i| self.partition(i))
    }

    pub fn launch_params(&self) -> LaunchParams {
        // `plan()` checked that every field fits in u32.
        LaunchParams {
            total_rows: self.config.total_rows as u32,
            row_width: self.config.row_width as u32,
            unit_count: self.config.unit_count as u32,
            rows_per_unit: self.rows_per_unit as u32,
            tile_length: self.tile_length as u32,
            tiles_per_row: self.tiles_per_row as u32,
            buffer_depth: self.config.buffer_depth as u32,
            _pad: 0,
        }
    }
}

/// Contiguous slice of the backing buffer owned by one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub unit_index: usize,
    pub start_offset: usize,
    pub length: usize,
}

impl Partition {
    pub fn range(&self) -> Range<usize> {
        self.start_offset..self.start_offset + self.length
    }
}

/// Flat parameter block handed to every unit at launch.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Zeroable, Pod)]
pub struct LaunchParams {
    pub total_rows: u32,
    pub row_width: u32,
    pub unit_count: u32,
    pub rows_per_unit: u32,
    pub tile_length: u32,
    pub tiles_per_row: u32,
    pub buffer_depth: u32,
    _pad: u32,
}

impl LaunchParams {
    /// Partition of the unit with ordinal `unit_index`.
    pub fn partition_for(&self, unit_index: usize) -> Partition {
        let length = self.row_width as usize * self.rows_per_unit as usize;
        Partition { unit_index, start_offset: length * unit_index, length }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_plan_matches_reference_deployment() {
        let plan = SoftmaxConfig::default().plan().unwrap();
        assert_eq!(plan.rows_per_unit(), 4);
        assert_eq!(plan.tiles_per_row(), 4);
        assert_eq!(plan.tile_length(), 16);
        assert_eq!(plan.partition_len(), 256);
        assert_eq!(plan.partition(3).start_offset, 768);
    }

    #[test]
    fn matrix_96_gives_one_row_per_unit() {
        let plan = SoftmaxConfig::matrix_96().plan().unwrap();
        assert_eq!(plan.rows_per_unit(), 1);
        assert_eq!(plan.tile_length(), 48);
    }

    #[test]
    fn vector_blocks_reshapes_flat_input() {
        let plan = SoftmaxConfig::vector_blocks(16384, 2048, 8).unwrap().plan().unwrap();
        assert_eq!(plan.total_rows(), 8);
        assert_eq!(plan.rows_per_unit(), 1);
        assert_eq!(plan.tile_length(), 512);
    }

    #[test]
    fn rejects_non_dividing_row() {
        let err = SoftmaxConfig::default().with_shape(64, 30).plan().unwrap_err();
        assert!(matches!(err, ConfigError::RowNotDivisible { row_width: 30, .. }));
    }

    #[test]
    fn rejects_uneven_unit_split() {
        let err = SoftmaxConfig::default().with_units(5).plan().unwrap_err();
        assert_eq!(err, ConfigError::RowsNotDivisible { total_rows: 64, unit_count: 5 });
    }

    #[test]
    fn rejects_zero_sizes() {
        let err = SoftmaxConfig::default().with_shape(64, 0).plan().unwrap_err();
        assert_eq!(err, ConfigError::Zero { field: "row_width" });
        let err = SoftmaxConfig::default().with_buffer_depth(0).plan().unwrap_err();
        assert_eq!(err, ConfigError::Zero { field: "buffer_depth" });
        let err = SoftmaxConfig::vector_blocks(100, 0, 1).unwrap_err();
        assert!(matches!(err, ConfigError::Zero { .. }));
        let err = SoftmaxConfig::vector_blocks(100, 30, 1).unwrap_err();
        assert_eq!(err, ConfigError::VectorNotDivisible { total_len: 100, block_len: 30 });
    }

    #[test]
    fn overflowing_products_report_their_operands() {
        let err = SoftmaxConfig::default().with_tile_factor(usize::MAX).plan().unwrap_err();
        assert_eq!(err, ConfigError::ProductOverflow { field: "tiles_per_row", lhs: usize::MAX, rhs: 2 });
        let err = SoftmaxConfig::default().with_shape(usize::MAX, 4).with_units(1).plan().unwrap_err();
        assert_eq!(err, ConfigError::ProductOverflow { field: "total_len", lhs: usize::MAX, rhs: 4 });
        assert!(err.to_string().contains("overflows usize"));
    }

    #[test]
    fn partitions_tile_the_buffer_without_overlap() {
        let plan = SoftmaxConfig::default().plan().unwrap();
        let mut next = 0;
        for p in plan.partitions() {
            assert_eq!(p.start_offset, next);
            next = p.range().end;
        }
        assert_eq!(next, plan.total_len());
    }

    #[test]
    fn launch_params_agree_with_plan() {
        let plan = SoftmaxConfig::default().plan().unwrap();
        let params = plan.launch_params();
        assert_eq!(params.as_bytes().len(), 32);
        for p in plan.partitions() {
            assert_eq!(params.partition_for(p.unit_index), p);
        }
    }
}
