// THEORY:
// The `grid` module holds the most fundamental unit of the dashboard: a single
// instantaneous reading of the pressure mat. Like a pixel or a chunk in an image
// pipeline, a `GridSample` is a "dumb" data container. It knows its own shape and
// can summarize itself (how many cells are active), but it knows nothing about
// time, channels, or history.
//
// Key architectural principles:
// 1.  **Fixed Shape**: Every sample carries a `GridShape`. The pipeline checks that
//     the shape never changes during a run, so downstream consumers (heatmaps,
//     percentage metrics) can rely on a constant cell count.
// 2.  **Row-Major Storage**: Cells are stored in a flat `Vec<f64>` for cache-friendly
//     iteration. Rows are exposed as slices when a 2D view is needed, which is how
//     the snapshot transport format expresses the grid.
// 3.  **Immutability**: Once produced, a sample is never mutated. Smoothing creates a
//     new sample from two existing ones.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Reasons a set of values cannot form a grid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("grid must have at least one row and one column")]
    Empty,
    #[error("expected {expected} cells for the grid, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("row {row} has {actual} columns, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        actual: usize,
    },
}

/// The dimensions of a sensor grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridShape {
    pub rows: usize,
    pub cols: usize,
}

impl GridShape {
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    pub const fn cell_count(&self) -> usize {
        self.rows * self.cols
    }
}

impl Default for GridShape {
    /// The 8x6 layout of the reference pressure mat.
    fn default() -> Self {
        Self::new(8, 6)
    }
}

impl std::fmt::Display for GridShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

/// One instantaneous reading of the sensor grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSample {
    shape: GridShape,
    /// Row-major cell values.
    cells: Vec<f64>,
}

impl GridSample {
    /// Builds a sample from row-major values, checking that they fill the shape exactly.
    pub fn from_cells(shape: GridShape, cells: Vec<f64>) -> Result<Self, GridError> {
        if shape.cell_count() == 0 {
            return Err(GridError::Empty);
        }
        if cells.len() != shape.cell_count() {
            return Err(GridError::LengthMismatch {
                expected: shape.cell_count(),
                actual: cells.len(),
            });
        }
        Ok(Self { shape, cells })
    }

    /// Builds a sample from nested rows. Every row must have the same length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, GridError> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        let shape = GridShape::new(rows.len(), cols);
        if shape.cell_count() == 0 {
            return Err(GridError::Empty);
        }

        let mut cells = Vec::with_capacity(shape.cell_count());
        for (row, values) in rows.into_iter().enumerate() {
            if values.len() != cols {
                return Err(GridError::Ragged {
                    row,
                    expected: cols,
                    actual: values.len(),
                });
            }
            cells.extend(values);
        }
        Ok(Self { shape, cells })
    }

    /// A sample where every cell holds `value`.
    pub fn filled(shape: GridShape, value: f64) -> Result<Self, GridError> {
        Self::from_cells(shape, vec![value; shape.cell_count()])
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    pub fn cells(&self) -> &[f64] {
        &self.cells
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.shape.rows || col >= self.shape.cols {
            return None;
        }
        self.cells.get(row * self.shape.cols + col).copied()
    }

    /// Iterates over the grid one row at a time.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.cells.chunks(self.shape.cols)
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.rows().map(<[f64]>::to_vec).collect()
    }

    /// The number of cells whose reading is strictly greater than zero.
    pub fn active_cells(&self) -> usize {
        self.cells.iter().filter(|&&v| v > 0.0).count()
    }

    pub fn is_finite(&self) -> bool {
        self.cells.iter().all(|v| v.is_finite())
    }

    /// Exponential smoothing: `alpha * self + (1 - alpha) * previous`, cell by cell.
    /// Returns `None` when the two samples do not share a shape.
    pub fn blend(&self, previous: &GridSample, alpha: f64) -> Option<GridSample> {
        if self.shape != previous.shape {
            return None;
        }
        let cells = self
            .cells
            .iter()
            .zip(&previous.cells)
            .map(|(new, old)| alpha * new + (1.0 - alpha) * old)
            .collect();
        Some(GridSample {
            shape: self.shape,
            cells,
        })
    }
}

// On the wire a grid is a plain 2D array of numbers.
impl Serialize for GridSample {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.rows())
    }
}

impl<'de> Deserialize<'de> for GridSample {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let rows = Vec::<Vec<f64>>::deserialize(deserializer)?;
        GridSample::from_rows(rows).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_only_strictly_positive_cells() {
        let grid = GridSample::from_rows(vec![
            vec![1.0, 0.0, -3.5],
            vec![0.0001, -0.0, 250.0],
        ])
        .unwrap();
        assert_eq!(grid.active_cells(), 3);
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = GridSample::from_rows(vec![vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert_eq!(
            err,
            GridError::Ragged {
                row: 1,
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn rejects_wrong_cell_count() {
        let err = GridSample::from_cells(GridShape::new(2, 2), vec![1.0; 3]).unwrap_err();
        assert_eq!(
            err,
            GridError::LengthMismatch {
                expected: 4,
                actual: 3
            }
        );
        assert_eq!(GridSample::from_rows(Vec::new()), Err(GridError::Empty));
    }

    #[test]
    fn rows_are_row_major() {
        let grid = GridSample::from_cells(GridShape::new(2, 3), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
            .unwrap();
        assert_eq!(grid.to_rows(), vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        assert_eq!(grid.get(1, 0), Some(4.0));
        assert_eq!(grid.get(2, 0), None);
    }

    #[test]
    fn blend_mixes_with_previous() {
        let shape = GridShape::new(1, 2);
        let new = GridSample::from_cells(shape, vec![10.0, -10.0]).unwrap();
        let old = GridSample::from_cells(shape, vec![0.0, 10.0]).unwrap();

        let half = new.blend(&old, 0.5).unwrap();
        assert_eq!(half.cells(), &[5.0, 0.0]);

        // alpha = 1 discards the previous sample entirely.
        assert_eq!(new.blend(&old, 1.0).unwrap(), new);
        assert!(new.blend(&GridSample::filled(GridShape::new(2, 1), 0.0).unwrap(), 0.5).is_none());
    }
}
