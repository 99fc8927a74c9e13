use serde::{Deserialize, Serialize};

/// A point in map units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// Inclusive rectangular window of cells, `[row_min, col_min]..=[row_max, col_max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    pub row_min: usize,
    pub col_min: usize,
    pub row_max: usize,
    pub col_max: usize,
}

impl Bounds {
    pub fn new(row_min: usize, col_min: usize, row_max: usize, col_max: usize) -> Self {
        Self {
            row_min,
            col_min,
            row_max,
            col_max,
        }
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.row_min && row <= self.row_max && col >= self.col_min && col <= self.col_max
    }

    pub fn on_border(&self, row: usize, col: usize) -> bool {
        row == self.row_min || row == self.row_max || col == self.col_min || col == self.col_max
    }

    pub fn cell_count(&self) -> usize {
        (self.row_max - self.row_min + 1) * (self.col_max - self.col_min + 1)
    }
}
