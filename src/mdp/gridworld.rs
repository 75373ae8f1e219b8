//! Grid environment: a `height × width` lattice with walls.

use ndarray::{Array2, ArrayView1};

use crate::{Error, Result};

/// Moves available in every cell. Blocked moves leave the agent in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GridMove {
    Stay,
    North,
    South,
    East,
    West,
}

impl GridMove {
    pub const ALL: [GridMove; 5] = [
        GridMove::Stay,
        GridMove::North,
        GridMove::South,
        GridMove::East,
        GridMove::West,
    ];

    fn offset(self) -> (isize, isize) {
        match self {
            GridMove::Stay => (0, 0),
            GridMove::North => (-1, 0),
            GridMove::South => (1, 0),
            GridMove::East => (0, 1),
            GridMove::West => (0, -1),
        }
    }
}

/// Lattice MDP. States are cells in row-major order; `features` has one row per cell.
#[derive(Debug, Clone)]
pub struct GridworldMdp {
    height: usize,
    width: usize,
    walls: Vec<bool>,
    features: Array2<f64>,
    start: (usize, usize),
}

impl GridworldMdp {
    pub fn new(
        height: usize,
        width: usize,
        walls: Vec<bool>,
        features: Array2<f64>,
        start: (usize, usize),
    ) -> Result<Self> {
        let cells = height * width;
        if cells == 0 {
            return Err(Error::InvalidMdp {
                message: "grid must have at least one cell".to_string(),
            });
        }
        if walls.len() != cells {
            return Err(Error::DimensionMismatch {
                context: "grid wall mask".to_string(),
                expected: cells,
                got: walls.len(),
            });
        }
        if features.nrows() != cells {
            return Err(Error::DimensionMismatch {
                context: "grid feature rows".to_string(),
                expected: cells,
                got: features.nrows(),
            });
        }
        if start.0 >= height || start.1 >= width {
            return Err(Error::InvalidMdp {
                message: format!("start {start:?} lies outside a {height}x{width} grid"),
            });
        }
        if walls[start.0 * width + start.1] {
            return Err(Error::InvalidMdp {
                message: format!("start {start:?} is a wall"),
            });
        }
        Ok(Self {
            height,
            width,
            walls,
            features,
            start,
        })
    }

    /// Grid whose feature `i` at a cell is `exp(-dist_scale * manhattan(cell, goals[i]))`.
    pub fn with_distance_features(
        height: usize,
        width: usize,
        walls: Vec<bool>,
        goals: &[(usize, usize)],
        start: (usize, usize),
        dist_scale: f64,
    ) -> Result<Self> {
        if goals.is_empty() {
            return Err(Error::InvalidMdp {
                message: "distance features need at least one goal".to_string(),
            });
        }
        let mut features = Array2::zeros((height * width, goals.len()));
        for row in 0..height {
            for col in 0..width {
                let state = row * width + col;
                for (i, &(goal_row, goal_col)) in goals.iter().enumerate() {
                    let distance = row.abs_diff(goal_row) + col.abs_diff(goal_col);
                    features[[state, i]] = (-dist_scale * distance as f64).exp();
                }
            }
        }
        Self::new(height, width, walls, features, start)
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn num_states(&self) -> usize {
        self.height * self.width
    }

    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    pub fn feature(&self, state: usize) -> ArrayView1<'_, f64> {
        self.features.row(state)
    }

    pub fn start(&self) -> (usize, usize) {
        self.start
    }

    pub fn start_state(&self) -> usize {
        self.state_index(self.start.0, self.start.1)
    }

    pub fn state_index(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }

    pub fn is_wall(&self, state: usize) -> bool {
        self.walls[state]
    }

    /// Cell reached by taking `mv` in `state`; walls and edges block the move.
    pub fn next_state(&self, state: usize, mv: GridMove) -> usize {
        let (row, col) = (state / self.width, state % self.width);
        let (dr, dc) = mv.offset();
        let (Some(next_row), Some(next_col)) =
            (row.checked_add_signed(dr), col.checked_add_signed(dc))
        else {
            return state;
        };
        if next_row >= self.height || next_col >= self.width {
            return state;
        }
        let next = self.state_index(next_row, next_col);
        if self.walls[next] { state } else { next }
    }
}
