use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellType {
    Path,
    Wall,
    Start,
    Goal,
}

/// A ray-cast result: start point, end point, and the actual (unnormalized) distance
/// traveled before hitting a wall, the max range, or the maze boundary (§4.4).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub start: (f64, f64),
    pub end: (f64, f64),
    pub distance: f64,
}

/// A rectangular grid of odd width and height, generated once by recursive backtracking and
/// immutable thereafter (§3, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Maze {
    pub width: usize,
    pub height: usize,
    pub seed: u64,
    grid: Vec<Vec<CellType>>,
    pub start: (usize, usize),
    pub goal: (usize, usize),
}

const RAY_STEP: f64 = 0.1;

impl Maze {
    /// Generates a maze of the given dimensions. `seed` is used verbatim if given, otherwise
    /// one is drawn and recorded so the exact maze can be reconstructed later (§4.4).
    pub fn generate(width: usize, height: usize, seed: Option<u64>) -> Result<Self, ConfigError> {
        if width % 2 == 0 || width < 5 {
            return Err(ConfigError::InvalidMazeDimension(width));
        }
        if height % 2 == 0 || height < 5 {
            return Err(ConfigError::InvalidMazeDimension(height));
        }

        let seed = seed.unwrap_or_else(|| rand::rng().random());
        let mut rng = StdRng::seed_from_u64(seed);

        let mut grid = vec![vec![CellType::Wall; width]; height];
        let start_r = rng.random_range(0..(height / 2)) * 2 + 1;
        let start_c = rng.random_range(0..(width / 2)) * 2 + 1;
        Self::carve(&mut grid, start_r, start_c, &mut rng);

        let start = (1usize, 1usize);
        let goal = (height - 2, width - 2);
        if grid[start.0][start.1] == CellType::Wall {
            grid[start.0][start.1] = CellType::Path;
        }
        if grid[goal.0][goal.1] == CellType::Wall {
            grid[goal.0][goal.1] = CellType::Path;
        }
        grid[start.0][start.1] = CellType::Start;
        grid[goal.0][goal.1] = CellType::Goal;

        Ok(Maze {
            width,
            height,
            seed,
            grid,
            start,
            goal,
        })
    }

    fn carve(grid: &mut [Vec<CellType>], r: usize, c: usize, rng: &mut StdRng) {
        grid[r][c] = CellType::Path;
        let height = grid.len() as isize;
        let width = grid[0].len() as isize;

        let mut neighbors: Vec<(isize, isize)> = vec![
            (r as isize - 2, c as isize),
            (r as isize + 2, c as isize),
            (r as isize, c as isize - 2),
            (r as isize, c as isize + 2),
        ];
        // Fisher-Yates shuffle via rand's slice shuffle.
        use rand::seq::SliceRandom;
        neighbors.shuffle(rng);

        for (nr, nc) in neighbors {
            if nr < 0 || nr >= height || nc < 0 || nc >= width {
                continue;
            }
            let (nr, nc) = (nr as usize, nc as usize);
            if grid[nr][nc] != CellType::Wall {
                continue;
            }
            let wall_r = (r as isize + (nr as isize - r as isize) / 2) as usize;
            let wall_c = (c as isize + (nc as isize - c as isize) / 2) as usize;
            grid[wall_r][wall_c] = CellType::Path;
            Self::carve(grid, nr, nc, rng);
        }
    }

    fn in_bounds(&self, r: isize, c: isize) -> bool {
        r >= 0 && (r as usize) < self.height && c >= 0 && (c as usize) < self.width
    }

    pub fn cell_type(&self, r: isize, c: isize) -> CellType {
        if self.in_bounds(r, c) {
            self.grid[r as usize][c as usize]
        } else {
            CellType::Wall
        }
    }

    /// Walkability is cell-wise; positions inside Wall cells or outside the grid are not
    /// walkable (§4.4). `x`/`y` are continuous maze coordinates.
    pub fn is_walkable(&self, x: f64, y: f64) -> bool {
        if x < 0.0 || y < 0.0 {
            return false;
        }
        self.cell_type(y as isize, x as isize) != CellType::Wall
    }

    pub fn diagonal(&self) -> f64 {
        ((self.width * self.width + self.height * self.height) as f64).sqrt()
    }

    /// A ray from `(x,y)` under heading `angle`, advancing in `RAY_STEP`-sized steps, stopping
    /// at the first Wall cell, the maze boundary, or `max_dist` (§4.4).
    pub fn cast_ray(&self, origin: (f64, f64), angle: f64, max_dist: f64) -> RayHit {
        let (dx, dy) = (angle.cos(), angle.sin());
        let mut traveled = 0.0;
        let mut point = origin;

        while traveled < max_dist {
            let next = (point.0 + dx * RAY_STEP, point.1 + dy * RAY_STEP);
            if !self.is_walkable(next.0, next.1) {
                break;
            }
            point = next;
            traveled += RAY_STEP;
        }

        RayHit {
            start: origin,
            end: point,
            distance: traveled.min(max_dist),
        }
    }

    /// Plain-text rendering for diagnostics and test failure messages (§4.4); not used by the
    /// evolutionary algorithm itself.
    pub fn display(&self) -> String {
        let mut out = String::with_capacity(self.height * (self.width + 1));
        for row in &self.grid {
            for cell in row {
                out.push(match cell {
                    CellType::Path => '.',
                    CellType::Wall => '#',
                    CellType::Start => 'S',
                    CellType::Goal => 'G',
                });
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[test]
    fn start_and_goal_are_walkable() {
        let maze = Maze::generate(11, 11, Some(42)).unwrap();
        assert!(maze.is_walkable(maze.start.1 as f64 + 0.5, maze.start.0 as f64 + 0.5));
        assert!(maze.is_walkable(maze.goal.1 as f64 + 0.5, maze.goal.0 as f64 + 0.5));
    }

    #[test]
    fn every_path_cell_is_reachable_from_start() {
        let maze = Maze::generate(15, 15, Some(7)).unwrap();
        let mut visited = vec![vec![false; maze.width]; maze.height];
        let mut queue = VecDeque::new();
        queue.push_back(maze.start);
        visited[maze.start.0][maze.start.1] = true;

        while let Some((r, c)) = queue.pop_front() {
            for (nr, nc) in [
                (r as isize - 1, c as isize),
                (r as isize + 1, c as isize),
                (r as isize, c as isize - 1),
                (r as isize, c as isize + 1),
            ] {
                if nr < 0 || nc < 0 || nr as usize >= maze.height || nc as usize >= maze.width {
                    continue;
                }
                let (nr, nc) = (nr as usize, nc as usize);
                if visited[nr][nc] || maze.cell_type(nr as isize, nc as isize) == CellType::Wall {
                    continue;
                }
                visited[nr][nc] = true;
                queue.push_back((nr, nc));
            }
        }

        for r in 0..maze.height {
            for c in 0..maze.width {
                if maze.cell_type(r as isize, c as isize) != CellType::Wall {
                    assert!(visited[r][c], "unreachable path cell at ({r},{c})\n{}", maze.display());
                }
            }
        }
    }

    #[test]
    fn rejects_even_dimensions() {
        assert!(matches!(
            Maze::generate(10, 11, Some(1)),
            Err(ConfigError::InvalidMazeDimension(10))
        ));
    }

    #[test]
    fn rejects_too_small_dimensions() {
        assert!(matches!(
            Maze::generate(3, 11, Some(1)),
            Err(ConfigError::InvalidMazeDimension(3))
        ));
    }

    #[test]
    fn same_seed_reproduces_identical_maze() {
        let a = Maze::generate(11, 11, Some(123)).unwrap();
        let b = Maze::generate(11, 11, Some(123)).unwrap();
        assert_eq!(a.display(), b.display());
    }
}
