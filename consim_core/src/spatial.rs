//! Uniform-grid spatial bucketing for neighbour queries.
//!
//! Candidate pairs come out in a fixed order (by first index, then second),
//! so float accumulation over them is reproducible regardless of how the
//! hash map happens to iterate.

use nalgebra::Vector2;
use std::collections::HashMap;

type Cell = (i64, i64);

/// Point indices bucketed into square cells of side `cell_size`.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: f64,
    cells: HashMap<Cell, Vec<usize>>,
    points: Vec<Vector2<f64>>,
}

impl SpatialGrid {
    /// Buckets `points`; indices refer to positions in the slice.
    pub fn build(points: &[Vector2<f64>], cell_size: f64) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 { cell_size } else { 1.0 };
        let mut cells: HashMap<Cell, Vec<usize>> = HashMap::new();
        for (i, p) in points.iter().enumerate() {
            cells.entry(Self::cell_of(p, cell_size)).or_default().push(i);
        }
        Self {
            cell_size,
            cells,
            points: points.to_vec(),
        }
    }

    fn cell_of(p: &Vector2<f64>, cell_size: f64) -> Cell {
        ((p.x / cell_size).floor() as i64, (p.y / cell_size).floor() as i64)
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// All index pairs `(i, j)` with `i < j` in the same or adjacent cells.
    ///
    /// Every pair closer than `cell_size` is included.
    pub fn candidate_pairs(&self) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        let mut neighbours = Vec::new();

        for (i, p) in self.points.iter().enumerate() {
            let (cx, cy) = Self::cell_of(p, self.cell_size);
            neighbours.clear();
            for dx in -1..=1 {
                for dy in -1..=1 {
                    let key = (cx.saturating_add(dx), cy.saturating_add(dy));
                    if let Some(bucket) = self.cells.get(&key) {
                        neighbours.extend(bucket.iter().copied().filter(|&j| j > i));
                    }
                }
            }
            neighbours.sort_unstable();
            // Saturated cells at the i64 limits can alias
            neighbours.dedup();
            pairs.extend(neighbours.iter().map(|&j| (i, j)));
        }

        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_pairs_cover_close_points() {
        let points = vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(9.0, 0.0),
            Vector2::new(-5.0, -5.0),
            Vector2::new(100.0, 100.0),
        ];
        let grid = SpatialGrid::build(&points, 10.0);
        let pairs = grid.candidate_pairs();

        assert!(pairs.contains(&(0, 1)));
        assert!(pairs.contains(&(0, 2)));
        assert!(pairs.contains(&(1, 2)));
        assert!(pairs.iter().all(|&(i, j)| i < j && i != 3 && j != 3));
    }

    #[test]
    fn test_candidate_pairs_brute_force_agreement() {
        let points: Vec<Vector2<f64>> = (0..60)
            .map(|i| {
                let t = i as f64;
                Vector2::new((t * 37.0) % 200.0 - 100.0, (t * 53.0) % 200.0 - 100.0)
            })
            .collect();
        let radius = 25.0;
        let grid = SpatialGrid::build(&points, radius);
        let pairs = grid.candidate_pairs();

        for i in 0..points.len() {
            for j in (i + 1)..points.len() {
                if (points[i] - points[j]).norm() < radius {
                    assert!(pairs.contains(&(i, j)), "missing pair ({i}, {j})");
                }
            }
        }
    }

    #[test]
    fn test_degenerate_cell_size() {
        let grid = SpatialGrid::build(&[Vector2::new(0.5, 0.5)], 0.0);
        assert_eq!(grid.cell_size(), 1.0);
        assert!(grid.candidate_pairs().is_empty());
    }
}
