//! Shared obstacle map and the threshold merge that feeds it.
//!
//! The occupancy grid holds continuous evidence; the obstacle map holds the
//! discrete verdicts a planner consumes.  The two are written in separate
//! phases: fusion only touches the [`OccupancyGrid`], [`merge`] only reads it.
//!
//! | layer cell | resolves to |
//! |---|---|
//! | [`PRIOR_COST`] | skipped |
//! | `> to_cost(mark_threshold)` | [`LETHAL_OBSTACLE`] |
//! | `< to_cost(clear_threshold)` | [`FREE_SPACE`] |
//! | anything else | skipped |
//!
//! A resolved value is written only if the master cell is
//! [`NO_INFORMATION`] or holds a weaker claim, so an obstacle is never
//! downgraded by this layer.

use conemap_types::MapError;

use crate::grid::{OccupancyGrid, PRIOR_COST, to_cost};

pub const FREE_SPACE: u8 = 0;
pub const LETHAL_OBSTACLE: u8 = 254;
pub const NO_INFORMATION: u8 = 255;

// ────────────────────────────────────────────────────────────────────────────
// ObstacleMap
// ────────────────────────────────────────────────────────────────────────────

/// Master map shared between layers.
#[derive(Debug, Clone, PartialEq)]
pub struct ObstacleMap {
    size_x: u32,
    size_y: u32,
    resolution: f64,
    origin_x: f64,
    origin_y: f64,
    cells: Vec<u8>,
}

impl ObstacleMap {
    /// A map where every cell is [`NO_INFORMATION`].
    pub fn new(size_x: u32, size_y: u32, resolution: f64, origin_x: f64, origin_y: f64) -> Self {
        Self {
            size_x,
            size_y,
            resolution,
            origin_x,
            origin_y,
            cells: vec![NO_INFORMATION; size_x as usize * size_y as usize],
        }
    }

    pub fn size_x(&self) -> u32 {
        self.size_x
    }

    pub fn size_y(&self) -> u32 {
        self.size_y
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn origin(&self) -> (f64, f64) {
        (self.origin_x, self.origin_y)
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    pub fn cost(&self, mx: u32, my: u32) -> u8 {
        self.cells[my as usize * self.size_x as usize + mx as usize]
    }

    pub fn set_cost(&mut self, mx: u32, my: u32, cost: u8) {
        let i = my as usize * self.size_x as usize + mx as usize;
        self.cells[i] = cost;
    }

    /// Half-open cell window covering the world-frame rectangle, clamped to
    /// the map. Returns `(min_i, min_j, max_i, max_j)`.
    pub fn cell_window(&self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> (u32, u32, u32, u32) {
        let to_cell = |w: f64, origin: f64, size: u32| -> u32 {
            let c = ((w - origin) / self.resolution).floor();
            c.clamp(0.0, f64::from(size)) as u32
        };
        let min_i = to_cell(min_x, self.origin_x, self.size_x);
        let min_j = to_cell(min_y, self.origin_y, self.size_y);
        let max_i = (to_cell(max_x, self.origin_x, self.size_x) + 1).min(self.size_x);
        let max_j = (to_cell(max_y, self.origin_y, self.size_y) + 1).min(self.size_y);
        (min_i, min_j, max_i, max_j)
    }

    /// Count of cells currently holding `cost`.
    pub fn count(&self, cost: u8) -> usize {
        self.cells.iter().filter(|&&c| c == cost).count()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Merge
// ────────────────────────────────────────────────────────────────────────────

/// Mark/clear thresholds in stored-cell units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub mark: u8,
    pub clear: u8,
}

impl Thresholds {
    /// Quantize probability thresholds the same way grid cells are.
    pub fn from_probabilities(mark: f64, clear: f64) -> Self {
        Self {
            mark: to_cost(mark),
            clear: to_cost(clear),
        }
    }

    /// Discrete verdict for one layer cell, if it is decisive.
    pub fn resolve(&self, cost: u8) -> Option<u8> {
        if cost == PRIOR_COST {
            None
        } else if cost > self.mark {
            Some(LETHAL_OBSTACLE)
        } else if cost < self.clear {
            Some(FREE_SPACE)
        } else {
            None
        }
    }
}

/// Fold the decisive cells of `layer` inside `[min_i, max_i) × [min_j, max_j)`
/// into `master`. Returns the number of master cells written.
pub fn merge(
    layer: &OccupancyGrid,
    master: &mut ObstacleMap,
    min_i: u32,
    min_j: u32,
    max_i: u32,
    max_j: u32,
    thresholds: &Thresholds,
) -> Result<usize, MapError> {
    if layer.size_x() != master.size_x() || layer.size_y() != master.size_y() {
        return Err(MapError::SizeMismatch {
            layer_x: layer.size_x(),
            layer_y: layer.size_y(),
            master_x: master.size_x(),
            master_y: master.size_y(),
        });
    }

    let max_i = max_i.min(master.size_x());
    let max_j = max_j.min(master.size_y());
    let mut written = 0;

    for j in min_j..max_j {
        for i in min_i..max_i {
            let Some(resolved) = thresholds.resolve(layer.cost(i, j)) else {
                continue;
            };
            let existing = master.cost(i, j);
            if existing == NO_INFORMATION || existing < resolved {
                master.set_cost(i, j, resolved);
                written += 1;
            }
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> Thresholds {
        Thresholds::from_probabilities(0.8, 0.2)
    }

    fn pair() -> (OccupancyGrid, ObstacleMap) {
        (
            OccupancyGrid::new(10, 10, 0.1, 0.0, 0.0),
            ObstacleMap::new(10, 10, 0.1, 0.0, 0.0),
        )
    }

    #[test]
    fn resolve_follows_thresholds() {
        let t = thresholds();
        assert_eq!((t.mark, t.clear), (204, 51));
        assert_eq!(t.resolve(PRIOR_COST), None);
        assert_eq!(t.resolve(230), Some(LETHAL_OBSTACLE));
        assert_eq!(t.resolve(10), Some(FREE_SPACE));
        assert_eq!(t.resolve(150), None, "ambiguous cells defer to the master");
        assert_eq!(t.resolve(204), None, "mark threshold itself is not decisive");
    }

    #[test]
    fn merge_fills_unknown_cells() {
        let (mut layer, mut master) = pair();
        layer.set_cost(1, 1, 250);
        layer.set_cost(2, 2, 0);

        let written = merge(&layer, &mut master, 0, 0, 10, 10, &thresholds()).unwrap();

        assert_eq!(written, 2);
        assert_eq!(master.cost(1, 1), LETHAL_OBSTACLE);
        assert_eq!(master.cost(2, 2), FREE_SPACE);
        assert_eq!(master.cost(3, 3), NO_INFORMATION);
    }

    #[test]
    fn merge_never_downgrades_an_obstacle() {
        let (mut layer, mut master) = pair();
        master.set_cost(4, 4, LETHAL_OBSTACLE);
        for cost in [0, 40, PRIOR_COST, 150] {
            layer.set_cost(4, 4, cost);
            merge(&layer, &mut master, 0, 0, 10, 10, &thresholds()).unwrap();
            assert_eq!(master.cost(4, 4), LETHAL_OBSTACLE, "layer cost {cost}");
        }
    }

    #[test]
    fn obstacle_overrides_free() {
        let (mut layer, mut master) = pair();
        master.set_cost(5, 5, FREE_SPACE);
        layer.set_cost(5, 5, 240);
        merge(&layer, &mut master, 0, 0, 10, 10, &thresholds()).unwrap();
        assert_eq!(master.cost(5, 5), LETHAL_OBSTACLE);
    }

    #[test]
    fn merge_is_confined_to_window() {
        let (mut layer, mut master) = pair();
        layer.set_cost(0, 0, 250);
        layer.set_cost(5, 5, 250);
        let written = merge(&layer, &mut master, 3, 3, 6, 6, &thresholds()).unwrap();
        assert_eq!(written, 1);
        assert_eq!(master.cost(0, 0), NO_INFORMATION);

        // Upper bound is exclusive and clamped.
        layer.set_cost(9, 9, 250);
        merge(&layer, &mut master, 0, 0, 9, 9, &thresholds()).unwrap();
        assert_eq!(master.cost(9, 9), NO_INFORMATION);
        merge(&layer, &mut master, 0, 0, 50, 50, &thresholds()).unwrap();
        assert_eq!(master.cost(9, 9), LETHAL_OBSTACLE);
    }

    #[test]
    fn size_mismatch_is_an_error() {
        let layer = OccupancyGrid::new(10, 10, 0.1, 0.0, 0.0);
        let mut master = ObstacleMap::new(12, 10, 0.1, 0.0, 0.0);
        assert!(matches!(
            merge(&layer, &mut master, 0, 0, 10, 10, &thresholds()),
            Err(MapError::SizeMismatch { master_x: 12, .. })
        ));
    }

    #[test]
    fn cell_window_is_half_open_and_clamped() {
        let master = ObstacleMap::new(10, 10, 0.1, 0.0, 0.0);
        assert_eq!(master.cell_window(0.25, 0.35, 0.55, 0.65), (2, 3, 6, 7));
        assert_eq!(master.cell_window(-5.0, -5.0, 50.0, 50.0), (0, 0, 10, 10));
        assert_eq!(master.cell_window(f64::MIN, f64::MIN, f64::MAX, f64::MAX), (0, 0, 10, 10));
    }
}
