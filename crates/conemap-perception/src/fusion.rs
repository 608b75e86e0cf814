//! Beam fusion: folds one classified reading into the occupancy grid.
//!
//! For every cell in the cone's candidate window:
//!
//! - clearing reading, `|theta| > max_angle` → untouched;
//! - clearing reading                       → Bayes update with `s = 0`;
//! - detection                              → Bayes update with
//!   `s = sensor_model(r, phi, theta)`.
//!
//! A genuine detection first stamps [`DETECTION_COST`] on the target cell
//! (and, past `close_distance`, on the in-cone cells of the arc across the
//! target) so that the cell where the echo physically landed starts from a
//! confident prior.

use tracing::trace;

use crate::bounds::DirtyRegion;
use crate::classifier::BeamUpdate;
use crate::cone::{CellWindow, ConeFootprint};
use crate::grid::{DETECTION_COST, OccupancyGrid};
use crate::sensor_model::SensorModel;

/// Readings closer than this never mark the detection arc (metres).
pub const DEFAULT_CLOSE_DISTANCE: f64 = 0.2;

/// Tunables of the fusion step that are not part of the likelihood model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionParams {
    pub phi_v: f64,
    pub close_distance: f64,
}

/// What one beam did to the grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FusionOutcome {
    /// Cells that received a Bayes update.
    pub cells_updated: usize,
    /// Cells stamped with the fixed detection cost.
    pub cells_marked: usize,
}

/// Fuse `beam` into `grid`, widening `dirty` by the cone's extent.
///
/// `max_range` is the sensor's declared maximum; detections at or beyond it
/// never mark the arc.
pub fn fuse_beam(
    grid: &mut OccupancyGrid,
    dirty: &mut DirtyRegion,
    footprint: &ConeFootprint,
    beam: &BeamUpdate,
    max_range: f64,
    params: &FusionParams,
) -> FusionOutcome {
    let mut outcome = FusionOutcome::default();

    dirty.touch(footprint.origin.0, footprint.origin.1);

    let (tx, ty) = footprint.target;
    if let Some((mx, my)) = grid.world_to_map(tx, ty) {
        if !beam.clear_cone {
            grid.set_cost(mx, my, DETECTION_COST);
            outcome.cells_marked += 1;
        }
        dirty.touch(tx, ty);
    }

    dirty.touch(footprint.left_edge.0, footprint.left_edge.1);
    dirty.touch(footprint.right_edge.0, footprint.right_edge.1);

    let Some(window) = footprint.window else {
        trace!(
            origin_x = footprint.origin.0,
            origin_y = footprint.origin.1,
            "cone lies entirely off the grid"
        );
        return outcome;
    };

    if !beam.clear_cone && beam.range >= params.close_distance && beam.range < max_range {
        outcome.cells_marked += mark_arc(grid, footprint, beam, &window);
    }

    let model = SensorModel::new(beam.max_angle, params.phi_v, grid.resolution());
    for (mx, my) in window.cells() {
        let (wx, wy) = grid.map_to_world(mx, my);
        let (theta, phi) = footprint.polar_offset(wx, wy);

        let likelihood = if beam.clear_cone {
            if theta.abs() > beam.max_angle {
                continue;
            }
            0.0
        } else {
            model.probability(beam.range, phi, theta)
        };

        grid.fuse(mx, my, likelihood);
        outcome.cells_updated += 1;
    }

    outcome
}

/// Stamp the detection arc inside `window`. Cells whose centre falls outside
/// the cone keep their value.
fn mark_arc(grid: &mut OccupancyGrid, footprint: &ConeFootprint, beam: &BeamUpdate, window: &CellWindow) -> usize {
    let clip = window.world_bounds(grid);
    let cells: Vec<(u32, u32)> = footprint
        .arc_points(grid.resolution(), &clip)
        .filter_map(|(wx, wy)| grid.world_to_map(wx, wy))
        .filter(|&(mx, my)| {
            let (cx, cy) = grid.map_to_world(mx, my);
            footprint.polar_offset(cx, cy).0.abs() <= beam.max_angle
        })
        .collect();
    for &(mx, my) in &cells {
        grid.set_cost(mx, my, DETECTION_COST);
    }
    cells.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Bounds;
    use crate::grid::PRIOR_COST;

    const ORIGIN: (f64, f64) = (1.01, 5.01);

    fn grid() -> OccupancyGrid {
        OccupancyGrid::new(240, 200, 0.05, 0.0, 0.0)
    }

    fn params(phi_v: f64) -> FusionParams {
        FusionParams {
            phi_v,
            close_distance: DEFAULT_CLOSE_DISTANCE,
        }
    }

    fn run(g: &mut OccupancyGrid, range: f64, clear: bool, max_range: f64, phi_v: f64) -> DirtyRegion {
        let mut dirty = DirtyRegion::new();
        dirty.report_into(&mut Bounds::empty());
        let target = (ORIGIN.0 + range, ORIGIN.1);
        let footprint = ConeFootprint::resolve(ORIGIN, target, 0.25, g);
        let beam = BeamUpdate {
            range,
            clear_cone: clear,
            max_angle: 0.25,
        };
        fuse_beam(g, &mut dirty, &footprint, &beam, max_range, &params(phi_v));
        dirty
    }

    fn cell(g: &OccupancyGrid, x: f64, y: f64) -> (u32, u32) {
        g.world_to_map(x, y).unwrap()
    }

    #[test]
    fn detection_raises_cells_at_measured_range() {
        let mut g = grid();
        run(&mut g, 5.0, false, 10.0, 10.0);

        let (tx, ty) = cell(&g, ORIGIN.0 + 5.0, ORIGIN.1);
        assert!(g.cost(tx, ty) > PRIOR_COST);
        let (nx, ny) = cell(&g, ORIGIN.0 + 5.0, ORIGIN.1 + 0.3);
        assert!(g.cost(nx, ny) > PRIOR_COST, "in-cone neighbour of the hit");
    }

    #[test]
    fn detection_lowers_free_space_before_the_hit() {
        let mut g = grid();
        run(&mut g, 5.0, false, 10.0, 10.0);
        let (x, y) = cell(&g, ORIGIN.0 + 2.0, ORIGIN.1);
        assert!(g.cost(x, y) < PRIOR_COST);
    }

    #[test]
    fn detection_leaves_out_of_cone_cells_alone() {
        let mut g = grid();
        run(&mut g, 5.0, false, 10.0, 10.0);
        // Inside the candidate window but ~45° off axis.
        let (x, y) = cell(&g, ORIGIN.0 + 1.0, ORIGIN.1 + 1.0);
        assert_eq!(g.cost(x, y), PRIOR_COST);
    }

    #[test]
    fn clear_lowers_in_cone_and_skips_the_rest() {
        let mut g = grid();
        run(&mut g, 4.0, true, 4.0, 1.2);

        for d in [0.5, 1.5, 3.0, 3.9] {
            let (x, y) = cell(&g, ORIGIN.0 + d, ORIGIN.1);
            assert!(g.cost(x, y) < PRIOR_COST, "on-axis cell at {d} m should be cleared");
        }
        let (x, y) = cell(&g, ORIGIN.0 + 1.0, ORIGIN.1 + 0.5);
        assert_eq!(g.cost(x, y), PRIOR_COST, "out-of-cone cell must not be cleared");
    }

    #[test]
    fn clear_never_marks_target() {
        let mut g = grid();
        run(&mut g, 4.0, true, 4.0, 1.2);
        assert!(g.cells().iter().all(|&c| c <= PRIOR_COST));
    }

    #[test]
    fn arc_is_marked_for_mid_range_detections_only() {
        let mut g = grid();
        let footprint = ConeFootprint::resolve(ORIGIN, (ORIGIN.0 + 2.0, ORIGIN.1), 0.25, &g);
        let beam = BeamUpdate {
            range: 2.0,
            clear_cone: false,
            max_angle: 0.25,
        };
        let mut dirty = DirtyRegion::new();
        let near = fuse_beam(&mut g, &mut dirty, &footprint, &beam, 4.0, &params(1.2));
        assert!(near.cells_marked > 1);

        let mut g = grid();
        let at_max = fuse_beam(&mut g, &mut dirty, &footprint, &beam, 2.0, &params(1.2));
        assert_eq!(at_max.cells_marked, 1, "only the target at max range");
    }

    #[test]
    fn dirty_region_covers_origin_target_and_edges() {
        let mut g = grid();
        let dirty = run(&mut g, 5.0, false, 10.0, 10.0);
        let b = dirty.current();
        assert!(b.contains_point(ORIGIN.0, ORIGIN.1));
        assert!(b.contains_point(ORIGIN.0 + 5.0, ORIGIN.1));
        let radius = 5.0 * 0.25f64.tanh();
        assert!((b.max_y - (ORIGIN.1 + radius)).abs() < 1e-9);
        assert!((b.min_y - (ORIGIN.1 - radius)).abs() < 1e-9);
    }

    #[test]
    fn off_grid_cone_touches_nothing() {
        let mut g = grid();
        let footprint = ConeFootprint::resolve((-20.0, -20.0), (-18.0, -20.0), 0.25, &g);
        let beam = BeamUpdate {
            range: 2.0,
            clear_cone: false,
            max_angle: 0.25,
        };
        let mut dirty = DirtyRegion::new();
        let outcome = fuse_beam(&mut g, &mut dirty, &footprint, &beam, 4.0, &params(1.2));
        assert_eq!(outcome, FusionOutcome::default());
        assert!(g.cells().iter().all(|&c| c == PRIOR_COST));
    }

    #[test]
    fn close_detection_arc_stays_inside_the_cone() {
        let mut g = grid();
        let range = 0.3;
        let footprint = ConeFootprint::resolve(ORIGIN, (ORIGIN.0 + range, ORIGIN.1), 0.25, &g);
        let beam = BeamUpdate {
            range,
            clear_cone: false,
            max_angle: 0.25,
        };
        let mut dirty = DirtyRegion::new();
        let outcome = fuse_beam(&mut g, &mut dirty, &footprint, &beam, 4.0, &params(1.2));
        assert!(outcome.cells_marked > 1, "in-cone arc cells are still marked");

        for (mx, my) in footprint.window.unwrap().cells() {
            let (wx, wy) = g.map_to_world(mx, my);
            let (theta, _) = footprint.polar_offset(wx, wy);
            if theta.abs() > beam.max_angle {
                assert_eq!(g.cost(mx, my), PRIOR_COST, "off-cone cell ({mx}, {my}) theta={theta}");
            }
        }
    }

    #[test]
    fn huge_range_detection_only_touches_the_window() {
        let mut g = grid();
        let range = 1e8;
        let footprint = ConeFootprint::resolve(ORIGIN, (ORIGIN.0 + range, ORIGIN.1), 0.25, &g);
        let beam = BeamUpdate {
            range,
            clear_cone: false,
            max_angle: 0.25,
        };
        let mut dirty = DirtyRegion::new();
        let outcome = fuse_beam(&mut g, &mut dirty, &footprint, &beam, 1e9, &params(1.2));
        // Target and arc lie far beyond the grid.
        assert_eq!(outcome.cells_marked, 0);
        let w = footprint.window.unwrap();
        let span = (w.max_x - w.min_x + 1) as usize * (w.max_y - w.min_y + 1) as usize;
        assert_eq!(outcome.cells_updated, span);
    }
}
