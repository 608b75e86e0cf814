//! Cone geometry: which cells a beam reading can influence.
//!
//! Given the beam origin and target in the global frame, the cone half-width
//! at the target is `d * tanh(max_angle)` rather than `d * tan(max_angle)`,
//! which keeps wide-angle sensors from sweeping huge windows.  The candidate
//! window is the cell bounding box of the origin, the target and the two cone
//! edge points, clamped to the grid.

use std::f64::consts::{PI, TAU};

use crate::bounds::Bounds;
use crate::grid::OccupancyGrid;

/// Wrap an angle into `[-pi, pi)`.
pub fn normalize_angle(angle: f64) -> f64 {
    (angle + PI).rem_euclid(TAU) - PI
}

/// Inclusive rectangle of grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellWindow {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl CellWindow {
    pub fn cells(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (self.min_x..=self.max_x).flat_map(move |x| (self.min_y..=self.max_y).map(move |y| (x, y)))
    }

    /// World-frame rectangle covered by the window's cells.
    pub fn world_bounds(&self, grid: &OccupancyGrid) -> Bounds {
        let (ox, oy) = grid.origin();
        let res = grid.resolution();
        Bounds::new(
            ox + f64::from(self.min_x) * res,
            oy + f64::from(self.min_y) * res,
            ox + f64::from(self.max_x + 1) * res,
            oy + f64::from(self.max_y + 1) * res,
        )
    }
}

/// World-frame footprint of one beam.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConeFootprint {
    pub origin: (f64, f64),
    pub target: (f64, f64),
    /// Beam heading in the global frame (radians).
    pub heading: f64,
    /// Distance origin → target.
    pub length: f64,
    /// Half-width of the cone at the target.
    pub radius: f64,
    pub left_edge: (f64, f64),
    pub right_edge: (f64, f64),
    /// `None` when the whole cone lies off the grid.
    pub window: Option<CellWindow>,
}

impl ConeFootprint {
    pub fn resolve(
        origin: (f64, f64),
        target: (f64, f64),
        max_angle: f64,
        grid: &OccupancyGrid,
    ) -> Self {
        let (ox, oy) = origin;
        let (tx, ty) = target;
        let (dx, dy) = (tx - ox, ty - oy);
        let heading = dy.atan2(dx);
        let length = dx.hypot(dy);
        let radius = length * max_angle.tanh();

        let (sin, cos) = heading.sin_cos();
        let left_edge = (tx - radius * sin, ty + radius * cos);
        let right_edge = (tx + radius * sin, ty - radius * cos);

        let (mut x0, mut y0) = grid.world_to_map_no_bounds(ox, oy);
        let (mut x1, mut y1) = (x0, y0);
        for (wx, wy) in [target, left_edge, right_edge] {
            let (a, b) = grid.world_to_map_no_bounds(wx, wy);
            x0 = x0.min(a);
            x1 = x1.max(a);
            y0 = y0.min(b);
            y1 = y1.max(b);
        }

        let x0 = x0.max(0);
        let y0 = y0.max(0);
        let x1 = x1.min(i64::from(grid.size_x()) - 1);
        let y1 = y1.min(i64::from(grid.size_y()) - 1);
        let window = (x0 <= x1 && y0 <= y1).then(|| CellWindow {
            min_x: x0 as u32,
            min_y: y0 as u32,
            max_x: x1 as u32,
            max_y: y1 as u32,
        });

        Self {
            origin,
            target,
            heading,
            length,
            radius,
            left_edge,
            right_edge,
            window,
        }
    }

    /// `(theta, phi)` of a world point: angular deviation from the beam axis
    /// and distance from the origin.
    pub fn polar_offset(&self, wx: f64, wy: f64) -> (f64, f64) {
        let (dx, dy) = (wx - self.origin.0, wy - self.origin.1);
        let theta = normalize_angle(dy.atan2(dx) - self.heading);
        (theta, dx.hypot(dy))
    }

    /// Points across the target, perpendicular to the beam, spaced `step`
    /// apart from `-radius` up to (not including) `radius`, restricted to
    /// those inside `clip`.
    ///
    /// The segment is clipped before iterating, so the cost is bounded by the
    /// clip rectangle rather than by the cone width.
    pub fn arc_points(&self, step: f64, clip: &Bounds) -> impl Iterator<Item = (f64, f64)> + '_ {
        let (sin, cos) = self.heading.sin_cos();
        let (dir_x, dir_y) = (-sin, cos);

        let count = if step > 0.0 && self.radius.is_finite() {
            (2.0 * self.radius / step).ceil().max(0.0)
        } else {
            0.0
        };

        // Parameter interval along the arc that stays inside `clip`.
        let mut lo = -self.radius;
        let mut hi = self.radius;
        for (start, dir, min, max) in [
            (self.target.0, dir_x, clip.min_x, clip.max_x),
            (self.target.1, dir_y, clip.min_y, clip.max_y),
        ] {
            if dir.abs() < f64::EPSILON {
                if start < min || start > max {
                    hi = lo - 1.0;
                }
                continue;
            }
            let (a, b) = ((min - start) / dir, (max - start) / dir);
            lo = lo.max(a.min(b));
            hi = hi.min(a.max(b));
        }

        let (first, end) = if count > 0.0 && lo <= hi {
            let first = ((lo + self.radius) / step).ceil().max(0.0);
            let end = (((hi + self.radius) / step).floor() + 1.0).min(count);
            (first as usize, end.max(first) as usize)
        } else {
            (0, 0)
        };

        (first..end).map(move |i| {
            let r = -self.radius + i as f64 * step;
            (self.target.0 + r * dir_x, self.target.1 + r * dir_y)
        })
    }
}
