//! Persistent occupancy-probability grid and the Bayesian cell fuser.
//!
//! Each cell stores a probability quantized to a `u8`:
//!
//! ```text
//! cost = round(p * 255)        p = cost / 255
//! ```
//!
//! [`PRIOR_COST`] (`p = 0.5`) means "no information".  Cells start there on
//! creation, resize and reset, and only [`OccupancyGrid::fuse`] (or the fixed
//! detection mark) moves them.  The stored value persists across update
//! cycles; that persistence is what lets many noisy readings converge.
//!
//! The update is the binary Bayes filter:
//!
//! ```text
//! p' = s p / (s p + (1 - s)(1 - p))
//! ```

/// Quantized "no information" value, `to_cost(0.5)`.
pub const PRIOR_COST: u8 = 128;

/// Fixed confidence written where a physical detection landed.
pub const DETECTION_COST: u8 = 233;

/// Quantize a probability. NaN carries no information and maps to the prior.
pub fn to_cost(p: f64) -> u8 {
    if p.is_nan() {
        return PRIOR_COST;
    }
    (p.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Dequantize a stored cell.
pub fn to_prob(cost: u8) -> f64 {
    f64::from(cost) / 255.0
}

/// Posterior occupancy given prior `p` and sensor likelihood `s`.
///
/// When `p` and `s` are contradicting certainties (`p = 1, s = 0` or the
/// reverse) the denominator vanishes and the newest evidence wins.
pub fn bayes_update(p: f64, s: f64) -> f64 {
    let occupied = s * p;
    let free = (1.0 - s) * (1.0 - p);
    let total = occupied + free;
    if total <= 0.0 { s } else { occupied / total }
}

// ────────────────────────────────────────────────────────────────────────────
// OccupancyGrid
// ────────────────────────────────────────────────────────────────────────────

/// Row-major grid of quantized occupancy probabilities.
///
/// Cell `(mx, my)` covers world `[origin + m * res, origin + (m + 1) * res)`
/// on each axis.
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyGrid {
    size_x: u32,
    size_y: u32,
    resolution: f64,
    origin_x: f64,
    origin_y: f64,
    cells: Vec<u8>,
}

impl OccupancyGrid {
    pub fn new(size_x: u32, size_y: u32, resolution: f64, origin_x: f64, origin_y: f64) -> Self {
        Self {
            size_x,
            size_y,
            resolution,
            origin_x,
            origin_y,
            cells: vec![PRIOR_COST; size_x as usize * size_y as usize],
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

    pub fn size_in_meters_x(&self) -> f64 {
        f64::from(self.size_x) * self.resolution
    }

    pub fn size_in_meters_y(&self) -> f64 {
        f64::from(self.size_y) * self.resolution
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    #[inline]
    pub fn index(&self, mx: u32, my: u32) -> usize {
        my as usize * self.size_x as usize + mx as usize
    }

    pub fn cost(&self, mx: u32, my: u32) -> u8 {
        self.cells[self.index(mx, my)]
    }

    pub fn set_cost(&mut self, mx: u32, my: u32, cost: u8) {
        let i = self.index(mx, my);
        self.cells[i] = cost;
    }

    pub fn probability(&self, mx: u32, my: u32) -> f64 {
        to_prob(self.cost(mx, my))
    }

    /// Cell containing the world point, or `None` when it lies off the grid.
    pub fn world_to_map(&self, wx: f64, wy: f64) -> Option<(u32, u32)> {
        if wx < self.origin_x || wy < self.origin_y {
            return None;
        }
        let mx = ((wx - self.origin_x) / self.resolution) as u64;
        let my = ((wy - self.origin_y) / self.resolution) as u64;
        if mx < u64::from(self.size_x) && my < u64::from(self.size_y) {
            Some((mx as u32, my as u32))
        } else {
            None
        }
    }

    /// Cell coordinates of a world point, possibly outside the grid.
    pub fn world_to_map_no_bounds(&self, wx: f64, wy: f64) -> (i64, i64) {
        (
            ((wx - self.origin_x) / self.resolution).floor() as i64,
            ((wy - self.origin_y) / self.resolution).floor() as i64,
        )
    }

    /// World coordinates of the cell centre.
    pub fn map_to_world(&self, mx: u32, my: u32) -> (f64, f64) {
        (
            self.origin_x + (f64::from(mx) + 0.5) * self.resolution,
            self.origin_y + (f64::from(my) + 0.5) * self.resolution,
        )
    }

    /// Apply one Bayes update with likelihood `s` to a cell; returns the new
    /// stored value.
    pub fn fuse(&mut self, mx: u32, my: u32, s: f64) -> u8 {
        let prior = self.probability(mx, my);
        let cost = to_cost(bayes_update(prior, s));
        self.set_cost(mx, my, cost);
        cost
    }

    /// Forget everything: every cell back to the prior.
    pub fn reset(&mut self) {
        self.cells.fill(PRIOR_COST);
    }

    /// Change geometry; all content is discarded.
    pub fn resize(&mut self, size_x: u32, size_y: u32, resolution: f64, origin_x: f64, origin_y: f64) {
        *self = Self::new(size_x, size_y, resolution, origin_x, origin_y);
    }

    /// Move the grid origin for a rolling window.
    ///
    /// The new origin is snapped to a whole number of cells from the old one.
    /// Cells covered by both windows keep their value; newly exposed cells
    /// start at the prior.
    pub fn update_origin(&mut self, new_origin_x: f64, new_origin_y: f64) {
        let cell_ox = ((new_origin_x - self.origin_x) / self.resolution) as i64;
        let cell_oy = ((new_origin_y - self.origin_y) / self.resolution) as i64;
        if cell_ox == 0 && cell_oy == 0 {
            return;
        }

        let size_x = i64::from(self.size_x);
        let size_y = i64::from(self.size_y);

        let lower_left_x = cell_ox.clamp(0, size_x);
        let lower_left_y = cell_oy.clamp(0, size_y);
        let upper_right_x = (cell_ox + size_x).clamp(0, size_x);
        let upper_right_y = (cell_oy + size_y).clamp(0, size_y);

        let mut shifted = vec![PRIOR_COST; self.cells.len()];
        for y in lower_left_y..upper_right_y {
            for x in lower_left_x..upper_right_x {
                let src = (y * size_x + x) as usize;
                let dst = ((y - cell_oy) * size_x + (x - cell_ox)) as usize;
                shifted[dst] = self.cells[src];
            }
        }

        self.cells = shifted;
        self.origin_x += cell_ox as f64 * self.resolution;
        self.origin_y += cell_oy as f64 * self.resolution;
    }
}
