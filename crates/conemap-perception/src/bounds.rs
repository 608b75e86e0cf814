//! World-frame update bounds and the per-cycle dirty-region tracker.
//!
//! Downstream consumers repaint only the area a layer reports, so every cell
//! a reading may have changed must fall inside the reported [`Bounds`].

/// An axis-aligned box in world coordinates.
///
/// [`Bounds::empty`] is the inverted-extremal state: any `touch` replaces it
/// with a degenerate box around the touched point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Contains nothing; the identity for [`Bounds::union`].
    pub fn empty() -> Self {
        Self::new(f64::MAX, f64::MAX, f64::MIN, f64::MIN)
    }

    /// Covers the whole plane.
    pub fn everything() -> Self {
        Self::new(f64::MIN, f64::MIN, f64::MAX, f64::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    /// Widen to include `(x, y)`.
    pub fn touch(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// Widen to include `other`.
    pub fn union(&mut self, other: &Bounds) {
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::empty()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// DirtyRegion
// ────────────────────────────────────────────────────────────────────────────

/// Accumulates everything touched since the last report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirtyRegion {
    region: Bounds,
}

impl DirtyRegion {
    /// A freshly initialised layer has never been painted, so the first report
    /// covers everything.
    pub fn new() -> Self {
        Self {
            region: Bounds::everything(),
        }
    }

    pub fn touch(&mut self, x: f64, y: f64) {
        self.region.touch(x, y);
    }

    /// Mark the whole plane dirty (after a reset).
    pub fn invalidate_all(&mut self) {
        self.region = Bounds::everything();
    }

    pub fn current(&self) -> Bounds {
        self.region
    }

    /// Union the pending region into the caller's bounds, then start over.
    pub fn report_into(&mut self, bounds: &mut Bounds) {
        bounds.union(&self.region);
        self.region = Bounds::empty();
    }
}

impl Default for DirtyRegion {
    fn default() -> Self {
        Self::new()
    }
}
