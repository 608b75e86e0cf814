//! Wide-field scan cross-check for variable-range readings.
//!
//! A planar laser usually sees whatever a sonar sees, and sees it sharper.
//! When a beam near the centre of the latest scan reports an obstacle no
//! farther than the sonar range plus a trust distance, the obstacle is
//! already accounted for; the sonar return is then used only to clear its
//! cone. The comparison is one-sided: a laser return far beyond the sonar
//! range proves nothing.

use conemap_types::LaserScan;

pub const DEFAULT_TRUST_DISTANCE: f64 = 0.65;
pub const DEFAULT_HALF_WINDOW: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanCrossCheck {
    /// Slack added to the sonar range before comparing (metres).
    pub trust_distance: f64,
    /// Beams examined on each side of the scan centre.
    pub half_window: usize,
}

impl Default for ScanCrossCheck {
    fn default() -> Self {
        Self {
            trust_distance: DEFAULT_TRUST_DISTANCE,
            half_window: DEFAULT_HALF_WINDOW,
        }
    }
}

impl ScanCrossCheck {
    /// True when the scan already covers an obstacle at `range`.
    pub fn corroborates(&self, scan: &LaserScan, range: f64) -> bool {
        let n = scan.ranges.len();
        if n == 0 {
            return false;
        }
        let centre = n / 2;
        let start = centre.saturating_sub(self.half_window);
        let stop = (centre + self.half_window).min(n);
        scan.ranges[start..stop]
            .iter()
            .filter(|r| r.is_finite())
            .any(|&r| r < range + self.trust_distance)
    }
}
