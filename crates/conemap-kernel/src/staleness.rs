//! [`StalenessMonitor`] – currency flag for a reading-driven layer.
//!
//! Every accepted reading calls [`StalenessMonitor::record_reading`].  At the
//! end of each bounds cycle the layer calls [`StalenessMonitor::evaluate`]:
//! when no reading arrived this cycle and the last one is older than the
//! configured timeout, the layer is flagged as *not current*.  A merge into
//! the shared map ([`StalenessMonitor::mark_merged`]) makes it current again.
//!
//! Staleness never discards data; it only tells the consumer that the map may
//! be out of date.

use std::time::{Duration, Instant};

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// Outcome of one end-of-cycle evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StalenessVerdict {
    /// Readings arrived this cycle, or the timeout has not been exceeded.
    Current,
    /// Nothing arrived this cycle and the last reading is older than the
    /// timeout.
    Stale { elapsed: Duration },
}

// ────────────────────────────────────────────────────────────────────────────
// StalenessMonitor
// ────────────────────────────────────────────────────────────────────────────

/// Tracks the last accepted reading and the per-cycle reading count.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use conemap_kernel::staleness::{StalenessMonitor, StalenessVerdict};
///
/// let mut monitor = StalenessMonitor::new(Some(Duration::from_secs(1)));
/// monitor.record_reading();
///
/// assert_eq!(monitor.evaluate(), StalenessVerdict::Current);
/// assert!(monitor.is_current());
/// ```
#[derive(Debug, Clone)]
pub struct StalenessMonitor {
    timeout: Option<Duration>,
    last_reading: Instant,
    readings_this_cycle: usize,
    current: bool,
}

impl StalenessMonitor {
    /// `None` (or a zero duration) disables the timeout.
    ///
    /// The timer starts now, so a fresh monitor is current.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout: timeout.filter(|t| !t.is_zero()),
            last_reading: Instant::now(),
            readings_this_cycle: 0,
            current: true,
        }
    }

    /// Build from a timeout in seconds, `0` meaning disabled.
    pub fn from_secs_f64(timeout: f64) -> Self {
        Self::new(Self::timeout_from_secs(timeout))
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout.filter(|t| !t.is_zero());
    }

    pub fn set_timeout_secs_f64(&mut self, timeout: f64) {
        self.set_timeout(Self::timeout_from_secs(timeout));
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Record an accepted reading, resetting the timer.
    pub fn record_reading(&mut self) {
        self.record_reading_at(Instant::now());
    }

    pub fn record_reading_at(&mut self, now: Instant) {
        self.last_reading = now;
        self.readings_this_cycle += 1;
    }

    pub fn readings_this_cycle(&self) -> usize {
        self.readings_this_cycle
    }

    /// End-of-cycle check. Only ever lowers the currency flag.
    pub fn evaluate(&mut self) -> StalenessVerdict {
        self.evaluate_at(Instant::now())
    }

    pub fn evaluate_at(&mut self, now: Instant) -> StalenessVerdict {
        if self.readings_this_cycle > 0 {
            return StalenessVerdict::Current;
        }
        let Some(timeout) = self.timeout else {
            return StalenessVerdict::Current;
        };
        let elapsed = now.saturating_duration_since(self.last_reading);
        if elapsed > timeout {
            self.current = false;
            StalenessVerdict::Stale { elapsed }
        } else {
            StalenessVerdict::Current
        }
    }

    /// The layer's cells were merged into the shared map.
    pub fn mark_merged(&mut self) {
        self.readings_this_cycle = 0;
        self.current = true;
    }

    /// Force the flag, e.g. while the layer is disabled or after a reset.
    pub fn set_current(&mut self, current: bool) {
        self.current = current;
    }

    pub fn is_current(&self) -> bool {
        self.current
    }

    fn timeout_from_secs(timeout: f64) -> Option<Duration> {
        (timeout.is_finite() && timeout > 0.0).then(|| Duration::from_secs_f64(timeout))
    }
}

impl Default for StalenessMonitor {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn fresh_monitor_is_current() {
        let mut m = StalenessMonitor::new(Some(Duration::from_secs(5)));
        assert!(m.is_current());
        assert_eq!(m.evaluate(), StalenessVerdict::Current);
    }

    #[test]
    fn silent_layer_goes_stale_after_timeout() {
        let mut m = StalenessMonitor::new(Some(Duration::from_millis(20)));
        thread::sleep(Duration::from_millis(30));
        assert!(matches!(m.evaluate(), StalenessVerdict::Stale { .. }));
        assert!(!m.is_current());
    }

    #[test]
    fn reading_this_cycle_keeps_layer_current() {
        let start = Instant::now();
        let mut m = StalenessMonitor::new(Some(Duration::from_millis(20)));
        m.record_reading_at(start);
        // Long past the timeout, but a reading arrived this cycle.
        assert_eq!(m.evaluate_at(start + Duration::from_secs(10)), StalenessVerdict::Current);
        assert!(m.is_current());
    }

    #[test]
    fn reading_resets_elapsed_time() {
        let start = Instant::now();
        let mut m = StalenessMonitor::new(Some(Duration::from_millis(100)));
        m.record_reading_at(start + Duration::from_millis(90));
        m.mark_merged();
        // 150 ms after start, only 60 ms after the reading.
        assert_eq!(m.evaluate_at(start + Duration::from_millis(150)), StalenessVerdict::Current);
        assert_eq!(
            m.evaluate_at(start + Duration::from_millis(200)),
            StalenessVerdict::Stale {
                elapsed: Duration::from_millis(110)
            }
        );
    }

    #[test]
    fn zero_timeout_disables_check() {
        let mut m = StalenessMonitor::from_secs_f64(0.0);
        assert_eq!(m.timeout(), None);
        let later = Instant::now() + Duration::from_secs(3600);
        assert_eq!(m.evaluate_at(later), StalenessVerdict::Current);
        assert!(m.is_current());
    }

    #[test]
    fn merge_restores_currency_and_resets_count() {
        let mut m = StalenessMonitor::new(Some(Duration::from_millis(1)));
        m.record_reading();
        assert_eq!(m.readings_this_cycle(), 1);
        m.set_current(false);

        m.mark_merged();
        assert!(m.is_current());
        assert_eq!(m.readings_this_cycle(), 0);
    }

    #[test]
    fn timeout_can_be_changed() {
        let start = Instant::now();
        let mut m = StalenessMonitor::new(None);
        m.record_reading_at(start);
        m.mark_merged();
        m.set_timeout_secs_f64(0.5);
        assert_eq!(m.timeout(), Some(Duration::from_millis(500)));
        assert!(matches!(
            m.evaluate_at(start + Duration::from_secs(1)),
            StalenessVerdict::Stale { .. }
        ));
    }
}
