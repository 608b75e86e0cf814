//! [`LogThrottle`] – emit at most once per interval, keyed by call site.
//!
//! Per-reading failures (a misconfigured fixed ranger, a frame that never
//! appears) would otherwise log at sensor rate.  Each call site gets its own
//! `governor` limiter with a one-token bucket refilled every `period`.
//!
//! ```
//! use std::time::Duration;
//! use conemap_kernel::throttle::LogThrottle;
//!
//! let mut throttle = LogThrottle::new();
//! assert!(throttle.allow("transform", Duration::from_secs(1)));
//! assert!(!throttle.allow("transform", Duration::from_secs(1)));
//! // Other sites are independent.
//! assert!(throttle.allow("stale", Duration::from_secs(2)));
//! ```

use std::collections::HashMap;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing::trace;

/// Period used for per-reading error logs.
pub const READING_ERROR_PERIOD: Duration = Duration::from_secs(1);

/// Period used for the "no readings" warning.
pub const STALENESS_PERIOD: Duration = Duration::from_secs(2);

/// Per-site rate limiters.
#[derive(Default)]
pub struct LogThrottle {
    sites: HashMap<&'static str, DefaultDirectRateLimiter>,
}

impl LogThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` when `site` may log now.
    ///
    /// The period is fixed by the first call for a site. A zero period never
    /// throttles.
    pub fn allow(&mut self, site: &'static str, period: Duration) -> bool {
        let Some(quota) = Quota::with_period(period) else {
            return true;
        };
        self.sites
            .entry(site)
            .or_insert_with(|| {
                trace!(site, ?period, "new throttled log site");
                RateLimiter::direct(quota)
            })
            .check()
            .is_ok()
    }

    /// Forget every site, so the next call for each passes.
    pub fn reset(&mut self) {
        self.sites.clear();
    }
}

impl std::fmt::Debug for LogThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogThrottle")
            .field("sites", &self.sites.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn first_call_passes_and_repeat_is_suppressed() {
        let mut t = LogThrottle::new();
        assert!(t.allow("site", Duration::from_secs(60)));
        for _ in 0..10 {
            assert!(!t.allow("site", Duration::from_secs(60)));
        }
    }

    #[test]
    fn sites_are_independent() {
        let mut t = LogThrottle::new();
        assert!(t.allow("a", Duration::from_secs(60)));
        assert!(t.allow("b", Duration::from_secs(60)));
        assert!(!t.allow("a", Duration::from_secs(60)));
    }

    #[test]
    fn site_passes_again_after_period() {
        let mut t = LogThrottle::new();
        assert!(t.allow("site", Duration::from_millis(20)));
        assert!(!t.allow("site", Duration::from_millis(20)));
        thread::sleep(Duration::from_millis(40));
        assert!(t.allow("site", Duration::from_millis(20)));
    }

    #[test]
    fn zero_period_never_throttles() {
        let mut t = LogThrottle::new();
        assert!(t.allow("site", Duration::ZERO));
        assert!(t.allow("site", Duration::ZERO));
    }

    #[test]
    fn reset_forgets_sites() {
        let mut t = LogThrottle::new();
        assert!(t.allow("site", Duration::from_secs(60)));
        t.reset();
        assert!(t.allow("site", Duration::from_secs(60)));
    }
}
