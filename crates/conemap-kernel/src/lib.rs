//! `conemap-kernel` – cycle supervision for a range-sensor layer.
//!
//! Nothing here touches the grid. These types decide whether the layer is
//! still trustworthy and whether a diagnostic may be emitted now.
//!
//! # Modules
//!
//! - [`staleness`] – [`StalenessMonitor`][staleness::StalenessMonitor]:
//!   flags the layer as not current when no reading has arrived within the
//!   configured timeout.
//! - [`throttle`] – [`LogThrottle`][throttle::LogThrottle]: at most one log
//!   line per interval for each call site.

pub mod staleness;
pub mod throttle;

pub use staleness::{StalenessMonitor, StalenessVerdict};
pub use throttle::LogThrottle;
