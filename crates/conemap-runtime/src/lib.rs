//! `conemap-runtime` – runs a range-sensor layer.
//!
//! Wires the perception core, the reading buffer and the staleness monitor
//! into one layer object with a two-phase update cycle, and carries the
//! ambient pieces a host process needs around it.
//!
//! # Modules
//!
//! - [`layer`] – [`RangeSensorLayer`][layer::RangeSensorLayer]: drains
//!   buffered readings, fuses them into the private occupancy grid, reports
//!   the dirty region and merges decisive cells into the shared
//!   [`ObstacleMap`][conemap_perception::costmap::ObstacleMap].
//! - [`config`] – [`LayerSettings`][config::LayerSettings]: serde-backed
//!   tunables with defaults and validation.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber with an optional OTLP span exporter.

pub mod config;
pub mod layer;
pub mod telemetry;

pub use config::{LayerSettings, ScanCheckSettings};
pub use layer::{CycleReport, RangeSensorLayer};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
