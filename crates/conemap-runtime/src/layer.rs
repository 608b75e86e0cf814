//! [`RangeSensorLayer`] – the two-phase update cycle of a range-sensor layer.
//!
//! Producers push into the layer's [`ReadingBuffer`] (and optionally its
//! [`ScanSlot`]) from any thread.  The owner of the layer then drives the
//! cycle from a single thread:
//!
//! 1. [`RangeSensorLayer::update_bounds`] – re-origin a rolling window, drain
//!    the buffer, classify / transform / fuse each reading into the private
//!    [`OccupancyGrid`], report the dirty region, evaluate staleness.
//! 2. [`RangeSensorLayer::update_costs`] – threshold the grid inside the
//!    caller's window and merge it into the shared [`ObstacleMap`].
//!
//! A bad reading never aborts the batch: it is counted in the
//! [`CycleReport`], logged at most once per second per failure kind, and the
//! next reading is processed.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use conemap_perception::bounds::Bounds;
//! use conemap_perception::costmap::ObstacleMap;
//! use conemap_perception::transform::{TfEngine, Transform3D};
//! use conemap_runtime::{LayerSettings, RangeSensorLayer};
//! use conemap_types::RangeReading;
//!
//! let mut tf = TfEngine::new();
//! tf.set_transform("map", "sonar", Transform3D::planar(2.0, 2.0, 0.0, 0.0));
//!
//! let mut master = ObstacleMap::new(100, 100, 0.05, 0.0, 0.0);
//! let mut layer = RangeSensorLayer::new(LayerSettings::default(), "map", tf, &master).unwrap();
//!
//! layer.buffer().push(RangeReading {
//!     frame_id: "sonar".into(),
//!     stamp: Utc::now(),
//!     range: 1.0,
//!     min_range: 0.1,
//!     max_range: 4.0,
//!     field_of_view: 0.4,
//! });
//!
//! let mut bounds = Bounds::empty();
//! let report = layer.update_bounds(2.0, 2.0, false, &mut bounds);
//! assert_eq!(report.accepted, 1);
//!
//! let (min_i, min_j, max_i, max_j) =
//!     master.cell_window(bounds.min_x, bounds.min_y, bounds.max_x, bounds.max_y);
//! layer.update_costs(&mut master, min_i, min_j, max_i, max_j).unwrap();
//! assert!(layer.is_current());
//! ```

use conemap_kernel::throttle::{READING_ERROR_PERIOD, STALENESS_PERIOD};
use conemap_kernel::{LogThrottle, StalenessMonitor, StalenessVerdict};
use conemap_middleware::{ReadingBuffer, ScanSlot};
use conemap_perception::bounds::{Bounds, DirtyRegion};
use conemap_perception::classifier::Classifier;
use conemap_perception::cone::ConeFootprint;
use conemap_perception::costmap::{self, ObstacleMap};
use conemap_perception::fusion::{FusionOutcome, fuse_beam};
use conemap_perception::grid::OccupancyGrid;
use conemap_perception::transform::{FrameTransformer, StampedPoint, Vec3};
use conemap_types::{ConfigError, LaserScan, MapError, RangeReading, ReadingError};
use tracing::{debug, error, info, info_span, warn};

use crate::config::LayerSettings;

// ─────────────────────────────────────────────────────────────────────────────
// CycleReport
// ─────────────────────────────────────────────────────────────────────────────

/// What happened to the readings drained in one bounds cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Fused into the grid.
    pub accepted: usize,
    /// Valid but carrying nothing to fuse (fixed `+inf` without clearing).
    pub dropped: usize,
    /// Rejected by the classifier.
    pub malformed: usize,
    /// No transform into the global frame within the tolerance.
    pub untransformable: usize,
    /// Bayes updates applied across all accepted readings.
    pub cells_updated: usize,
}

impl CycleReport {
    pub fn total(&self) -> usize {
        self.accepted + self.dropped + self.malformed + self.untransformable
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RangeSensorLayer
// ─────────────────────────────────────────────────────────────────────────────

pub struct RangeSensorLayer<T: FrameTransformer> {
    settings: LayerSettings,
    classifier: Classifier,
    global_frame: String,
    transformer: T,
    grid: OccupancyGrid,
    dirty: DirtyRegion,
    buffer: ReadingBuffer,
    scans: ScanSlot,
    staleness: StalenessMonitor,
    throttle: LogThrottle,
}

impl<T: FrameTransformer> RangeSensorLayer<T> {
    /// Build a layer sized to `master`. Invalid settings are refused.
    pub fn new(
        settings: LayerSettings,
        global_frame: impl Into<String>,
        transformer: T,
        master: &ObstacleMap,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        let global_frame = global_frame.into();

        info!(
            input_sensor_type = %settings.input_sensor_type,
            topics = ?settings.resolved_topics(),
            global_frame = %global_frame,
            "range sensor layer initialised"
        );

        let (origin_x, origin_y) = master.origin();
        Ok(Self {
            classifier: settings.classifier(),
            staleness: StalenessMonitor::from_secs_f64(settings.no_readings_timeout),
            settings,
            global_frame,
            transformer,
            grid: OccupancyGrid::new(
                master.size_x(),
                master.size_y(),
                master.resolution(),
                origin_x,
                origin_y,
            ),
            dirty: DirtyRegion::new(),
            buffer: ReadingBuffer::new(),
            scans: ScanSlot::new(),
            throttle: LogThrottle::new(),
        })
    }

    /// Producer handle for range readings.
    pub fn buffer(&self) -> ReadingBuffer {
        self.buffer.clone()
    }

    /// Producer handle for the cross-check scan.
    pub fn scan_slot(&self) -> ScanSlot {
        self.scans.clone()
    }

    pub fn settings(&self) -> &LayerSettings {
        &self.settings
    }

    pub fn grid(&self) -> &OccupancyGrid {
        &self.grid
    }

    pub fn is_current(&self) -> bool {
        self.staleness.is_current()
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    // ── Cycle ────────────────────────────────────────────────────────────────

    /// Phase one: fuse every buffered reading and widen `bounds` by the
    /// region this layer changed since the previous call.
    pub fn update_bounds(&mut self, robot_x: f64, robot_y: f64, rolling: bool, bounds: &mut Bounds) -> CycleReport {
        let _span = info_span!("update_bounds").entered();

        if rolling {
            self.grid.update_origin(
                robot_x - self.grid.size_in_meters_x() / 2.0,
                robot_y - self.grid.size_in_meters_y() / 2.0,
            );
        }

        let readings = self.buffer.drain_all();
        let scan = self.scans.latest();
        let mut report = CycleReport::default();

        for reading in &readings {
            match self.process_reading(reading, scan.as_ref()) {
                Ok(Some(outcome)) => {
                    report.accepted += 1;
                    report.cells_updated += outcome.cells_updated;
                }
                Ok(None) => report.dropped += 1,
                Err(e @ ReadingError::TransformUnavailable { .. }) => {
                    report.untransformable += 1;
                    if self.throttle.allow("transform_unavailable", READING_ERROR_PERIOD) {
                        error!(frame = %reading.frame_id, error = %e, "dropping range reading");
                    }
                }
                Err(e) => {
                    report.malformed += 1;
                    if self.throttle.allow("malformed_reading", READING_ERROR_PERIOD) {
                        error!(frame = %reading.frame_id, error = %e, "dropping range reading");
                    }
                }
            }
        }

        self.dirty.report_into(bounds);

        if !self.settings.enabled {
            self.staleness.set_current(true);
            return report;
        }

        if let StalenessVerdict::Stale { elapsed } = self.staleness.evaluate()
            && self.throttle.allow("no_readings", STALENESS_PERIOD)
        {
            warn!(
                elapsed_secs = elapsed.as_secs_f64(),
                timeout_secs = self.settings.no_readings_timeout,
                "no range readings received within the expected interval"
            );
        }

        debug!(
            accepted = report.accepted,
            dropped = report.dropped,
            malformed = report.malformed,
            untransformable = report.untransformable,
            "bounds cycle done"
        );
        report
    }

    /// Phase two: merge decisive cells inside `[min_i, max_i) × [min_j, max_j)`
    /// into `master`. Returns the number of master cells written.
    pub fn update_costs(
        &mut self,
        master: &mut ObstacleMap,
        min_i: u32,
        min_j: u32,
        max_i: u32,
        max_j: u32,
    ) -> Result<usize, MapError> {
        if !self.settings.enabled {
            return Ok(0);
        }
        let written = costmap::merge(
            &self.grid,
            master,
            min_i,
            min_j,
            max_i,
            max_j,
            &self.settings.thresholds(),
        )?;
        self.staleness.mark_merged();
        Ok(written)
    }

    /// Classify, transform and fuse a single reading.
    ///
    /// `Ok(None)` means the reading was valid but had nothing to contribute.
    pub fn process_reading(
        &mut self,
        reading: &RangeReading,
        scan: Option<&LaserScan>,
    ) -> Result<Option<FusionOutcome>, ReadingError> {
        let Some(beam) = self.classifier.classify(reading, scan)? else {
            return Ok(None);
        };

        let unavailable = || ReadingError::TransformUnavailable {
            from_frame: reading.frame_id.clone(),
            to_frame: self.global_frame.clone(),
            stamp: reading.stamp,
        };

        if !self.transformer.wait_for_transform(
            &self.global_frame,
            &reading.frame_id,
            reading.stamp,
            self.settings.transform_wait(),
        ) {
            return Err(unavailable());
        }

        let at = |point: Vec3| StampedPoint {
            frame_id: reading.frame_id.clone(),
            stamp: reading.stamp,
            point,
        };
        let origin = self
            .transformer
            .transform_point(&self.global_frame, &at(Vec3::zero()))
            .ok_or_else(unavailable)?;
        let target = self
            .transformer
            .transform_point(&self.global_frame, &at(Vec3::new(beam.range, 0.0, 0.0)))
            .ok_or_else(unavailable)?;

        let footprint = ConeFootprint::resolve((origin.x, origin.y), (target.x, target.y), beam.max_angle, &self.grid);
        let outcome = fuse_beam(
            &mut self.grid,
            &mut self.dirty,
            &footprint,
            &beam,
            reading.max_range,
            &self.settings.fusion_params(),
        );
        self.staleness.record_reading();
        Ok(Some(outcome))
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Forget all evidence: empty buffer, no cross-check scan, prior grid,
    /// whole map dirty. Throttled log sites start fresh.
    pub fn reset(&mut self) {
        debug!("resetting range sensor layer");
        self.deactivate();
        self.scans.clear();
        self.throttle.reset();
        self.grid.reset();
        self.dirty.invalidate_all();
        self.staleness.set_current(true);
        self.activate();
    }

    pub fn activate(&mut self) {
        self.buffer.clear();
    }

    pub fn deactivate(&mut self) {
        self.buffer.clear();
    }

    /// Adopt the master map's geometry. Stored evidence is discarded.
    pub fn match_size(&mut self, master: &ObstacleMap) {
        let (origin_x, origin_y) = master.origin();
        self.grid.resize(
            master.size_x(),
            master.size_y(),
            master.resolution(),
            origin_x,
            origin_y,
        );
        self.dirty.invalidate_all();
    }

    /// Swap in new settings. Invalid settings are refused and the current
    /// ones stay in force.
    pub fn reconfigure(&mut self, settings: LayerSettings) -> Result<(), ConfigError> {
        if let Err(e) = settings.validate() {
            warn!(error = %e, "rejecting range sensor layer reconfiguration");
            return Err(e);
        }

        if settings.enabled != self.settings.enabled {
            self.staleness.set_current(false);
        }
        self.classifier = settings.classifier();
        self.staleness.set_timeout_secs_f64(settings.no_readings_timeout);
        self.settings = settings;

        info!(
            enabled = self.settings.enabled,
            mark_threshold = self.settings.mark_threshold,
            clear_threshold = self.settings.clear_threshold,
            "range sensor layer reconfigured"
        );
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
