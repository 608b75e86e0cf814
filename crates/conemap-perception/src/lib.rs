//! `conemap-perception` – the probabilistic core of a range-sensor layer.
//!
//! Turns individual cone-shaped range readings into persistent per-cell
//! occupancy evidence, then into discrete obstacle verdicts.
//!
//! # Modules
//!
//! - [`transform`] – [`TfEngine`][transform::TfEngine] and the
//!   [`FrameTransformer`][transform::FrameTransformer] seam used to bring
//!   sensor points into the global frame.
//! - [`classifier`] – fixed / variable / all routing of raw readings into a
//!   [`BeamUpdate`][classifier::BeamUpdate].
//! - [`scan_check`] – optional wide-field scan cross-check.
//! - [`cone`] – beam footprint and candidate cell window.
//! - [`sensor_model`] – the four-zone likelihood model.
//! - [`grid`] – [`OccupancyGrid`][grid::OccupancyGrid] and the binary Bayes
//!   update.
//! - [`fusion`] – folds one beam into the grid.
//! - [`bounds`] – world-frame [`Bounds`][bounds::Bounds] and the per-cycle
//!   [`DirtyRegion`][bounds::DirtyRegion].
//! - [`costmap`] – [`ObstacleMap`][costmap::ObstacleMap] and the
//!   never-downgrade threshold [`merge`][costmap::merge].

pub mod bounds;
pub mod classifier;
pub mod cone;
pub mod costmap;
pub mod fusion;
pub mod grid;
pub mod scan_check;
pub mod sensor_model;
pub mod transform;
