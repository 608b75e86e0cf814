//! [`LayerSettings`] – every tunable of a range-sensor layer.
//!
//! Deserializes from the `[layer]` table of a TOML file; every key is
//! optional and falls back to the default below.
//!
//! | Key | Default | Meaning |
//! |---|---|---|
//! | `enabled` | `true` | merge into the shared map at all |
//! | `ns` | `""` | namespace prefixed to every topic |
//! | `topics` | `["/sonar"]` | range topics to subscribe to |
//! | `input_sensor_type` | `"ALL"` | `FIXED`, `VARIABLE` or `ALL` |
//! | `clear_on_max_reading` | `false` | fixed `+inf` clears the cone |
//! | `max_angle` | `0.2182` | cone half-width fallback (rad) |
//! | `phi_v` | `1.2` | range-confidence midpoint (m) |
//! | `mark_threshold` | `0.8` | probability above which a cell is an obstacle |
//! | `clear_threshold` | `0.2` | probability below which a cell is free |
//! | `no_readings_timeout` | `0.0` | seconds before the layer is stale, `0` disables |
//! | `transform_tolerance` | `0.1` | max wait for a frame transform (s) |
//! | `close_distance` | `0.2` | detections nearer than this skip arc marking (m) |
//! | `scan_cross_check` | absent | enables the laser-scan cross-check |

use std::time::Duration;

use conemap_perception::classifier::Classifier;
use conemap_perception::costmap::Thresholds;
use conemap_perception::fusion::{DEFAULT_CLOSE_DISTANCE, FusionParams};
use conemap_perception::scan_check::{DEFAULT_HALF_WINDOW, DEFAULT_TRUST_DISTANCE, ScanCrossCheck};
use conemap_types::{ConfigError, InputSensorType};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Settings of one range-sensor layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub ns: String,

    #[serde(default = "default_topics")]
    pub topics: Vec<String>,

    #[serde(default)]
    pub input_sensor_type: InputSensorType,

    #[serde(default)]
    pub clear_on_max_reading: bool,

    #[serde(default = "default_max_angle")]
    pub max_angle: f64,

    #[serde(default = "default_phi_v")]
    pub phi_v: f64,

    #[serde(default = "default_mark_threshold")]
    pub mark_threshold: f64,

    #[serde(default = "default_clear_threshold")]
    pub clear_threshold: f64,

    #[serde(default)]
    pub no_readings_timeout: f64,

    #[serde(default = "default_transform_tolerance")]
    pub transform_tolerance: f64,

    #[serde(default = "default_close_distance")]
    pub close_distance: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_cross_check: Option<ScanCheckSettings>,
}

/// `[layer.scan_cross_check]` table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanCheckSettings {
    #[serde(default = "default_trust_distance")]
    pub trust_distance: f64,

    #[serde(default = "default_half_window")]
    pub half_window: usize,
}

fn default_enabled() -> bool {
    true
}
fn default_topics() -> Vec<String> {
    vec!["/sonar".to_string()]
}
fn default_max_angle() -> f64 {
    12.5_f64.to_radians()
}
fn default_phi_v() -> f64 {
    1.2
}
fn default_mark_threshold() -> f64 {
    0.8
}
fn default_clear_threshold() -> f64 {
    0.2
}
fn default_transform_tolerance() -> f64 {
    0.1
}
fn default_close_distance() -> f64 {
    DEFAULT_CLOSE_DISTANCE
}
fn default_trust_distance() -> f64 {
    DEFAULT_TRUST_DISTANCE
}
fn default_half_window() -> usize {
    DEFAULT_HALF_WINDOW
}

impl Default for LayerSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            ns: String::new(),
            topics: default_topics(),
            input_sensor_type: InputSensorType::default(),
            clear_on_max_reading: false,
            max_angle: default_max_angle(),
            phi_v: default_phi_v(),
            mark_threshold: default_mark_threshold(),
            clear_threshold: default_clear_threshold(),
            no_readings_timeout: 0.0,
            transform_tolerance: default_transform_tolerance(),
            close_distance: default_close_distance(),
            scan_cross_check: None,
        }
    }
}

impl Default for ScanCheckSettings {
    fn default() -> Self {
        Self {
            trust_distance: default_trust_distance(),
            half_window: default_half_window(),
        }
    }
}

impl LayerSettings {
    /// Reject settings the layer cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = 0.0..=1.0;
        if !unit.contains(&self.mark_threshold)
            || !unit.contains(&self.clear_threshold)
            || self.clear_threshold >= self.mark_threshold
        {
            return Err(ConfigError::InvalidThresholds {
                clear: self.clear_threshold,
                mark: self.mark_threshold,
            });
        }

        let positive = [("max_angle", self.max_angle), ("phi_v", self.phi_v)];
        for (field, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(out_of_range(field, value));
            }
        }

        let non_negative = [
            ("no_readings_timeout", self.no_readings_timeout),
            ("transform_tolerance", self.transform_tolerance),
            ("close_distance", self.close_distance),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(out_of_range(field, value));
            }
        }

        if let Some(check) = &self.scan_cross_check
            && (!check.trust_distance.is_finite() || check.trust_distance < 0.0)
        {
            return Err(out_of_range("scan_cross_check.trust_distance", check.trust_distance));
        }

        if let Some(i) = self.topics.iter().position(|t| t.trim().is_empty()) {
            return Err(ConfigError::InvalidTopic(i));
        }
        if self.topics.is_empty() {
            warn!("empty topic names list: range sensor layer will have no effect on the map");
        }

        Ok(())
    }

    /// Topics with `ns` prepended, joined by exactly one `/`.
    pub fn resolved_topics(&self) -> Vec<String> {
        let ns = self.ns.trim_end_matches('/');
        self.topics
            .iter()
            .map(|topic| {
                if ns.is_empty() {
                    topic.clone()
                } else {
                    format!("{ns}/{}", topic.trim_start_matches('/'))
                }
            })
            .collect()
    }

    pub fn classifier(&self) -> Classifier {
        let classifier = Classifier::new(self.input_sensor_type, self.clear_on_max_reading, self.max_angle);
        match self.scan_cross_check {
            Some(check) => classifier.with_scan_check(ScanCrossCheck {
                trust_distance: check.trust_distance,
                half_window: check.half_window,
            }),
            None => classifier,
        }
    }

    pub fn fusion_params(&self) -> FusionParams {
        FusionParams {
            phi_v: self.phi_v,
            close_distance: self.close_distance,
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds::from_probabilities(self.mark_threshold, self.clear_threshold)
    }

    pub fn transform_wait(&self) -> Duration {
        Duration::from_secs_f64(self.transform_tolerance)
    }
}

fn out_of_range(field: &str, value: f64) -> ConfigError {
    ConfigError::OutOfRange {
        field: field.to_string(),
        value,
    }
}
