//! `conemap-types` – shared vocabulary of the conemap workspace.
//!
//! Range readings and laser scans as delivered by the sensor transport, the
//! sensor-type selector chosen at configuration time, and the error enums that
//! every other crate reports through.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single cone-shaped range measurement (sonar, IR, ultrasonic).
///
/// Fixed-range sensors (`min_range == max_range`) encode their binary output
/// in `range`: `-inf` means "object detected at `min_range`", `+inf` means
/// "nothing detected".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeReading {
    /// Frame the sensor reports in, e.g. `"sonar_front"`.
    pub frame_id: String,
    pub stamp: DateTime<Utc>,
    /// Measured distance (metres), or ±infinity for fixed-range sensors.
    #[serde(with = "range_value")]
    pub range: f64,
    #[serde(with = "range_value")]
    pub min_range: f64,
    #[serde(with = "range_value")]
    pub max_range: f64,
    /// Full opening angle of the beam (radians).
    pub field_of_view: f64,
}

impl RangeReading {
    /// True when the sensor only reports detect / no-detect at a fixed distance.
    pub fn is_fixed_range(&self) -> bool {
        self.min_range == self.max_range
    }
}

/// A wide-field planar scan, used only to cross-check variable-range readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaserScan {
    pub stamp: DateTime<Utc>,
    #[serde(with = "range_values")]
    pub ranges: Vec<f64>,
}

/// How incoming range readings are interpreted.
///
/// Selected once from configuration; `All` picks per message based on
/// whether the declared range bounds coincide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum InputSensorType {
    Fixed,
    Variable,
    #[default]
    All,
}

impl fmt::Display for InputSensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSensorType::Fixed => write!(f, "FIXED"),
            InputSensorType::Variable => write!(f, "VARIABLE"),
            InputSensorType::All => write!(f, "ALL"),
        }
    }
}

impl FromStr for InputSensorType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FIXED" => Ok(InputSensorType::Fixed),
            "VARIABLE" => Ok(InputSensorType::Variable),
            "ALL" | "AUTO" => Ok(InputSensorType::All),
            _ => Err(ConfigError::InvalidSensorType(s.to_string())),
        }
    }
}

impl TryFrom<String> for InputSensorType {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InputSensorType> for String {
    fn from(value: InputSensorType) -> Self {
        value.to_string()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Why a single reading was dropped. Never fatal to the update cycle.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReadingError {
    #[error(
        "fixed distance ranger in frame {frame_id} sent {range}; only -inf (object detected) and +inf (no object) are valid"
    )]
    InvalidFixedRange { frame_id: String, range: f64 },

    #[error("range {range} in frame {frame_id} is not above the sensor minimum {min_range}")]
    BelowMinimumRange {
        frame_id: String,
        range: f64,
        min_range: f64,
    },

    #[error("range in frame {frame_id} is NaN")]
    NanRange { frame_id: String },

    #[error("sensor in frame {frame_id} declares min_range {min_range} above max_range {max_range}")]
    InvalidRangeBounds {
        frame_id: String,
        min_range: f64,
        max_range: f64,
    },

    #[error("reading in frame {frame_id} resolves to a non-finite beam length {range}")]
    NonFiniteRange { frame_id: String, range: f64 },

    #[error("can't transform from {from_frame} to {to_frame} at {stamp}")]
    TransformUnavailable {
        from_frame: String,
        to_frame: String,
        stamp: DateTime<Utc>,
    },
}

/// Configuration rejected at load or reconfigure time.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConfigError {
    #[error("clear_threshold ({clear}) must be below mark_threshold ({mark}), both within [0, 1]")]
    InvalidThresholds { clear: f64, mark: f64 },

    #[error("{field} = {value} is out of range")]
    OutOfRange { field: String, value: f64 },

    #[error("invalid input sensor type: {0}")]
    InvalidSensorType(String),

    #[error("invalid topic names list: element {0} is empty")]
    InvalidTopic(usize),
}

/// Failure while reading or writing the shared obstacle map.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MapError {
    #[error("grid size mismatch: layer is {layer_x}x{layer_y}, master is {master_x}x{master_y}")]
    SizeMismatch {
        layer_x: u32,
        layer_y: u32,
        master_x: u32,
        master_y: u32,
    },
}

// ────────────────────────────────────────────────────────────────────────────
// Serde helpers for non-finite ranges
// ────────────────────────────────────────────────────────────────────────────

/// JSON has no infinity, so non-finite ranges travel as `"inf"`, `"-inf"` or
/// `"nan"`. Plain numbers are accepted as-is.
pub mod range_value {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Named(String),
    }

    pub fn serialize<S: Serializer>(value: &f64, s: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            s.serialize_f64(*value)
        } else if value.is_nan() {
            s.serialize_str("nan")
        } else if *value > 0.0 {
            s.serialize_str("inf")
        } else {
            s.serialize_str("-inf")
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        parse(Raw::deserialize(d)?).map_err(serde::de::Error::custom)
    }

    fn parse(raw: Raw) -> Result<f64, String> {
        match raw {
            Raw::Number(v) => Ok(v),
            Raw::Named(name) => match name.trim().to_ascii_lowercase().as_str() {
                "inf" | "+inf" | "infinity" => Ok(f64::INFINITY),
                "-inf" | "-infinity" => Ok(f64::NEG_INFINITY),
                "nan" => Ok(f64::NAN),
                other => Err(format!("invalid range value `{other}`")),
            },
        }
    }

    pub(crate) fn parse_all<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<f64>, D::Error> {
        Vec::<Raw>::deserialize(d)?
            .into_iter()
            .map(|raw| parse(raw).map_err(serde::de::Error::custom))
            .collect()
    }
}

mod range_values {
    use serde::{Deserializer, Serialize, Serializer};

    struct Wire(f64);

    impl Serialize for Wire {
        fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
            super::range_value::serialize(&self.0, s)
        }
    }

    pub fn serialize<S: Serializer>(values: &[f64], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(values.iter().map(|v| Wire(*v)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<f64>, D::Error> {
        super::range_value::parse_all(d)
    }
}
