//! Replay configuration – reads the TOML file given on the command line.
//!
//! ```toml
//! [layer]                       # LayerSettings, every key optional
//! input_sensor_type = "VARIABLE"
//! no_readings_timeout = 1.0
//!
//! [map]
//! size_x = 200
//! size_y = 200
//! resolution = 0.05
//! global_frame = "map"
//!
//! [[frames]]                    # static transforms, parent → child
//! parent = "map"
//! child = "base_link"
//! x = 5.0
//! y = 5.0
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use conemap_perception::costmap::ObstacleMap;
use conemap_perception::transform::{TfEngine, Transform3D};
use conemap_runtime::LayerSettings;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// Geometry of the shared map and how the cycle is driven.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapSettings {
    #[serde(default = "default_size")]
    pub size_x: u32,

    #[serde(default = "default_size")]
    pub size_y: u32,

    #[serde(default = "default_resolution")]
    pub resolution: f64,

    #[serde(default)]
    pub origin_x: f64,

    #[serde(default)]
    pub origin_y: f64,

    #[serde(default = "default_global_frame")]
    pub global_frame: String,

    /// Frame whose position centres a rolling window.
    #[serde(default = "default_robot_frame")]
    pub robot_frame: String,

    #[serde(default)]
    pub rolling_window: bool,

    /// Update cycles per second.
    #[serde(default = "default_update_frequency")]
    pub update_frequency: f64,
}

/// One static `parent → child` transform in the plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSettings {
    pub parent: String,
    pub child: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub yaw: f64,
}

/// Everything the replay command needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayConfig {
    pub layer: LayerSettings,
    pub map: MapSettings,
    pub frames: Vec<FrameSettings>,
}

/// File shape before the `[layer]` table is validated.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    layer: Option<toml::Value>,
    #[serde(default)]
    map: MapSettings,
    #[serde(default)]
    frames: Vec<FrameSettings>,
}

fn default_size() -> u32 {
    200
}
fn default_resolution() -> f64 {
    0.05
}
fn default_global_frame() -> String {
    "map".to_string()
}
fn default_robot_frame() -> String {
    "base_link".to_string()
}
fn default_update_frequency() -> f64 {
    5.0
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            size_x: default_size(),
            size_y: default_size(),
            resolution: default_resolution(),
            origin_x: 0.0,
            origin_y: 0.0,
            global_frame: default_global_frame(),
            robot_frame: default_robot_frame(),
            rolling_window: false,
            update_frequency: default_update_frequency(),
        }
    }
}

impl MapSettings {
    pub fn cycle_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.update_frequency)
    }

    pub fn build_master(&self) -> ObstacleMap {
        ObstacleMap::new(self.size_x, self.size_y, self.resolution, self.origin_x, self.origin_y)
    }
}

impl ReplayConfig {
    pub fn build_transforms(&self) -> TfEngine {
        let mut tf = TfEngine::new();
        for f in &self.frames {
            tf.set_transform(&f.parent, &f.child, Transform3D::planar(f.x, f.y, f.z, f.yaw));
        }
        tf
    }
}

/// Load the replay config. A missing or unparsable file is an error; a bad
/// `[layer]` table falls back to default layer settings.
pub fn load_from(path: &Path) -> Result<ReplayConfig, String> {
    load_with(path, |var| std::env::var(var).ok())
}

/// [`load_from`] with an explicit variable lookup instead of the process
/// environment.
pub(crate) fn load_with(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<ReplayConfig, String> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let raw: RawConfig = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;

    if raw.map.size_x == 0 || raw.map.size_y == 0 || !(raw.map.resolution > 0.0) {
        return Err(format!(
            "Invalid map geometry: {}x{} cells at {} m",
            raw.map.size_x, raw.map.size_y, raw.map.resolution
        ));
    }
    if !raw.map.update_frequency.is_finite() || raw.map.update_frequency <= 0.0 {
        return Err(format!("Invalid update frequency: {} Hz", raw.map.update_frequency));
    }

    let mut layer = layer_settings(raw.layer);
    apply_overrides(&mut layer, lookup);
    if let Err(e) = layer.validate() {
        error!(error = %e, "environment overrides produced invalid layer settings; using defaults");
        layer = LayerSettings::default();
    }

    Ok(ReplayConfig {
        layer,
        map: raw.map,
        frames: raw.frames,
    })
}

fn layer_settings(table: Option<toml::Value>) -> LayerSettings {
    let Some(table) = table else {
        return LayerSettings::default();
    };
    let parsed = table
        .try_into::<LayerSettings>()
        .map_err(|e| e.to_string())
        .and_then(|s| s.validate().map(|()| s).map_err(|e| e.to_string()));
    parsed.unwrap_or_else(|e| {
        error!(error = %e, "invalid [layer] section; using default layer settings");
        LayerSettings::default()
    })
}

/// Apply `CONEMAP_*` overrides to `layer`.
///
/// | Variable | Field |
/// |---|---|
/// | `CONEMAP_MARK_THRESHOLD` | `mark_threshold` |
/// | `CONEMAP_CLEAR_THRESHOLD` | `clear_threshold` |
/// | `CONEMAP_NO_READINGS_TIMEOUT` | `no_readings_timeout` |
fn apply_overrides(layer: &mut LayerSettings, lookup: impl Fn(&str) -> Option<String>) {
    let overrides: [(&str, &mut f64); 3] = [
        ("CONEMAP_MARK_THRESHOLD", &mut layer.mark_threshold),
        ("CONEMAP_CLEAR_THRESHOLD", &mut layer.clear_threshold),
        ("CONEMAP_NO_READINGS_TIMEOUT", &mut layer.no_readings_timeout),
    ];
    for (var, field) in overrides {
        if let Some(v) = lookup(var) {
            match v.trim().parse::<f64>() {
                Ok(value) => *field = value,
                Err(_) => warn!(variable = var, value = %v, "ignoring non-numeric override"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conemap_types::InputSensorType;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("tmp file");
        file.write_all(body.as_bytes()).expect("write");
        file
    }

    #[test]
    fn full_config_loads() {
        let file = write_config(
            r#"
            [layer]
            input_sensor_type = "FIXED"
            clear_on_max_reading = true

            [map]
            size_x = 80
            size_y = 60
            resolution = 0.1
            rolling_window = true

            [[frames]]
            parent = "map"
            child = "base_link"
            x = 4.0
            y = 3.0

            [[frames]]
            parent = "base_link"
            child = "sonar_front"
            x = 0.2
            yaw = 0.0
            "#,
        );
        let cfg = load_from(file.path()).expect("load");
        assert_eq!(cfg.layer.input_sensor_type, InputSensorType::Fixed);
        assert!(cfg.layer.clear_on_max_reading);
        assert_eq!((cfg.map.size_x, cfg.map.size_y), (80, 60));
        assert!(cfg.map.rolling_window);
        assert_eq!(cfg.frames.len(), 2);

        let tf = cfg.build_transforms();
        let pose = tf.lookup("map", "sonar_front").expect("chain");
        assert!((pose.translation.x - 4.2).abs() < 1e-9);
        assert!((pose.translation.y - 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let file = write_config("");
        let cfg = load_from(file.path()).expect("load");
        assert_eq!(cfg.map, MapSettings::default());
        assert!(cfg.frames.is_empty());
        assert_eq!(cfg.layer.topics, vec!["/sonar"]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let err = load_from(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.contains("Failed to read config"));
    }

    #[test]
    fn unparsable_file_is_an_error() {
        let file = write_config("[map\nsize_x = ");
        assert!(load_from(file.path()).unwrap_err().contains("Failed to parse config"));
    }

    #[test]
    fn invalid_layer_section_falls_back_to_defaults() {
        let file = write_config(
            r#"
            [layer]
            mark_threshold = 0.1
            clear_threshold = 0.5
            "#,
        );
        let cfg = load_from(file.path()).expect("load");
        assert_eq!(cfg.layer.mark_threshold, 0.8);
        assert_eq!(cfg.layer.clear_threshold, 0.2);

        let file = write_config("[layer]\ninput_sensor_type = \"lidar\"\n");
        let cfg = load_from(file.path()).expect("load");
        assert_eq!(cfg.layer.input_sensor_type, InputSensorType::All);
    }

    #[test]
    fn zero_sized_map_is_an_error() {
        let file = write_config("[map]\nsize_x = 0\n");
        assert!(load_from(file.path()).unwrap_err().contains("Invalid map geometry"));

        let file = write_config("[map]\nupdate_frequency = 0.0\n");
        assert!(load_from(file.path()).unwrap_err().contains("Invalid update frequency"));
    }

    fn lookup(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name| vars.iter().find(|(k, _)| *k == name).map(|(_, v)| v.to_string())
    }

    #[test]
    fn overrides_apply_and_ignore_garbage() {
        let mut layer = LayerSettings::default();
        apply_overrides(
            &mut layer,
            lookup(&[
                ("CONEMAP_MARK_THRESHOLD", "0.9"),
                ("CONEMAP_NO_READINGS_TIMEOUT", "2.5"),
                ("CONEMAP_CLEAR_THRESHOLD", "not-a-number"),
            ]),
        );
        assert_eq!(layer.mark_threshold, 0.9);
        assert_eq!(layer.no_readings_timeout, 2.5);
        assert_eq!(layer.clear_threshold, 0.2);
    }

    #[test]
    fn override_breaking_validation_reverts_to_defaults() {
        let file = write_config("[layer]\nphi_v = 2.0\n");
        let cfg = load_with(file.path(), lookup(&[("CONEMAP_MARK_THRESHOLD", "0.1")])).expect("load");
        assert_eq!(cfg.layer, LayerSettings::default());

        let cfg = load_with(file.path(), lookup(&[])).expect("load");
        assert_eq!(cfg.layer.phi_v, 2.0);
    }
}
