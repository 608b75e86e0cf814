//! Routes each reading to fixed-range or variable-range handling and
//! normalises it into a [`BeamUpdate`].
//!
//! | sensor | `range` | outcome |
//! |---|---|---|
//! | fixed    | `-inf`              | detection at `min_range` |
//! | fixed    | `+inf`              | dropped, or cone clear if `clear_on_max_reading` |
//! | fixed    | anything else       | [`ReadingError::InvalidFixedRange`] |
//! | variable | `<= min_range`      | [`ReadingError::BelowMinimumRange`] |
//! | variable | `>= max_range`      | cone clear at `max_range` |
//! | variable | in between          | detection at `range` |
//!
//! Either kind is rejected when `min_range > max_range`
//! ([`ReadingError::InvalidRangeBounds`]) or when the beam length it resolves
//! to is not finite ([`ReadingError::NonFiniteRange`]).

use conemap_types::{InputSensorType, LaserScan, RangeReading, ReadingError};

use crate::scan_check::ScanCrossCheck;

/// A reading after classification: what the geometry and fusion stages need.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamUpdate {
    /// Distance along the beam axis to the target point (metres, finite).
    pub range: f64,
    /// Force every in-cone cell toward free instead of applying the sensor
    /// model.
    pub clear_cone: bool,
    /// Cone half-width used for this reading (radians).
    pub max_angle: f64,
}

/// Classification policy, fixed at configuration time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classifier {
    pub mode: InputSensorType,
    pub clear_on_max_reading: bool,
    /// Half-width used when a reading carries no usable field of view.
    pub default_max_angle: f64,
    pub scan_check: Option<ScanCrossCheck>,
}

impl Classifier {
    pub fn new(mode: InputSensorType, clear_on_max_reading: bool, default_max_angle: f64) -> Self {
        Self {
            mode,
            clear_on_max_reading,
            default_max_angle,
            scan_check: None,
        }
    }

    pub fn with_scan_check(mut self, check: ScanCrossCheck) -> Self {
        self.scan_check = Some(check);
        self
    }

    /// `Ok(None)` means the reading is valid but carries nothing to fuse.
    pub fn classify(
        &self,
        reading: &RangeReading,
        latest_scan: Option<&LaserScan>,
    ) -> Result<Option<BeamUpdate>, ReadingError> {
        let (min, max) = (reading.min_range, reading.max_range);
        if min.is_nan() || max.is_nan() || min > max {
            return Err(ReadingError::InvalidRangeBounds {
                frame_id: reading.frame_id.clone(),
                min_range: reading.min_range,
                max_range: reading.max_range,
            });
        }

        let beam = match self.mode {
            InputSensorType::Fixed => self.fixed(reading)?,
            InputSensorType::Variable => self.variable(reading, latest_scan)?,
            InputSensorType::All if reading.is_fixed_range() => self.fixed(reading)?,
            InputSensorType::All => self.variable(reading, latest_scan)?,
        };

        match beam {
            Some(b) if !b.range.is_finite() => Err(ReadingError::NonFiniteRange {
                frame_id: reading.frame_id.clone(),
                range: b.range,
            }),
            other => Ok(other),
        }
    }

    fn fixed(&self, reading: &RangeReading) -> Result<Option<BeamUpdate>, ReadingError> {
        if !reading.range.is_infinite() {
            return Err(ReadingError::InvalidFixedRange {
                frame_id: reading.frame_id.clone(),
                range: reading.range,
            });
        }

        let clear_cone = reading.range > 0.0;
        if clear_cone && !self.clear_on_max_reading {
            return Ok(None);
        }

        Ok(Some(BeamUpdate {
            range: reading.min_range,
            clear_cone,
            max_angle: self.max_angle_for(reading),
        }))
    }

    fn variable(
        &self,
        reading: &RangeReading,
        latest_scan: Option<&LaserScan>,
    ) -> Result<Option<BeamUpdate>, ReadingError> {
        if reading.range.is_nan() {
            return Err(ReadingError::NanRange {
                frame_id: reading.frame_id.clone(),
            });
        }
        if reading.range <= reading.min_range {
            return Err(ReadingError::BelowMinimumRange {
                frame_id: reading.frame_id.clone(),
                range: reading.range,
                min_range: reading.min_range,
            });
        }

        let max_angle = self.max_angle_for(reading);
        if reading.range >= reading.max_range {
            return Ok(Some(BeamUpdate {
                range: reading.max_range,
                clear_cone: true,
                max_angle,
            }));
        }

        let corroborated = match (self.scan_check, latest_scan) {
            (Some(check), Some(scan)) => check.corroborates(scan, reading.range),
            _ => false,
        };

        Ok(Some(BeamUpdate {
            range: reading.range,
            clear_cone: corroborated,
            max_angle,
        }))
    }

    fn max_angle_for(&self, reading: &RangeReading) -> f64 {
        if reading.field_of_view.is_finite() && reading.field_of_view > 0.0 {
            reading.field_of_view / 2.0
        } else {
            self.default_max_angle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn reading(range: f64, min_range: f64, max_range: f64) -> RangeReading {
        RangeReading {
            frame_id: "sonar_front".to_string(),
            stamp: Utc::now(),
            range,
            min_range,
            max_range,
            field_of_view: 0.5,
        }
    }

    fn classifier(mode: InputSensorType, clear_on_max: bool) -> Classifier {
        Classifier::new(mode, clear_on_max, 0.1)
    }

    #[test]
    fn fixed_detection_lands_at_min_range() {
        let c = classifier(InputSensorType::Fixed, false);
        let beam = c.classify(&reading(f64::NEG_INFINITY, 2.0, 2.0), None).unwrap().unwrap();
        assert_eq!(beam.range, 2.0);
        assert!(!beam.clear_cone);
        assert!((beam.max_angle - 0.25).abs() < 1e-12);
    }

    #[test]
    fn fixed_no_detection_dropped_without_clearing() {
        let c = classifier(InputSensorType::Fixed, false);
        assert_eq!(c.classify(&reading(f64::INFINITY, 2.0, 2.0), None), Ok(None));
    }

    #[test]
    fn fixed_no_detection_clears_when_enabled() {
        let c = classifier(InputSensorType::Fixed, true);
        let beam = c.classify(&reading(f64::INFINITY, 2.0, 2.0), None).unwrap().unwrap();
        assert!(beam.clear_cone);
        assert_eq!(beam.range, 2.0);
    }

    #[test]
    fn fixed_finite_value_is_malformed() {
        let c = classifier(InputSensorType::Fixed, true);
        assert!(matches!(
            c.classify(&reading(1.3, 2.0, 2.0), None),
            Err(ReadingError::InvalidFixedRange { .. })
        ));
    }

    #[test]
    fn variable_at_or_below_min_is_rejected() {
        let c = classifier(InputSensorType::Variable, false);
        for range in [0.1, 0.05, -1.0] {
            assert!(matches!(
                c.classify(&reading(range, 0.1, 10.0), None),
                Err(ReadingError::BelowMinimumRange { .. })
            ));
        }
        assert!(matches!(
            c.classify(&reading(f64::NAN, 0.1, 10.0), None),
            Err(ReadingError::NanRange { .. })
        ));
    }

    #[test]
    fn variable_max_reading_clears_capped_at_max_range() {
        let c = classifier(InputSensorType::Variable, false);
        let beam = c.classify(&reading(f64::INFINITY, 0.1, 10.0), None).unwrap().unwrap();
        assert!(beam.clear_cone);
        assert_eq!(beam.range, 10.0);
    }

    #[test]
    fn infinite_max_range_clear_is_rejected() {
        let c = classifier(InputSensorType::Variable, false);
        assert!(matches!(
            c.classify(&reading(f64::INFINITY, 0.1, f64::INFINITY), None),
            Err(ReadingError::NonFiniteRange { .. })
        ));
        // A finite detection from the same sensor is still fine.
        let beam = c.classify(&reading(3.0, 0.1, f64::INFINITY), None).unwrap().unwrap();
        assert_eq!(beam.range, 3.0);
    }

    #[test]
    fn fixed_detection_at_infinite_range_is_rejected() {
        let c = classifier(InputSensorType::All, true);
        let inf = f64::INFINITY;
        for range in [f64::NEG_INFINITY, inf] {
            assert!(matches!(
                c.classify(&reading(range, inf, inf), None),
                Err(ReadingError::NonFiniteRange { .. })
            ));
        }
    }

    #[test]
    fn inverted_or_nan_bounds_are_rejected() {
        for mode in [InputSensorType::Fixed, InputSensorType::Variable, InputSensorType::All] {
            let c = classifier(mode, true);
            assert!(matches!(
                c.classify(&reading(2.0, 5.0, 1.0), None),
                Err(ReadingError::InvalidRangeBounds { .. })
            ));
            assert!(matches!(
                c.classify(&reading(2.0, f64::NAN, 4.0), None),
                Err(ReadingError::InvalidRangeBounds { .. })
            ));
        }
    }

    #[test]
    fn variable_in_range_is_detection() {
        let c = classifier(InputSensorType::Variable, true);
        let beam = c.classify(&reading(5.0, 0.1, 10.0), None).unwrap().unwrap();
        assert!(!beam.clear_cone);
        assert_eq!(beam.range, 5.0);
    }

    #[test]
    fn all_mode_dispatches_on_range_bounds() {
        let c = classifier(InputSensorType::All, false);
        // Equal bounds → fixed rules, so a finite value is malformed.
        assert!(c.classify(&reading(2.0, 2.0, 2.0), None).is_err());
        // Distinct bounds → variable rules.
        assert!(c.classify(&reading(2.0, 0.1, 4.0), None).unwrap().is_some());
    }

    #[test]
    fn missing_field_of_view_falls_back_to_default() {
        let c = classifier(InputSensorType::Variable, false);
        let mut r = reading(2.0, 0.1, 4.0);
        r.field_of_view = 0.0;
        let beam = c.classify(&r, None).unwrap().unwrap();
        assert_eq!(beam.max_angle, 0.1);
    }

    #[test]
    fn corroborating_scan_turns_detection_into_clear() {
        let c = classifier(InputSensorType::Variable, false).with_scan_check(ScanCrossCheck::default());
        let scan = LaserScan {
            stamp: Utc::now(),
            ranges: vec![2.2; 200],
        };
        let beam = c.classify(&reading(2.0, 0.1, 4.0), Some(&scan)).unwrap().unwrap();
        assert!(beam.clear_cone);

        // Without a scan the check has nothing to say.
        let beam = c.classify(&reading(2.0, 0.1, 4.0), None).unwrap().unwrap();
        assert!(!beam.clear_cone);
    }
}
