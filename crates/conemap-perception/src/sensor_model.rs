//! Sensor likelihood model for cone-shaped range sensors.
//!
//! Maps a cell's polar offset from the beam (`theta`: angular deviation from
//! the beam axis, `phi`: distance from the sensor) and the measured range `r`
//! to the probability that the cell is occupied.
//!
//! Two attenuation factors scale the model's confidence:
//!
//! ```text
//! gamma(theta) = 1 - (theta / max_angle)^2      for |theta| <= max_angle, else 0
//! delta(phi)   = 1 - (1 + tanh(2 (phi - phi_v))) / 2
//! lambda       = delta(phi) * gamma(theta)
//! ```
//!
//! Along `phi` the model has four zones, with `e = resolution`:
//!
//! | zone | `phi` | probability |
//! |------|-------|-------------|
//! | free     | `[0, r - 2er)`      | `(1 - lambda) / 2` |
//! | ramp     | `[r - 2er, r - er)` | `lambda/2 * ((phi - (r - 2er)) / er)^2 + (1 - lambda)/2` |
//! | hit      | `[r - er, r + er)`  | `lambda * (1 - J^2/2 - 1/2) + 1/2`, `J = (r - phi) / er` |
//! | shadow   | beyond              | `1/2` |
//!
//! The zone edges are not perfectly continuous; the jumps are part of the
//! model and must stay.

/// The likelihood model, parameterised by the cone half-width, the range
/// confidence midpoint and the map resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorModel {
    /// Cone half-width (radians).
    pub max_angle: f64,
    /// Range at which `delta` crosses 0.5 (metres).
    pub phi_v: f64,
    /// Map resolution; doubles as the relative width of the hit zone.
    pub resolution: f64,
}

impl SensorModel {
    pub fn new(max_angle: f64, phi_v: f64, resolution: f64) -> Self {
        Self {
            max_angle,
            phi_v,
            resolution,
        }
    }

    /// Angular attenuation.
    pub fn gamma(&self, theta: f64) -> f64 {
        if theta.abs() > self.max_angle {
            0.0
        } else {
            1.0 - (theta / self.max_angle).powi(2)
        }
    }

    /// Range attenuation.
    pub fn delta(&self, phi: f64) -> f64 {
        1.0 - (1.0 + (2.0 * (phi - self.phi_v)).tanh()) / 2.0
    }

    /// Occupancy probability contributed by a reading of range `r` to a cell
    /// at distance `phi` and angular deviation `theta`.
    pub fn probability(&self, r: f64, phi: f64, theta: f64) -> f64 {
        let lambda = self.delta(phi) * self.gamma(theta);
        let e = self.resolution;

        if (0.0..r - 2.0 * e * r).contains(&phi) {
            (1.0 - lambda) * 0.5
        } else if phi < r - e * r {
            lambda * 0.5 * ((phi - (r - 2.0 * e * r)) / (e * r)).powi(2) + (1.0 - lambda) * 0.5
        } else if phi < r + e * r {
            let j = (r - phi) / (e * r);
            lambda * ((1.0 - 0.5 * j.powi(2)) - 0.5) + 0.5
        } else {
            0.5
        }
    }
}
