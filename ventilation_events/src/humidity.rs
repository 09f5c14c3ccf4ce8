//! Absolute humidity and the ventilation decision
//!
//! Absolute humidity uses the Magnus approximation of the saturation vapour
//! pressure over water.
use serde::{Deserialize, Serialize};

use crate::SensorReading;

const MAGNUS_COEFFICIENT: f64 = 6.112;
const MAGNUS_A: f64 = 17.67;
const MAGNUS_B: f64 = 243.5;
const VAPOUR_CONSTANT: f64 = 2.1674;
const ZERO_CELSIUS: f64 = 273.15;

pub const DEFAULT_THRESHOLD: f64 = 2.0;
pub const DEFAULT_MIN_HUMIDITY: f64 = 50.0;

/// Absolute humidity in g/m³, rounded to two decimals.
///
/// Temperatures at or below absolute zero have no meaning here and give NaN,
/// as do NaN inputs.
pub fn absolute_humidity(relative_humidity: f64, temperature: f64) -> f64 {
    if temperature <= -ZERO_CELSIUS {
        return f64::NAN;
    }
    let saturation =
        MAGNUS_COEFFICIENT * ((MAGNUS_A * temperature) / (temperature + MAGNUS_B)).exp();
    round2(saturation * relative_humidity * VAPOUR_CONSTANT / (ZERO_CELSIUS + temperature))
}

/// Round half away from zero to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// When a room is worth airing.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct Limits {
    /// Minimum inside-minus-outside absolute humidity gap, g/m³.
    pub threshold: f64,
    /// Inside relative humidity has to be above this, %.
    pub min_humidity: f64,
}

impl Limits {
    pub const fn new(threshold: f64, min_humidity: f64) -> Self {
        Self {
            threshold,
            min_humidity,
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_MIN_HUMIDITY)
    }
}

#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct RoomResult {
    pub inside_absolute_humidity: f64,
    pub outside_absolute_humidity: f64,
    pub diff: f64,
    pub ventilate: bool,
}

/// Compare both sides of a room and decide whether opening the windows would
/// dry it out.
///
/// Both comparisons are strict. A NaN anywhere makes them false, so a room
/// with an unpopulated sensor never recommends ventilation.
pub fn evaluate_room(inside: SensorReading, outside: SensorReading, limits: Limits) -> RoomResult {
    let inside_absolute_humidity = inside.absolute_humidity();
    let outside_absolute_humidity = outside.absolute_humidity();
    let diff = round2(inside_absolute_humidity - outside_absolute_humidity);

    RoomResult {
        inside_absolute_humidity,
        outside_absolute_humidity,
        diff,
        ventilate: diff > limits.threshold && inside.relative_humidity > limits.min_humidity,
    }
}
