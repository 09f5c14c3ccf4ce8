use serde::{Deserialize, Serialize};

pub mod humidity;
pub mod v2;

pub use humidity::{absolute_humidity, evaluate_room, Limits, RoomResult};

/// A relative humidity and temperature pair from one side of a room's wall.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct SensorReading {
    pub relative_humidity: f64,
    pub temperature: f64,
}

impl SensorReading {
    pub const fn new(relative_humidity: f64, temperature: f64) -> Self {
        Self {
            relative_humidity,
            temperature,
        }
    }

    /// Reading used when a sensor has not reported anything yet.
    pub const fn missing() -> Self {
        Self::new(f64::NAN, f64::NAN)
    }

    pub fn is_complete(&self) -> bool {
        !self.relative_humidity.is_nan() && !self.temperature.is_nan()
    }

    pub fn absolute_humidity(&self) -> f64 {
        absolute_humidity(self.relative_humidity, self.temperature)
    }
}
