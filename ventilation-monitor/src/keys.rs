//! Names of the states this monitor owns
use serde::{Deserialize, Serialize};

pub const TOTAL_RECOMMENDATIONS: &str = "totalVentilationRecommendations";
pub const ABSOLUTE_HUMIDITY: &str = "absoluteHumidity";
pub const OUTSIDE_ABSOLUTE_HUMIDITY: &str = "outsideAbsoluteHumidity";
pub const VENTILATION_RECOMMENDATION: &str = "ventilationRecommendation";

/// Optional prefix for every state the monitor creates. Sensor states belong
/// to other adapters and are never prefixed.
#[derive(Debug, PartialEq, Eq, Clone, Default, Serialize, Deserialize)]
pub struct Namespace(String);

impl Namespace {
    pub fn new(prefix: &str) -> Self {
        Self(prefix.trim().trim_end_matches('.').to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn qualify(&self, name: &str) -> String {
        if self.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.0, name)
        }
    }

    pub fn total(&self) -> String {
        self.qualify(TOTAL_RECOMMENDATIONS)
    }

    pub fn room(&self, room_name: &str) -> RoomKeys {
        let room = self.qualify(room_name);
        RoomKeys {
            absolute_humidity: format!("{}.{}", room, ABSOLUTE_HUMIDITY),
            outside_absolute_humidity: format!("{}.{}", room, OUTSIDE_ABSOLUTE_HUMIDITY),
            ventilation_recommendation: format!("{}.{}", room, VENTILATION_RECOMMENDATION),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RoomKeys {
    pub absolute_humidity: String,
    pub outside_absolute_humidity: String,
    pub ventilation_recommendation: String,
}
