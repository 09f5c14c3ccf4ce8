//! Settings and the room list
//!
//! Everything is read once at startup from the environment (and an optional
//! `.env` file). The room list comes from a JSON file when
//! `VENTILATION_ROOMS` is set, otherwise the built-in rooms are used.
use std::{collections::HashSet, env, fs, str::FromStr};

use eyre::{eyre, Error, Result, WrapErr};
use log::info;
use serde::{Deserialize, Serialize};

use ventilation_events::{
    humidity::{DEFAULT_MIN_HUMIDITY, DEFAULT_THRESHOLD},
    Limits,
};

use crate::keys::Namespace;

pub const ROOMS_VAR: &str = "VENTILATION_ROOMS";
pub const NAMESPACE_VAR: &str = "VENTILATION_NAMESPACE";
pub const LOGGING_VAR: &str = "VENTILATION_LOGGING";
pub const SHARED_KEYS_VAR: &str = "VENTILATION_SHARED_KEYS";

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomConfig {
    pub room_name: String,
    pub outside_humidity_key: String,
    pub outside_temperature_key: String,
    pub inside_humidity_key: String,
    pub inside_temperature_key: String,
    #[serde(default = "default_threshold")]
    pub humidity_threshold: f64,
    #[serde(default = "default_min_humidity")]
    pub min_humidity: f64,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

fn default_min_humidity() -> f64 {
    DEFAULT_MIN_HUMIDITY
}

impl RoomConfig {
    pub fn limits(&self) -> Limits {
        Limits::new(self.humidity_threshold, self.min_humidity)
    }

    /// The states that trigger an evaluation of this room, in trigger order.
    pub fn sensor_keys(&self) -> [&str; 4] {
        [
            self.inside_humidity_key.as_str(),
            self.inside_temperature_key.as_str(),
            self.outside_humidity_key.as_str(),
            self.outside_temperature_key.as_str(),
        ]
    }

    fn validate(&self) -> Result<()> {
        if self.room_name.trim().is_empty() {
            return Err(eyre!("room name must not be empty"));
        }
        if !(self.humidity_threshold >= 0.0 && self.humidity_threshold.is_finite()) {
            return Err(eyre!(
                "humidity threshold of {} must be at least 0, got {}",
                self.room_name,
                self.humidity_threshold
            ));
        }
        if !(0.0..=100.0).contains(&self.min_humidity) {
            return Err(eyre!(
                "minimum humidity of {} must be between 0 and 100, got {}",
                self.room_name,
                self.min_humidity
            ));
        }
        Ok(())
    }
}

/// Which rooms to evaluate when a sensor state is shared between rooms.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharedKeyPolicy {
    /// Every room reading the state, in configuration order.
    All,
    /// Only the first room, in configuration order, reading the state. This
    /// is the first-match lookup earlier versions of the monitor used.
    First,
}

impl Default for SharedKeyPolicy {
    fn default() -> Self {
        SharedKeyPolicy::All
    }
}

impl FromStr for SharedKeyPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(SharedKeyPolicy::All),
            "first" => Ok(SharedKeyPolicy::First),
            _ => Err(eyre!("Could not parse {} as SharedKeyPolicy", s)),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Settings {
    pub namespace: Namespace,
    /// Log every evaluation. Errors are logged regardless.
    pub logging: bool,
    pub shared_keys: SharedKeyPolicy,
    pub rooms: Vec<RoomConfig>,
}

impl Settings {
    pub fn new(rooms: Vec<RoomConfig>) -> Result<Self> {
        let settings = Self {
            namespace: Namespace::default(),
            logging: true,
            shared_keys: SharedKeyPolicy::default(),
            rooms,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let rooms = match lookup(ROOMS_VAR) {
            Some(path) => {
                info!("Loading rooms from {}", path);
                load_rooms(&path)?
            }
            None => default_rooms(),
        };

        let mut settings = Self::new(rooms)?;
        if let Some(namespace) = lookup(NAMESPACE_VAR) {
            settings.namespace = Namespace::new(&namespace);
        }
        if let Some(logging) = lookup(LOGGING_VAR) {
            settings.logging =
                parse_bool(&logging).wrap_err_with(|| format!("invalid {}", LOGGING_VAR))?;
        }
        if let Some(policy) = lookup(SHARED_KEYS_VAR) {
            settings.shared_keys = policy
                .parse()
                .wrap_err_with(|| format!("invalid {}", SHARED_KEYS_VAR))?;
        }
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for room in &self.rooms {
            room.validate()?;
            if !names.insert(room.room_name.as_str()) {
                return Err(eyre!("room {} is configured twice", room.room_name));
            }
        }
        Ok(())
    }
}

pub fn load_rooms(path: &str) -> Result<Vec<RoomConfig>> {
    let data = fs::read_to_string(path).wrap_err_with(|| format!("failed reading {}", path))?;
    parse_rooms(&data).wrap_err_with(|| format!("failed parsing {}", path))
}

pub fn parse_rooms(data: &str) -> Result<Vec<RoomConfig>> {
    Ok(serde_json::from_str(data)?)
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(eyre!("Could not parse {} as a boolean", value)),
    }
}

const OUTSIDE_HUMIDITY: &str = "accuweather.0.Current.RelativeHumidity";
const OUTSIDE_TEMPERATURE: &str = "accuweather.0.Current.Temperature";

fn zigbee_room(name: &str, device: &str) -> RoomConfig {
    RoomConfig {
        room_name: name.to_string(),
        outside_humidity_key: OUTSIDE_HUMIDITY.to_string(),
        outside_temperature_key: OUTSIDE_TEMPERATURE.to_string(),
        inside_humidity_key: format!("zigbee.0.{}.humidity", device),
        inside_temperature_key: format!("zigbee.0.{}.temperature", device),
        humidity_threshold: 2.0,
        min_humidity: 45.0,
    }
}

/// Five rooms sharing one weather service for the outside.
pub fn default_rooms() -> Vec<RoomConfig> {
    vec![
        zigbee_room("office", "00124b002269c07b"),
        zigbee_room("bathroom", "a4c138f84b402c2a"),
        zigbee_room("living_room", "a4c138c8a3254d2f"),
        zigbee_room("cellar", "00124b00226a138f"),
        zigbee_room("bedroom", "a4c138d6afc5ce8f"),
    ]
}
