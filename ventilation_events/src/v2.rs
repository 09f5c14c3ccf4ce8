use std::fmt;

use chrono::{offset::Utc, DateTime};
use serde::{Deserialize, Serialize};

use crate::RoomResult;

/// Something that happened, or should happen, on the monitor's bus.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    stamp: DateTime<Utc>,
    payload: Payload,
}

impl Message {
    pub fn new(payload: impl Into<Payload>) -> Self {
        Self::raw(Utc::now(), payload.into())
    }

    pub fn raw(stamp: DateTime<Utc>, payload: Payload) -> Self {
        Self { stamp, payload }
    }

    pub fn stop() -> Self {
        Self::new(Command::Stop)
    }

    pub fn stamp(&self) -> DateTime<Utc> {
        self.stamp
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn event(&self) -> Option<&Event> {
        match &self.payload {
            Payload::Event(event) => Some(event),
            Payload::Command(_) => None,
        }
    }

    pub fn is_stop(&self) -> bool {
        matches!(self.payload, Payload::Command(Command::Stop))
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub enum Payload {
    Command(Command),
    Event(Event),
}

impl From<Command> for Payload {
    fn from(command: Command) -> Self {
        Payload::Command(command)
    }
}

impl From<Event> for Payload {
    fn from(event: Event) -> Self {
        Payload::Event(event)
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    Stop,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    Started,
    RoomEvaluated { room: String, result: RoomResult },
    RoomFailed(String),
    TotalRecommendations(u32),
}

impl Event {
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::Started => "started",
            Event::RoomEvaluated { .. } => "room.evaluated",
            Event::RoomFailed(_) => "room.failure",
            Event::TotalRecommendations(_) => "total.recommendations",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Started => write!(f, "started"),
            Event::RoomEvaluated { room, result } => write!(
                f,
                "{}: inside {:.2} g/m³ outside {:.2} g/m³ diff {:.2} ventilate: {}",
                room,
                result.inside_absolute_humidity,
                result.outside_absolute_humidity,
                result.diff,
                result.ventilate
            ),
            Event::RoomFailed(room) => write!(f, "{}: update failed", room),
            Event::TotalRecommendations(total) => write!(f, "{} rooms to ventilate", total),
        }
    }
}
