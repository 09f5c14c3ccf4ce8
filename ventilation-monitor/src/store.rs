//! Client side of the external state store
//!
//! The monitor only ever talks to the host platform through [`StateStore`],
//! so anything that can create, read, write and watch typed states can host
//! it.
use std::{collections::HashSet, fmt};

use async_trait::async_trait;
use chrono::{offset::Utc, DateTime};
use eyre::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Register a typed state. Registering the same id again with the same
    /// value type succeeds without changing anything.
    async fn create_state(&self, id: &str, descriptor: &StateDescriptor) -> Result<()>;

    /// Current state, `None` when nothing has been written yet.
    async fn get_state(&self, id: &str) -> Result<Option<State>>;

    async fn set_state(&self, id: &str, value: StateValue, ack: bool) -> Result<()>;

    /// Watch `ids`; every write to one of them is delivered, whether or not
    /// the value changed.
    fn subscribe(&self, ids: &[String]) -> Subscription;
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Number,
    Boolean,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Number => write!(f, "number"),
            ValueType::Boolean => write!(f, "boolean"),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Boolean(bool),
    Number(f64),
    Text(String),
}

impl StateValue {
    /// Parse a raw value the way a host platform would store it.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw {
            "true" => StateValue::Boolean(true),
            "false" => StateValue::Boolean(false),
            _ => match raw.parse::<f64>() {
                Ok(number) => StateValue::Number(number),
                Err(_) => StateValue::Text(raw.to_string()),
            },
        }
    }

    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            StateValue::Boolean(_) => Some(ValueType::Boolean),
            StateValue::Number(_) => Some(ValueType::Number),
            StateValue::Text(_) => None,
        }
    }

    /// Numeric view of the value, NaN when there is none.
    pub fn as_number(&self) -> f64 {
        match self {
            StateValue::Number(number) => *number,
            StateValue::Boolean(true) => 1.0,
            StateValue::Boolean(false) => 0.0,
            StateValue::Text(text) => text.trim().parse().unwrap_or(f64::NAN),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            StateValue::Boolean(value) => *value,
            StateValue::Number(number) => *number != 0.0 && !number.is_nan(),
            StateValue::Text(text) => text == "true",
        }
    }
}

impl From<f64> for StateValue {
    fn from(value: f64) -> Self {
        StateValue::Number(value)
    }
}

impl From<u32> for StateValue {
    fn from(value: u32) -> Self {
        StateValue::Number(f64::from(value))
    }
}

impl From<bool> for StateValue {
    fn from(value: bool) -> Self {
        StateValue::Boolean(value)
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Boolean(value) => write!(f, "{}", value),
            StateValue::Number(value) => write!(f, "{}", value),
            StateValue::Text(value) => write!(f, "{}", value),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct State {
    pub value: StateValue,
    pub stamp: DateTime<Utc>,
    /// Written by the owner of the state rather than requested by a user.
    pub ack: bool,
}

impl State {
    pub fn new(value: StateValue, ack: bool) -> Self {
        Self {
            value,
            stamp: Utc::now(),
            ack,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct StateDescriptor {
    #[serde(rename = "type")]
    pub value_type: ValueType,
    pub read: bool,
    pub write: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub name: String,
}

impl StateDescriptor {
    fn read_only(value_type: ValueType, name: impl Into<String>) -> Self {
        Self {
            value_type,
            read: true,
            write: false,
            unit: None,
            name: name.into(),
        }
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::read_only(ValueType::Number, name)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::read_only(ValueType::Boolean, name)
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// Store side of a [`Subscription`].
pub struct Notifier {
    ids: HashSet<String>,
    sender: UnboundedSender<String>,
}

impl Notifier {
    pub fn watches(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Deliver a change of `id`. Returns false once the subscription is gone.
    pub fn notify(&self, id: &str) -> bool {
        self.sender.send(id.to_string()).is_ok()
    }
}

/// Changed state ids for a fixed set of watched states.
pub struct Subscription {
    ids: Vec<String>,
    receiver: UnboundedReceiver<String>,
}

impl Subscription {
    pub fn channel(ids: &[String]) -> (Notifier, Subscription) {
        let (sender, receiver) = unbounded_channel();
        let notifier = Notifier {
            ids: ids.iter().cloned().collect(),
            sender,
        };
        (
            notifier,
            Subscription {
                ids: ids.to_vec(),
                receiver,
            },
        )
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Next changed id, `None` once the store has gone away.
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.receiver.try_recv().ok()
    }

    /// Stop receiving changes. Dropping the subscription does the same.
    pub fn unsubscribe(mut self) {
        self.receiver.close();
    }
}
