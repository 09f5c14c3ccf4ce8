//! Reactive room monitor
//!
//! Watches the four sensor states of every room, re-evaluates a room whenever
//! one of them is written, mirrors the result into the store and keeps the
//! total number of ventilation recommendations up to date.
//!
//! All state lives in the store. The monitor only holds its configuration and
//! the index from sensor state to room.
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use log::{debug, error, info, warn};
use tokio::sync::broadcast::error::RecvError;

use ventilation_events::{
    evaluate_room,
    v2::{Event, Message},
    RoomResult, SensorReading,
};

use crate::{
    config::{RoomConfig, Settings, SharedKeyPolicy},
    events::{publish, Handler, Sender},
    keys::RoomKeys,
    store::{StateDescriptor, StateStore, StateValue, Subscription},
};

const ABSOLUTE_HUMIDITY_UNIT: &str = "g/m^3";

/// Sensor state to room lookup.
#[derive(Debug, Default, Clone)]
pub struct KeyIndex {
    triggers: Vec<String>,
    owners: HashMap<String, Vec<usize>>,
    policy: SharedKeyPolicy,
}

impl KeyIndex {
    pub fn new(rooms: &[RoomConfig], registered: &[usize], policy: SharedKeyPolicy) -> Self {
        let mut triggers = Vec::with_capacity(registered.len() * 4);
        let mut owners: HashMap<String, Vec<usize>> = HashMap::new();

        for &index in registered {
            for key in rooms[index].sensor_keys().iter() {
                triggers.push(key.to_string());
                let owned = owners.entry(key.to_string()).or_default();
                if owned.last() != Some(&index) {
                    owned.push(index);
                }
            }
        }

        Self {
            triggers,
            owners,
            policy,
        }
    }

    /// Four keys per room in room order, shared keys repeated.
    pub fn trigger_keys(&self) -> &[String] {
        &self.triggers
    }

    /// Trigger keys without repeats, in first seen order.
    pub fn subscription_keys(&self) -> Vec<String> {
        let mut seen = HashSet::with_capacity(self.owners.len());
        self.triggers
            .iter()
            .filter(|key| seen.insert(key.as_str()))
            .cloned()
            .collect()
    }

    /// Indices of the rooms to evaluate after `key` changed.
    pub fn rooms_for(&self, key: &str) -> &[usize] {
        let rooms = match self.owners.get(key) {
            Some(rooms) => rooms.as_slice(),
            None => return &[],
        };
        match self.policy {
            SharedKeyPolicy::All => rooms,
            SharedKeyPolicy::First => &rooms[..1],
        }
    }
}

/// What came out of startup registration.
#[derive(Debug, Default, PartialEq)]
pub struct Registration {
    pub total: bool,
    pub rooms: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Evaluation {
    pub room: String,
    pub result: RoomResult,
}

/// Outcome of handling one sensor change.
#[derive(Debug, Default, PartialEq)]
pub struct Update {
    pub evaluations: Vec<Evaluation>,
    pub failures: Vec<String>,
    pub total: Option<u32>,
}

pub struct RoomMonitor<S> {
    store: Arc<S>,
    settings: Settings,
    registered: Vec<usize>,
    index: KeyIndex,
    subscription: Mutex<Option<Subscription>>,
}

impl<S: StateStore> RoomMonitor<S> {
    pub fn new(store: Arc<S>, settings: Settings) -> Self {
        Self {
            store,
            settings,
            registered: vec![],
            index: KeyIndex::default(),
            subscription: Mutex::new(None),
        }
    }

    pub fn index(&self) -> &KeyIndex {
        &self.index
    }

    pub fn registered_rooms(&self) -> impl Iterator<Item = &RoomConfig> {
        self.registered
            .iter()
            .map(move |&index| &self.settings.rooms[index])
    }

    fn room_keys(&self, room: &RoomConfig) -> RoomKeys {
        self.settings.namespace.room(&room.room_name)
    }

    /// Create the total and every room's output states.
    ///
    /// Failures are logged and skipped: a room whose states could not all be
    /// created is left out of monitoring, the others carry on. The sensor
    /// states of the registered rooms are watched from here on, so changes
    /// written before the monitor starts serving are not lost.
    pub async fn register(&mut self) -> Registration {
        let mut registration = Registration::default();

        let total = self.settings.namespace.total();
        let descriptor = StateDescriptor::number("Number of ventilation recommendations");
        match self.store.create_state(&total, &descriptor).await {
            Ok(()) => registration.total = true,
            Err(err) => error!(
                "Could not create state {} for ventilation recommendations: {:?}",
                total, err
            ),
        }

        let mut registered = vec![];
        for (index, room) in self.settings.rooms.iter().enumerate() {
            match self.register_room(room).await {
                Ok(()) => {
                    registered.push(index);
                    registration.rooms.push(room.room_name.clone());
                }
                Err(err) => {
                    error!(
                        "Could not create states for room {}: {:?}",
                        room.room_name, err
                    );
                    registration.failed.push(room.room_name.clone());
                }
            }
        }

        self.index = KeyIndex::new(&self.settings.rooms, &registered, self.settings.shared_keys);
        let subscription = if registered.is_empty() {
            None
        } else {
            Some(self.store.subscribe(&self.index.subscription_keys()))
        };
        *self
            .subscription
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner) = subscription;
        self.registered = registered;
        registration
    }

    async fn register_room(&self, room: &RoomConfig) -> Result<()> {
        let keys = self.room_keys(room);
        let name = &room.room_name;

        self.store
            .create_state(
                &keys.absolute_humidity,
                &StateDescriptor::number(format!("{} absolute humidity", name))
                    .with_unit(ABSOLUTE_HUMIDITY_UNIT),
            )
            .await?;
        self.store
            .create_state(
                &keys.outside_absolute_humidity,
                &StateDescriptor::number(format!("{} outside absolute humidity", name))
                    .with_unit(ABSOLUTE_HUMIDITY_UNIT),
            )
            .await?;
        self.store
            .create_state(
                &keys.ventilation_recommendation,
                &StateDescriptor::boolean(format!("{} ventilation recommendation", name)),
            )
            .await?;
        Ok(())
    }

    /// Re-evaluate the rooms reading `key`, then recount the recommendations.
    ///
    /// A room that fails to read or write is logged and reported in
    /// [`Update::failures`]; the remaining rooms still go ahead.
    pub async fn on_sensor_change(&self, key: &str) -> Result<Update> {
        let rooms = self.index.rooms_for(key);
        if rooms.is_empty() {
            debug!("Ignoring change of unmonitored state {}", key);
            return Ok(Update::default());
        }

        let mut update = Update::default();
        for &index in rooms {
            let room = &self.settings.rooms[index];
            match self.update_room(room).await {
                Ok(result) => {
                    if self.settings.logging {
                        info!(
                            "{}: inside {} g/m³, outside {} g/m³, diff {}, ventilate: {}",
                            room.room_name,
                            result.inside_absolute_humidity,
                            result.outside_absolute_humidity,
                            result.diff,
                            result.ventilate
                        );
                    }
                    update.evaluations.push(Evaluation {
                        room: room.room_name.clone(),
                        result,
                    });
                }
                Err(err) => {
                    error!("Failed to update room {}: {:?}", room.room_name, err);
                    update.failures.push(room.room_name.clone());
                }
            }
        }

        if !update.evaluations.is_empty() {
            update.total = Some(self.update_total().await?);
        }
        Ok(update)
    }

    /// Evaluate a room from fresh reads and write the result back.
    pub async fn update_room(&self, room: &RoomConfig) -> Result<RoomResult> {
        let inside = SensorReading::new(
            self.read_number(&room.inside_humidity_key).await?,
            self.read_number(&room.inside_temperature_key).await?,
        );
        let outside = SensorReading::new(
            self.read_number(&room.outside_humidity_key).await?,
            self.read_number(&room.outside_temperature_key).await?,
        );
        if !inside.is_complete() || !outside.is_complete() {
            debug!("Room {} has incomplete readings", room.room_name);
        }

        let result = evaluate_room(inside, outside, room.limits());
        self.write_result(room, &result).await?;
        Ok(result)
    }

    async fn read_number(&self, key: &str) -> Result<f64> {
        let state = self
            .store
            .get_state(key)
            .await
            .wrap_err_with(|| format!("failed reading {}", key))?;
        Ok(state.map_or(f64::NAN, |state| state.value.as_number()))
    }

    // stops at the first failed write, earlier writes are kept
    async fn write_result(&self, room: &RoomConfig, result: &RoomResult) -> Result<()> {
        let keys = self.room_keys(room);
        let writes = [
            (
                keys.absolute_humidity,
                StateValue::from(result.inside_absolute_humidity),
            ),
            (
                keys.outside_absolute_humidity,
                StateValue::from(result.outside_absolute_humidity),
            ),
            (
                keys.ventilation_recommendation,
                StateValue::from(result.ventilate),
            ),
        ];

        for (key, value) in writes.iter() {
            self.store
                .set_state(key, value.clone(), true)
                .await
                .wrap_err_with(|| format!("failed writing {}", key))?;
        }
        Ok(())
    }

    /// Count the stored recommendations of every configured room and write
    /// the total.
    pub async fn update_total(&self) -> Result<u32> {
        let mut total: u32 = 0;
        for room in &self.settings.rooms {
            let key = self.room_keys(room).ventilation_recommendation;
            match self.store.get_state(&key).await {
                Ok(Some(state)) if state.value.is_truthy() => total += 1,
                Ok(_) => {}
                Err(err) => warn!("Could not read {}: {:?}", key, err),
            }
        }

        let key = self.settings.namespace.total();
        self.store
            .set_state(&key, StateValue::from(total), true)
            .await
            .wrap_err_with(|| format!("failed writing {}", key))?;
        Ok(total)
    }

    /// The subscription opened by [`register`](Self::register). Handed out
    /// once.
    pub fn take_subscription(&self) -> Option<Subscription> {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Handle changes from `subscription` one at a time until the store goes
    /// away or a stop command arrives. Changes already delivered when the
    /// stop arrives are still handled.
    ///
    /// Returns true when stopped by command.
    pub async fn serve(&self, mut subscription: Subscription, tx: Sender) -> bool {
        let mut rx = tx.subscribe();
        info!(
            "Monitoring {} states for {} rooms",
            subscription.ids().len(),
            self.registered.len()
        );

        let stopped = loop {
            // bus first, so a stop is never lost behind this monitor's own results
            tokio::select! {
                biased;
                message = rx.recv() => match message {
                    Ok(message) if message.is_stop() => {
                        while let Some(key) = subscription.try_recv() {
                            self.handle_change(&key, &tx).await;
                            tokio::task::yield_now().await;
                        }
                        break true;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Monitor skipped {} bus messages", skipped);
                    }
                    Err(RecvError::Closed) => break false,
                },
                changed = subscription.recv() => match changed {
                    Some(key) => {
                        self.handle_change(&key, &tx).await;
                        tokio::task::yield_now().await;
                    }
                    None => {
                        warn!("State subscription closed");
                        break false;
                    }
                },
            }
        };

        subscription.unsubscribe();
        stopped
    }

    async fn handle_change(&self, key: &str, tx: &Sender) {
        match self.on_sensor_change(key).await {
            Ok(update) => {
                for Evaluation { room, result } in update.evaluations {
                    publish(tx, Message::new(Event::RoomEvaluated { room, result }));
                }
                for room in update.failures {
                    publish(tx, Message::new(Event::RoomFailed(room)));
                }
                if let Some(total) = update.total {
                    publish(tx, Message::new(Event::TotalRecommendations(total)));
                }
            }
            Err(err) => error!("Failed to handle change of {}: {:?}", key, err),
        }
    }
}

#[async_trait]
impl<S: StateStore + 'static> Handler for RoomMonitor<S> {
    async fn run(&self, tx: Sender) {
        let subscription = match self.take_subscription() {
            Some(subscription) => subscription,
            None => {
                error!("No rooms registered, nothing to monitor");
                return;
            }
        };

        if self.serve(subscription, tx).await {
            // leave shutting down to the runner
            futures::future::pending::<()>().await;
        }
    }
}
