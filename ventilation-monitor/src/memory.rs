use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use eyre::{eyre, Result};
use log::debug;

use crate::store::{Notifier, State, StateDescriptor, StateStore, StateValue, Subscription};

/// In-process state store.
///
/// States written without being created first are kept as untyped foreign
/// states, the way sensor states owned by other adapters show up on a host
/// platform.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    states: HashMap<String, Entry>,
    notifiers: Vec<Notifier>,
}

#[derive(Default)]
struct Entry {
    descriptor: Option<StateDescriptor>,
    state: Option<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn descriptor(&self, id: &str) -> Option<StateDescriptor> {
        self.lock()
            .states
            .get(id)
            .and_then(|entry| entry.descriptor.clone())
    }

    pub fn value(&self, id: &str) -> Option<StateValue> {
        self.lock()
            .states
            .get(id)
            .and_then(|entry| entry.state.as_ref())
            .map(|state| state.value.clone())
    }

    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.lock();
        inner.notifiers.retain(|notifier| !notifier.is_closed());
        inner.notifiers.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id.chars().any(char::is_whitespace) || id.split('.').any(str::is_empty) {
        Err(eyre!("invalid state id {:?}", id))
    } else {
        Ok(())
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn create_state(&self, id: &str, descriptor: &StateDescriptor) -> Result<()> {
        validate_id(id)?;
        let mut inner = self.lock();
        let entry = inner.states.entry(id.to_string()).or_default();

        if let Some(existing) = &entry.descriptor {
            if existing.value_type != descriptor.value_type {
                return Err(eyre!(
                    "state {} already exists as {}, not {}",
                    id,
                    existing.value_type,
                    descriptor.value_type
                ));
            }
            debug!("State {} already exists", id);
            return Ok(());
        }
        entry.descriptor = Some(descriptor.clone());
        Ok(())
    }

    async fn get_state(&self, id: &str) -> Result<Option<State>> {
        Ok(self
            .lock()
            .states
            .get(id)
            .and_then(|entry| entry.state.clone()))
    }

    async fn set_state(&self, id: &str, value: StateValue, ack: bool) -> Result<()> {
        validate_id(id)?;
        let mut inner = self.lock();
        let entry = inner.states.entry(id.to_string()).or_default();

        if let Some(descriptor) = &entry.descriptor {
            if value.value_type() != Some(descriptor.value_type) {
                return Err(eyre!(
                    "cannot write {:?} to {} state {}",
                    value,
                    descriptor.value_type,
                    id
                ));
            }
        }
        entry.state = Some(State::new(value, ack));

        inner.notifiers.retain(|notifier| !notifier.is_closed());
        for notifier in inner.notifiers.iter().filter(|notifier| notifier.watches(id)) {
            notifier.notify(id);
        }
        Ok(())
    }

    fn subscribe(&self, ids: &[String]) -> Subscription {
        let (notifier, subscription) = Subscription::channel(ids);
        self.lock().notifiers.push(notifier);
        subscription
    }
}
