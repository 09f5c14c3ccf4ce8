//! Message bus shared by the monitor's handlers
//!
//! Every handler gets a sender on one broadcast channel and runs until the
//! runner shuts down. Shutdown starts with a stop command and finishes once
//! the bus has been quiet for the grace period, so results published while
//! handlers drain still reach everyone listening.
use std::{future::Future, time::Duration};

use async_trait::async_trait;
use futures::future::{join, select_all};
use log::{debug, warn};
use tokio::{
    sync::broadcast::{channel, error::RecvError},
    time::timeout,
};
use ventilation_events::v2::{Event, Message};

pub type Sender = tokio::sync::broadcast::Sender<Message>;
pub type Receiver = tokio::sync::broadcast::Receiver<Message>;

pub const DEFAULT_CAPACITY: usize = 64;
pub const DEFAULT_GRACE: Duration = Duration::from_millis(50);

// messages a single sensor change can put on the bus, per room
const MESSAGES_PER_ROOM: usize = 8;

#[async_trait]
pub trait Handler: Send + Sync {
    async fn run(&self, tx: Sender);
}

#[async_trait]
impl<F, R> Handler for F
where
    F: Fn(Sender) -> R + Clone + Sync + Send + 'static,
    R: Future<Output = ()> + Send + 'static,
{
    async fn run(&self, tx: Sender) {
        (self)(tx).await
    }
}

/// Put a message on the bus, dropping it when nobody is listening.
pub fn publish(tx: &Sender, message: Message) {
    if let Err(err) = tx.send(message) {
        debug!("Nobody listening for {:?}", err.0);
    }
}

/// Bus size for monitoring `rooms` rooms.
pub fn capacity_for_rooms(rooms: usize) -> usize {
    DEFAULT_CAPACITY.max((rooms + 1) * MESSAGES_PER_ROOM)
}

pub struct Runner {
    handlers: Vec<Box<dyn Handler>>,
    capacity: usize,
    grace: Duration,
}

impl Default for Runner {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

struct Shutdown {
    grace: Duration,
}

#[async_trait]
impl Handler for Shutdown {
    async fn run(&self, tx: Sender) {
        let mut rx = tx.subscribe();

        loop {
            match rx.recv().await {
                Ok(message) if message.is_stop() => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Runner skipped {} messages waiting for stop", skipped);
                }
                Err(RecvError::Closed) => return,
            }
        }

        debug!("Stopping once the bus is quiet");
        loop {
            match timeout(self.grace, rx.recv()).await {
                Ok(Ok(_)) | Ok(Err(RecvError::Lagged(_))) => {}
                Ok(Err(RecvError::Closed)) | Err(_) => return,
            }
        }
    }
}

impl Runner {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            handlers: vec![],
            capacity,
            grace: DEFAULT_GRACE,
        }
    }

    /// How long the bus has to stay quiet after a stop before the runner ends.
    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn add<T: Handler + 'static>(&mut self, handler: T) {
        self.handlers.push(Box::new(handler));
    }

    /// Run until shutdown completes or any handler returns.
    pub async fn run(self) {
        let (tx, _) = channel(self.capacity);
        let shutdown = Shutdown { grace: self.grace };

        let mut running = vec![shutdown.run(tx.clone())];
        running.extend(self.handlers.iter().map(|handler| handler.run(tx.clone())));

        // handlers subscribe on their first poll, before the start goes out
        let started = async { publish(&tx, Message::new(Event::Started)) };
        join(select_all(running), started).await;
    }
}
