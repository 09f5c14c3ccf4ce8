//! Sensor readings from a line based text stream
//!
//! Each line is `state.id=value`. Blank lines and lines starting with `#` are
//! skipped. Values are stored acknowledged, the way a sensor adapter reports
//! its own readings.
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use eyre::{eyre, Result};
use log::{debug, error, info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use ventilation_events::v2::Message;

use crate::{
    events::{publish, Handler, Sender},
    store::{StateStore, StateValue},
};

pub fn parse_line(line: &str) -> Result<Option<(String, StateValue)>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (id, value) = line
        .split_once('=')
        .ok_or_else(|| eyre!("expected id=value, got {:?}", line))?;
    let id = id.trim();
    if id.is_empty() {
        return Err(eyre!("missing state id in {:?}", line));
    }
    Ok(Some((id.to_string(), StateValue::parse(value))))
}

type Input = Box<dyn AsyncBufRead + Send + Unpin>;

pub struct LineFeed<S> {
    store: Arc<S>,
    input: Mutex<Option<Input>>,
}

impl<S: StateStore> LineFeed<S> {
    /// Feed from stdin.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_input(store, BufReader::new(tokio::io::stdin()))
    }

    pub fn with_input<R>(store: Arc<S>, input: R) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
    {
        Self {
            store,
            input: Mutex::new(Some(Box::new(input))),
        }
    }

    /// Write every reading from `reader` into the store until it runs dry.
    /// Malformed lines are skipped. Returns the number of readings written.
    pub async fn apply_lines<R>(&self, reader: R) -> Result<usize>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut written = 0;

        while let Some(line) = lines.next_line().await? {
            match parse_line(&line) {
                Ok(Some((id, value))) => {
                    debug!("Setting {} to {}", id, value);
                    match self.store.set_state(&id, value, true).await {
                        Ok(()) => written += 1,
                        Err(err) => error!("Could not set {}: {:?}", id, err),
                    }
                }
                Ok(None) => {}
                Err(err) => warn!("Skipping line: {}", err),
            }
        }
        Ok(written)
    }
}

#[async_trait]
impl<S: StateStore + 'static> Handler for LineFeed<S> {
    async fn run(&self, tx: Sender) {
        let input = self
            .input
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match input {
            Some(input) => match self.apply_lines(input).await {
                Ok(written) => info!("Input closed after {} readings", written),
                Err(err) => error!("Failed reading input: {:?}", err),
            },
            None => warn!("Input was already read"),
        }
        publish(&tx, Message::stop());
        futures::future::pending::<()>().await;
    }
}
