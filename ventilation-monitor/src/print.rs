use async_trait::async_trait;
use log::warn;
use tokio::sync::broadcast::error::RecvError;

use ventilation_events::v2::{Event, Message, Payload};

use crate::events::{Handler, Sender};

/// Writes evaluations and totals to stdout as CSV.
pub struct CsvPrinter;

pub fn format_line(message: &Message) -> Option<String> {
    let stamp = message.stamp().to_rfc3339();
    match message.payload() {
        Payload::Event(Event::RoomEvaluated { room, result }) => Some(format!(
            "{},{},{},{},{},{}",
            stamp,
            room,
            result.inside_absolute_humidity,
            result.outside_absolute_humidity,
            result.diff,
            result.ventilate
        )),
        Payload::Event(Event::TotalRecommendations(total)) => {
            Some(format!("{},total,{}", stamp, total))
        }
        _ => None,
    }
}

#[async_trait]
impl Handler for CsvPrinter {
    async fn run(&self, tx: Sender) {
        let mut rx = tx.subscribe();

        // prints past a stop so the monitor's last results still show
        loop {
            match rx.recv().await {
                Ok(message) => {
                    if let Some(line) = format_line(&message) {
                        println!("{}", line);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Printer skipped {} messages", skipped);
                }
                Err(RecvError::Closed) => return,
            }
        }
    }
}
