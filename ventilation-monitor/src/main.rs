use std::sync::Arc;

use env_logger::Env;
use eyre::Result;
use log::{error, info, warn};

use ventilation_events::v2::Message;
use ventilation_monitor::{
    config::Settings,
    events::{capacity_for_rooms, publish, Runner, Sender},
    feed::LineFeed,
    memory::MemoryStore,
    monitor::RoomMonitor,
    print::CsvPrinter,
};

async fn interrupt(tx: Sender) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Interrupted, stopping");
            publish(&tx, Message::stop());
        }
        Err(err) => error!("Failed to listen for Ctrl+C: {:?}", err),
    }
    futures::future::pending::<()>().await;
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let settings = Settings::from_env()?;
    info!(
        "Monitoring {} rooms, shared sensor states trigger {:?}",
        settings.rooms.len(),
        settings.shared_keys
    );

    let capacity = capacity_for_rooms(settings.rooms.len());
    let store = Arc::new(MemoryStore::new());
    let mut monitor = RoomMonitor::new(store.clone(), settings);
    let registration = monitor.register().await;
    if !registration.total {
        warn!("Running without a total of ventilation recommendations");
    }
    for room in &registration.failed {
        warn!("Room {} is not monitored", room);
    }
    info!("Registered rooms: {}", registration.rooms.join(", "));

    let mut runner = Runner::with_capacity(capacity);
    runner.add(interrupt);
    runner.add(LineFeed::new(store));
    runner.add(CsvPrinter);
    runner.add(monitor);
    runner.run().await;

    Ok(())
}
