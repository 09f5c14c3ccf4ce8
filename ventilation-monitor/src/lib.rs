pub mod config;
pub mod events;
pub mod feed;
pub mod keys;
pub mod memory;
pub mod monitor;
pub mod print;
pub mod store;
