#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;

pub mod config;
pub mod logs;
pub mod plugin;
pub mod position_event;
pub mod track_store;
