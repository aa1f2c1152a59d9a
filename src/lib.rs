//! Per-player quest orchestration driven by gameplay events.

pub mod activity;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod dungeon;
pub mod engine;
pub mod error;
pub mod notify;
pub mod player;
pub mod ports;
pub mod protocol;
pub mod quest;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use dispatch::QuestDispatcher;
pub use engine::QuestEngine;
pub use error::{QuestError, StoreError};
