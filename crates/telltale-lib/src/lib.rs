//! Telltale: instrument-cluster indicator and chime orchestration engine.

pub mod audio;
pub mod chime;
pub mod command;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod registry;
pub mod sim;
pub mod timer;
pub mod tracker;
pub mod zone;

pub use engine::{CommandOutcome, Orchestrator, Timing};
pub use error::TelltaleError;
