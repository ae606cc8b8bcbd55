//! The death-counter daemon.
//!
//! This module provides:
//! - Game profiles and detection settings (`config`)
//! - The streak/cooldown state machine (`debounce`)
//! - Persistent per-game counts (`store`) and text sinks (`outputs`)
//! - Process-based game auto-detection (`game_detect`)
//! - The per-tick pipeline (`state`) and the daemon loop (`runner`)
//! - CLI helpers (`commands`)

pub mod commands;
pub mod config;
pub mod debounce;
pub mod game_detect;
pub mod lock;
pub mod outputs;
pub mod runner;
pub mod state;
pub mod store;

pub use runner::run_daemon;
