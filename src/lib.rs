//! Bot Matchmaker - automated opponent matchmaking for game-server bots
//!
//! Periodically picks an online bot, challenges it with configurable game
//! parameters and tracks the single outstanding challenge until it is
//! accepted, expires or is rate limited.

pub mod client;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{ClientError, MatchmakingError, Result};
pub use types::*;

// Re-export key components
pub use client::{ChallengeClient, HttpChallengeClient, InMemoryChallengeClient};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{EngineStatus, MatchmakingEngine};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
