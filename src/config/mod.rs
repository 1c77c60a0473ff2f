//! Configuration management for the matchmaking service
//!
//! This module handles configuration loading from TOML files and environment
//! variables, validation, default values and the merging of challenge
//! profiles.

pub mod app;
pub mod matchmaking;

// Re-export commonly used types
pub use app::{validate_config, AppConfig, ChallengeSettings, ServerSettings, ServiceSettings};
pub use matchmaking::{
    ChallengeFields, ChallengeProfile, MatchmakingSection, ModeSetting, OneOrMany, VariantSetting,
};
