//! Matchmaking configuration and challenge profile merging
//!
//! The `[matchmaking]` section carries top-level defaults plus a list of
//! `[[matchmaking.challenges]]` overrides. Each override is merged over the
//! defaults to produce one [`ChallengeProfile`]; scalar fields fall back to
//! the default when absent, while the opponent blocklist is concatenated.

use crate::error::{MatchmakingError, Result};
use crate::types::ChallengeMode;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHALLENGE_TIMEOUT_MINUTES: u64 = 30;
pub const DEFAULT_RATE_LIMIT_TIMEOUT_MINUTES: u64 = 60;
pub const DEFAULT_INITIAL_TIME_SECONDS: u32 = 60;
pub const DEFAULT_INCREMENT_SECONDS: u32 = 2;
pub const DEFAULT_MIN_RATING: i32 = 600;
pub const DEFAULT_MAX_RATING: i32 = 4000;
/// Ten years; longer timeouts cannot be represented on the timeline
pub const MAX_TIMEOUT_MINUTES: u64 = 10 * 365 * 24 * 60;

/// A single value or a list sampled uniformly per challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: Clone> OneOrMany<T> {
    /// Pick a value, uniformly at random when several are configured
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<T> {
        match self {
            OneOrMany::One(value) => Some(value.clone()),
            OneOrMany::Many(values) => values.choose(rng).cloned(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, OneOrMany::Many(values) if values.is_empty())
    }
}

impl<T> From<T> for OneOrMany<T> {
    fn from(value: T) -> Self {
        OneOrMany::One(value)
    }
}

/// Configured challenge mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeSetting {
    Casual,
    Rated,
    #[default]
    Random,
}

impl ModeSetting {
    /// Resolve to a concrete mode, flipping a coin for `random`
    pub fn resolve<R: Rng + ?Sized>(self, rng: &mut R) -> ChallengeMode {
        match self {
            ModeSetting::Casual => ChallengeMode::Casual,
            ModeSetting::Rated => ChallengeMode::Rated,
            ModeSetting::Random => {
                if rng.gen_bool(0.5) {
                    ChallengeMode::Rated
                } else {
                    ChallengeMode::Casual
                }
            }
        }
    }
}

/// Configured challenge variant; `"random"` picks among supported variants
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VariantSetting {
    #[default]
    Random,
    Named(String),
}

impl From<String> for VariantSetting {
    fn from(value: String) -> Self {
        if value == "random" {
            VariantSetting::Random
        } else {
            VariantSetting::Named(value)
        }
    }
}

impl From<VariantSetting> for String {
    fn from(value: VariantSetting) -> Self {
        match value {
            VariantSetting::Random => "random".to_string(),
            VariantSetting::Named(name) => name,
        }
    }
}

impl std::fmt::Display for VariantSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VariantSetting::Random => write!(f, "random"),
            VariantSetting::Named(name) => write!(f, "{}", name),
        }
    }
}

/// Raw profile fields as written in the configuration file
///
/// Used both for the top-level defaults and for each override entry.
/// Timeouts are in minutes, clocks in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeFields {
    pub allow_matchmaking: Option<bool>,
    pub challenge_timeout: Option<u64>,
    pub rate_limit_timeout: Option<u64>,
    pub challenge_name: Option<String>,
    pub challenge_mode: Option<ModeSetting>,
    pub challenge_variant: Option<VariantSetting>,
    pub challenge_initial_time: Option<OneOrMany<u32>>,
    pub challenge_increment: Option<OneOrMany<u32>>,
    pub challenge_days: Option<OneOrMany<u32>>,
    pub opponent_min_rating: Option<i32>,
    pub opponent_max_rating: Option<i32>,
    pub opponent_allow_tos_violation: Option<bool>,
    pub opponent_blocklist: Vec<String>,
}

impl ChallengeFields {
    /// Merge these override fields over `defaults`
    pub fn merged_over(&self, defaults: &ChallengeFields) -> ChallengeFields {
        let mut opponent_blocklist = defaults.opponent_blocklist.clone();
        opponent_blocklist.extend(self.opponent_blocklist.iter().cloned());

        ChallengeFields {
            allow_matchmaking: self.allow_matchmaking.or(defaults.allow_matchmaking),
            challenge_timeout: self.challenge_timeout.or(defaults.challenge_timeout),
            rate_limit_timeout: self.rate_limit_timeout.or(defaults.rate_limit_timeout),
            challenge_name: self
                .challenge_name
                .clone()
                .or_else(|| defaults.challenge_name.clone()),
            challenge_mode: self.challenge_mode.or(defaults.challenge_mode),
            challenge_variant: self
                .challenge_variant
                .clone()
                .or_else(|| defaults.challenge_variant.clone()),
            challenge_initial_time: self
                .challenge_initial_time
                .clone()
                .or_else(|| defaults.challenge_initial_time.clone()),
            challenge_increment: self
                .challenge_increment
                .clone()
                .or_else(|| defaults.challenge_increment.clone()),
            challenge_days: self
                .challenge_days
                .clone()
                .or_else(|| defaults.challenge_days.clone()),
            opponent_min_rating: self.opponent_min_rating.or(defaults.opponent_min_rating),
            opponent_max_rating: self.opponent_max_rating.or(defaults.opponent_max_rating),
            opponent_allow_tos_violation: self
                .opponent_allow_tos_violation
                .or(defaults.opponent_allow_tos_violation),
            opponent_blocklist,
        }
    }
}

/// The `[matchmaking]` configuration section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingSection {
    #[serde(flatten)]
    pub defaults: ChallengeFields,
    pub challenges: Vec<ChallengeFields>,
}

impl MatchmakingSection {
    /// Top-level settings, used for gating decisions
    pub fn settings(&self) -> ChallengeProfile {
        ChallengeProfile::resolve(&self.defaults)
    }

    /// Build the ordered profile list; no overrides yields one default profile
    pub fn profiles(&self) -> Vec<ChallengeProfile> {
        if self.challenges.is_empty() {
            return vec![self.settings()];
        }

        self.challenges
            .iter()
            .map(|fields| ChallengeProfile::resolve(&fields.merged_over(&self.defaults)))
            .collect()
    }
}

/// A fully resolved challenge profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeProfile {
    pub allow_matchmaking: bool,
    pub challenge_timeout_seconds: u64,
    pub rate_limit_timeout_seconds: u64,
    pub challenge_name: Option<String>,
    pub challenge_mode: ModeSetting,
    pub challenge_variant: VariantSetting,
    /// Left unset when not configured; defaults apply only if a clock is plausible
    pub challenge_initial_time: Option<OneOrMany<u32>>,
    pub challenge_increment: Option<OneOrMany<u32>>,
    pub challenge_days: Option<OneOrMany<u32>>,
    pub opponent_min_rating: i32,
    pub opponent_max_rating: i32,
    pub opponent_allow_tos_violation: bool,
    pub opponent_blocklist: Vec<String>,
}

impl ChallengeProfile {
    /// Apply documented defaults to merged fields
    pub fn resolve(fields: &ChallengeFields) -> Self {
        Self {
            allow_matchmaking: fields.allow_matchmaking.unwrap_or(false),
            challenge_timeout_seconds: fields
                .challenge_timeout
                .unwrap_or(DEFAULT_CHALLENGE_TIMEOUT_MINUTES)
                .saturating_mul(60),
            rate_limit_timeout_seconds: fields
                .rate_limit_timeout
                .unwrap_or(DEFAULT_RATE_LIMIT_TIMEOUT_MINUTES)
                .saturating_mul(60),
            challenge_name: fields.challenge_name.clone(),
            challenge_mode: fields.challenge_mode.unwrap_or_default(),
            challenge_variant: fields.challenge_variant.clone().unwrap_or_default(),
            challenge_initial_time: fields.challenge_initial_time.clone(),
            challenge_increment: fields.challenge_increment.clone(),
            challenge_days: fields.challenge_days.clone(),
            opponent_min_rating: fields.opponent_min_rating.unwrap_or(DEFAULT_MIN_RATING),
            opponent_max_rating: fields.opponent_max_rating.unwrap_or(DEFAULT_MAX_RATING),
            opponent_allow_tos_violation: fields.opponent_allow_tos_violation.unwrap_or(true),
            opponent_blocklist: fields.opponent_blocklist.clone(),
        }
    }

    /// Name used in logs: the configured name or the variant
    pub fn label(&self) -> String {
        self.challenge_name
            .clone()
            .unwrap_or_else(|| self.challenge_variant.to_string())
    }

    /// A timed game is plausible unless only correspondence days are configured
    pub fn allows_clock(&self) -> bool {
        self.challenge_initial_time.is_some()
            || self.challenge_increment.is_some()
            || self.challenge_days.is_none()
    }

    /// Check the profile can produce a challenge with the given variants
    pub fn validate(&self, supported_variants: &[String]) -> Result<()> {
        if self.opponent_min_rating > self.opponent_max_rating {
            return Err(MatchmakingError::InvalidRatingRange {
                profile: self.label(),
                min: self.opponent_min_rating,
                max: self.opponent_max_rating,
            }
            .into());
        }

        if self.challenge_variant == VariantSetting::Random && supported_variants.is_empty() {
            return Err(MatchmakingError::NoSupportedVariants {
                profile: self.label(),
            }
            .into());
        }

        for (name, seconds) in [
            ("challenge_timeout", self.challenge_timeout_seconds),
            ("rate_limit_timeout", self.rate_limit_timeout_seconds),
        ] {
            if seconds > MAX_TIMEOUT_MINUTES * 60 {
                return Err(MatchmakingError::ConfigurationError {
                    message: format!(
                        "{} for profile '{}' exceeds {} minutes",
                        name,
                        self.label(),
                        MAX_TIMEOUT_MINUTES
                    ),
                }
                .into());
            }
        }

        for (name, value) in [
            ("challenge_initial_time", &self.challenge_initial_time),
            ("challenge_increment", &self.challenge_increment),
            ("challenge_days", &self.challenge_days),
        ] {
            if value.as_ref().is_some_and(|v| v.is_empty()) {
                return Err(MatchmakingError::ConfigurationError {
                    message: format!("{} for profile '{}' is an empty list", name, self.label()),
                }
                .into());
            }
        }

        Ok(())
    }
}
