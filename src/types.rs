//! Common types used throughout the matchmaking service

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier of a challenge issued to the game server
pub type ChallengeId = String;

/// Identifier of a game on the game server
pub type GameId = String;

/// Name of the standard rule-set
pub const STANDARD_VARIANT: &str = "standard";

/// Pseudo-variant for games started from a custom position; never challenged
pub const FROM_POSITION_VARIANT: &str = "fromPosition";

/// Number of moves assumed when estimating the length of a timed game
pub const ESTIMATED_MOVES: u32 = 40;

/// Whether a challenge affects the players' ratings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeMode {
    Casual,
    Rated,
}

impl std::fmt::Display for ChallengeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChallengeMode::Casual => write!(f, "casual"),
            ChallengeMode::Rated => write!(f, "rated"),
        }
    }
}

/// Per-game-type performance of a bot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerfRecord {
    pub rating: i32,
    #[serde(default)]
    pub games: u32,
}

/// An online bot as reported by the game server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotCandidate {
    pub username: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, rename = "tosViolation")]
    pub tos_violation: bool,
    #[serde(default)]
    pub perfs: HashMap<String, PerfRecord>,
}

impl BotCandidate {
    /// Performance record for a game type, if the bot has played it
    pub fn perf(&self, game_type: &GameType) -> Option<&PerfRecord> {
        self.perfs.get(game_type.perf_key())
    }
}

/// Coarse time-control category used to look up an opponent's rating
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GameType {
    Bullet,
    Blitz,
    Rapid,
    Classical,
    Correspondence,
    Variant(String),
}

impl GameType {
    /// Bucket a standard timed game by its estimated duration in seconds
    pub fn from_duration(seconds: u64) -> Self {
        match seconds {
            0..=178 => GameType::Bullet,
            179..=478 => GameType::Blitz,
            479..=1498 => GameType::Rapid,
            _ => GameType::Classical,
        }
    }

    /// Derive the bucket for resolved game parameters
    pub fn for_parameters(params: &GameParameters) -> Self {
        if params.variant != STANDARD_VARIANT {
            return GameType::Variant(params.variant.clone());
        }
        if params.days.is_some() {
            return GameType::Correspondence;
        }
        GameType::from_duration(params.estimated_duration())
    }

    /// Key of the matching entry in [`BotCandidate::perfs`]
    pub fn perf_key(&self) -> &str {
        match self {
            GameType::Bullet => "bullet",
            GameType::Blitz => "blitz",
            GameType::Rapid => "rapid",
            GameType::Classical => "classical",
            GameType::Correspondence => "correspondence",
            GameType::Variant(name) => name,
        }
    }
}

impl std::fmt::Display for GameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.perf_key())
    }
}

/// Game parameters resolved for a single challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameParameters {
    pub mode: ChallengeMode,
    pub variant: String,
    /// Initial clock in seconds, present when a timed game is plausible
    pub base_time: Option<u32>,
    /// Increment per move in seconds, present alongside `base_time`
    pub increment: Option<u32>,
    /// Days per move for correspondence play
    pub days: Option<u32>,
}

impl GameParameters {
    /// Expected duration of a timed game: base time plus 40 increments
    pub fn estimated_duration(&self) -> u64 {
        let base = u64::from(self.base_time.unwrap_or(0));
        let increment = u64::from(self.increment.unwrap_or(0));
        base + increment * u64::from(ESTIMATED_MOVES)
    }

    pub fn has_clock(&self) -> bool {
        self.base_time.is_some() || self.increment.is_some()
    }
}

/// Clock style sent with a challenge; the server accepts exactly one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeControl {
    Clock { limit: u32, increment: u32 },
    Correspondence { days: u32 },
}

/// Parameters of a challenge request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeRequest {
    pub rated: bool,
    pub variant: String,
    pub time_control: TimeControl,
}

impl ChallengeRequest {
    /// Form fields as expected by the challenge endpoint
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("rated", self.rated.to_string()),
            ("variant", self.variant.clone()),
        ];
        match self.time_control {
            TimeControl::Clock { limit, increment } => {
                fields.push(("clock.limit", limit.to_string()));
                fields.push(("clock.increment", increment.to_string()));
            }
            TimeControl::Correspondence { days } => {
                fields.push(("days", days.to_string()));
            }
        }
        fields
    }
}

/// Challenge summary nested in the server's response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChallengeInfo {
    #[serde(default)]
    pub id: Option<ChallengeId>,
}

/// Response to a challenge request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChallengeResponse {
    #[serde(default)]
    pub challenge: Option<ChallengeInfo>,
}

impl ChallengeResponse {
    pub fn with_id(id: impl Into<ChallengeId>) -> Self {
        Self {
            challenge: Some(ChallengeInfo {
                id: Some(id.into()),
            }),
        }
    }

    /// Identifier at `challenge.id`, if the server created one
    pub fn challenge_id(&self) -> Option<&ChallengeId> {
        self.challenge.as_ref().and_then(|c| c.id.as_ref())
    }
}

/// Result of one matchmaking attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeOutcome {
    /// The server created the challenge and returned its identifier
    Created(ChallengeId),
    /// The server answered without a challenge identifier
    Unconfirmed,
    /// No online bot matched the profile
    NoOpponent,
    /// The server asked us to slow down
    RateLimited,
    /// Any other failure talking to the server
    Failed(String),
}

impl ChallengeOutcome {
    pub fn challenge_id(&self) -> Option<&ChallengeId> {
        match self {
            ChallengeOutcome::Created(id) => Some(id),
            _ => None,
        }
    }

    /// Short label used for logs and metric labels
    pub fn label(&self) -> &'static str {
        match self {
            ChallengeOutcome::Created(_) => "created",
            ChallengeOutcome::Unconfirmed => "unconfirmed",
            ChallengeOutcome::NoOpponent => "no_opponent",
            ChallengeOutcome::RateLimited => "rate_limited",
            ChallengeOutcome::Failed(_) => "failed",
        }
    }
}

/// Game reference carried by server events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRef {
    pub id: GameId,
}

/// Events read from the server's event stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    GameStart { game: GameRef },
    GameFinish { game: GameRef },
    #[serde(other)]
    Other,
}
