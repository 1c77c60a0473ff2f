//! Mutable matchmaking state
//!
//! All timers the engine gates on, plus the single outstanding challenge.

use crate::types::ChallengeId;
use crate::utils::{has_elapsed, saturating_seconds, seconds_between};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timers and the active challenge, owned by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineState {
    pub last_challenge_created_at: DateTime<Utc>,
    pub last_game_ended_at: DateTime<Utc>,
    pub last_rate_limited_at: DateTime<Utc>,
    pub active_challenge_id: Option<ChallengeId>,
    /// Games started and not yet finished
    pub games_in_progress: usize,
}

impl EngineState {
    /// Fresh state where the rate-limit cooldown has already elapsed
    pub fn new(now: DateTime<Utc>, rate_limit_timeout_seconds: u64) -> Self {
        Self {
            last_challenge_created_at: now,
            last_game_ended_at: now,
            last_rate_limited_at: now
                .checked_sub_signed(saturating_seconds(rate_limit_timeout_seconds))
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            active_challenge_id: None,
            games_in_progress: 0,
        }
    }

    pub fn has_active_challenge(&self) -> bool {
        self.active_challenge_id.is_some()
    }

    pub fn idle_long_enough(&self, now: DateTime<Utc>, timeout_seconds: u64) -> bool {
        has_elapsed(self.last_game_ended_at, now, timeout_seconds)
    }

    pub fn rate_limit_cooled_down(&self, now: DateTime<Utc>, timeout_seconds: u64) -> bool {
        has_elapsed(self.last_rate_limited_at, now, timeout_seconds)
    }

    /// Active challenge older than `expire_seconds` (strictly)
    pub fn expired_challenge(&self, now: DateTime<Utc>, expire_seconds: u64) -> Option<&ChallengeId> {
        let age = now - self.last_challenge_created_at;
        self.active_challenge_id
            .as_ref()
            .filter(|_| age > saturating_seconds(expire_seconds))
    }

    /// Point-in-time view for health reporting
    pub fn snapshot(&self, now: DateTime<Utc>) -> StateSnapshot {
        StateSnapshot {
            active_challenge_id: self.active_challenge_id.clone(),
            games_in_progress: self.games_in_progress,
            seconds_since_last_challenge: seconds_between(self.last_challenge_created_at, now),
            seconds_since_last_game: seconds_between(self.last_game_ended_at, now),
            seconds_since_rate_limited: seconds_between(self.last_rate_limited_at, now),
        }
    }
}

/// Serializable view of [`EngineState`] relative to a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub active_challenge_id: Option<ChallengeId>,
    pub games_in_progress: usize,
    pub seconds_since_last_challenge: u64,
    pub seconds_since_last_game: u64,
    pub seconds_since_rate_limited: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::current_timestamp;
    use chrono::Duration;

    #[test]
    fn test_new_state_is_not_rate_limited() {
        let now = current_timestamp();
        let state = EngineState::new(now, 3600);
        assert!(state.rate_limit_cooled_down(now, 3600));
        assert!(!state.has_active_challenge());
        assert!(!state.idle_long_enough(now, 60));
    }

    #[test]
    fn test_expiry_is_strict() {
        let now = current_timestamp();
        let mut state = EngineState::new(now, 0);
        assert!(state.expired_challenge(now + Duration::seconds(60), 25).is_none());

        state.active_challenge_id = Some("c1".to_string());
        assert!(state.expired_challenge(now + Duration::seconds(25), 25).is_none());
        assert_eq!(
            state.expired_challenge(now + Duration::seconds(26), 25),
            Some(&"c1".to_string())
        );
    }

    #[test]
    fn test_out_of_range_rate_limit_timeout_saturates() {
        let now = current_timestamp();
        let state = EngineState::new(now, u64::MAX);
        assert_eq!(state.last_rate_limited_at, DateTime::<Utc>::MIN_UTC);
        assert!(!state.rate_limit_cooled_down(now, u64::MAX));
    }

    #[test]
    fn test_snapshot() {
        let now = current_timestamp();
        let state = EngineState::new(now, 120);
        let snapshot = state.snapshot(now + Duration::seconds(10));
        assert_eq!(snapshot.seconds_since_last_game, 10);
        assert_eq!(snapshot.seconds_since_rate_limited, 130);
        assert!(snapshot.active_challenge_id.is_none());
    }
}
