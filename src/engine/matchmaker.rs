//! Matchmaking engine
//!
//! Decides when to challenge, whom to challenge and with which game
//! parameters, and tracks the lifecycle of the single outstanding challenge.
//! The engine has no loop of its own: a host calls
//! [`MatchmakingEngine::cancel_expired_challenges`] and then
//! [`MatchmakingEngine::should_create_challenge`] /
//! [`MatchmakingEngine::challenge`] on every poll tick.

use crate::client::ChallengeClient;
use crate::clock::{Clock, SystemClock};
use crate::config::matchmaking::{ChallengeProfile, MatchmakingSection};
use crate::engine::selection::{
    choose_time_control, eligible_candidates, resolve_parameters, OpponentCriteria,
};
use crate::engine::state::{EngineState, StateSnapshot};
use crate::error::{ClientError, MatchmakingError, Result};
use crate::metrics::MetricsCollector;
use crate::types::{
    ChallengeId, ChallengeMode, ChallengeOutcome, ChallengeRequest, GameParameters, GameType,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A pending challenge is cancelled once it is older than this
pub const CHALLENGE_EXPIRE_SECONDS: u64 = 25;

/// Minimum gap between two challenge attempts
pub const CHALLENGE_SPACING_SECONDS: u64 = 20;

/// Opponent and parameters chosen for one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpponentSelection {
    /// Chosen opponent, `None` when no online bot qualified
    pub opponent: Option<String>,
    pub params: GameParameters,
    pub game_type: GameType,
    /// Number of bots that passed the filter
    pub eligible: usize,
}

/// Counters kept since startup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchmakingStats {
    pub attempts: u64,
    pub challenges_created: u64,
    pub no_opponent: u64,
    pub rate_limited: u64,
    pub failures: u64,
    pub cancelled: u64,
    pub games_started: u64,
    pub games_finished: u64,
}

/// Engine status for health reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub allow_matchmaking: bool,
    pub profiles: usize,
    pub in_rate_limit_cooldown: bool,
    pub state: StateSnapshot,
    pub stats: MatchmakingStats,
}

/// The matchmaking decision engine
pub struct MatchmakingEngine<R = StdRng> {
    settings: ChallengeProfile,
    profiles: Vec<ChallengeProfile>,
    variants: Vec<String>,
    username: String,
    client: Arc<dyn ChallengeClient>,
    clock: Arc<dyn Clock>,
    rng: R,
    state: EngineState,
    stats: MatchmakingStats,
    metrics: Option<Arc<MetricsCollector>>,
}

impl MatchmakingEngine<StdRng> {
    /// Create an engine on the system clock with an entropy-seeded RNG
    pub fn new(
        section: &MatchmakingSection,
        variants: Vec<String>,
        username: impl Into<String>,
        client: Arc<dyn ChallengeClient>,
    ) -> Result<Self> {
        Self::with_parts(
            section,
            variants,
            username,
            client,
            Arc::new(SystemClock),
            StdRng::from_entropy(),
        )
    }
}

impl<R: Rng + Send> MatchmakingEngine<R> {
    /// Create an engine with an explicit clock and random source
    ///
    /// `variants` should already exclude pseudo-variants that cannot be
    /// challenged (see `ChallengeSettings::matchmaking_variants`).
    pub fn with_parts(
        section: &MatchmakingSection,
        variants: Vec<String>,
        username: impl Into<String>,
        client: Arc<dyn ChallengeClient>,
        clock: Arc<dyn Clock>,
        rng: R,
    ) -> Result<Self> {
        let username = username.into();
        if username.is_empty() {
            return Err(MatchmakingError::ConfigurationError {
                message: "Bot username cannot be empty".to_string(),
            }
            .into());
        }

        let settings = section.settings();
        let profiles = section.profiles();
        for profile in &profiles {
            profile.validate(&variants)?;
        }

        let state = EngineState::new(clock.now(), settings.rate_limit_timeout_seconds);

        info!(
            "Matchmaking engine ready for '{}': enabled={}, {} profile(s), variants={:?}",
            username,
            settings.allow_matchmaking,
            profiles.len(),
            variants
        );

        Ok(Self {
            settings,
            profiles,
            variants,
            username,
            client,
            clock,
            rng,
            state,
            stats: MatchmakingStats::default(),
            metrics: None,
        })
    }

    /// Report outcomes to a metrics collector
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn stats(&self) -> &MatchmakingStats {
        &self.stats
    }

    pub fn profiles(&self) -> &[ChallengeProfile] {
        &self.profiles
    }

    pub fn active_challenge(&self) -> Option<&ChallengeId> {
        self.state.active_challenge_id.as_ref()
    }

    /// Cancel the active challenge once it has been pending too long
    ///
    /// The active challenge is cleared even when the cancel request fails.
    pub async fn cancel_expired_challenges(&mut self) -> Option<ChallengeId> {
        let now = self.clock.now();
        let challenge_id = self
            .state
            .expired_challenge(now, CHALLENGE_EXPIRE_SECONDS)?
            .clone();

        match self.client.cancel(&challenge_id).await {
            Ok(()) => debug!("Challenge id {} cancelled.", challenge_id),
            Err(e) => warn!("Failed to cancel challenge {}: {}", challenge_id, e),
        }

        self.state.active_challenge_id = None;
        self.stats.cancelled += 1;
        if let Some(metrics) = &self.metrics {
            metrics.record_cancellation();
            metrics.set_active_challenge(false);
        }

        Some(challenge_id)
    }

    /// Whether a new challenge may be issued right now
    pub fn should_create_challenge(&self) -> bool {
        if !self.settings.allow_matchmaking {
            return false;
        }

        if self.state.has_active_challenge() {
            return false;
        }

        let now = self.clock.now();
        if !self
            .state
            .idle_long_enough(now, self.settings.challenge_timeout_seconds)
        {
            return false;
        }

        if !self
            .state
            .rate_limit_cooled_down(now, self.settings.rate_limit_timeout_seconds)
        {
            debug!("Skipping matchmaking: rate-limit cooldown in progress");
            return false;
        }

        crate::utils::has_elapsed(
            self.state.last_challenge_created_at,
            now,
            CHALLENGE_SPACING_SECONDS,
        )
    }

    /// Resolve game parameters for `profile` and pick an eligible opponent
    pub async fn choose_opponent(
        &mut self,
        profile: &ChallengeProfile,
    ) -> std::result::Result<OpponentSelection, ClientError> {
        let params = resolve_parameters(profile, &self.variants, &mut self.rng);
        let game_type = GameType::for_parameters(&params);

        let online_bots = self.client.get_online_bots().await?;
        let criteria = OpponentCriteria::for_profile(profile, &self.username, game_type.clone());
        let eligible = eligible_candidates(&online_bots, &criteria);

        debug!(
            "{} of {} online bots eligible for {} ({})",
            eligible.len(),
            online_bots.len(),
            game_type,
            profile.label()
        );
        if let Some(metrics) = &self.metrics {
            metrics.set_eligible_opponents(eligible.len());
        }

        let opponent = eligible
            .choose(&mut self.rng)
            .map(|candidate| candidate.username.clone());

        Ok(OpponentSelection {
            opponent,
            params,
            game_type,
            eligible: eligible.len(),
        })
    }

    /// Send a challenge and classify the server's answer
    ///
    /// Never fails: every error is logged and folded into the outcome.
    pub async fn create_challenge(
        &mut self,
        username: &str,
        params: &GameParameters,
    ) -> ChallengeOutcome {
        let request = ChallengeRequest {
            rated: params.mode == ChallengeMode::Rated,
            variant: params.variant.clone(),
            time_control: choose_time_control(params, &mut self.rng),
        };

        match self.client.challenge(username, &request).await {
            Ok(response) => match response.challenge_id() {
                Some(id) => ChallengeOutcome::Created(id.clone()),
                None => {
                    warn!(
                        "Challenge to {} returned no challenge id: {:?}",
                        username, response
                    );
                    ChallengeOutcome::Unconfirmed
                }
            },
            Err(e) if e.is_rate_limited() => {
                warn!("Challenge to {} was rate limited", username);
                ChallengeOutcome::RateLimited
            }
            Err(e) => {
                error!("Failed to challenge {}: {}", username, e);
                ChallengeOutcome::Failed(e.to_string())
            }
        }
    }

    /// Run one matchmaking attempt with a randomly chosen profile
    pub async fn challenge(&mut self) -> ChallengeOutcome {
        let Some(profile) = self.profiles.choose(&mut self.rng).cloned() else {
            return ChallengeOutcome::NoOpponent;
        };

        let outcome = match self.choose_opponent(&profile).await {
            Ok(selection) => {
                let label = profile
                    .challenge_name
                    .clone()
                    .unwrap_or_else(|| selection.params.variant.clone());
                match selection.opponent {
                    Some(opponent) => {
                        info!("Will challenge {} for a game ({}).", opponent, label);
                        self.create_challenge(&opponent, &selection.params).await
                    }
                    None => {
                        info!(
                            "No eligible opponent for a game ({}, {}).",
                            label, selection.game_type
                        );
                        ChallengeOutcome::NoOpponent
                    }
                }
            }
            Err(e) if e.is_rate_limited() => {
                warn!("Rate limited while fetching online bots");
                ChallengeOutcome::RateLimited
            }
            Err(e) => {
                error!("Failed to look up online bots: {}", e);
                ChallengeOutcome::Failed(e.to_string())
            }
        };

        let now = self.clock.now();
        self.state.last_challenge_created_at = now;
        self.state.active_challenge_id = outcome.challenge_id().cloned();
        if outcome == ChallengeOutcome::RateLimited {
            self.state.last_rate_limited_at = now;
        }

        info!("Challenge id is {:?}.", self.state.active_challenge_id);
        self.record_outcome(&outcome);
        outcome
    }

    /// A game started, so any pending challenge has been consumed
    pub fn on_game_started(&mut self, game_id: &str) {
        debug!("Game {} started", game_id);
        if let Some(challenge_id) = self.state.active_challenge_id.take() {
            debug!("Challenge {} resolved into a game", challenge_id);
        }
        self.state.games_in_progress += 1;
        self.stats.games_started += 1;
        if let Some(metrics) = &self.metrics {
            metrics.record_game_event("started");
            metrics.set_active_challenge(false);
        }
    }

    /// A game finished; the idle timeout starts over
    pub fn on_game_finished(&mut self, game_id: &str) {
        debug!("Game {} finished", game_id);
        self.state.last_game_ended_at = self.clock.now();
        self.state.games_in_progress = self.state.games_in_progress.saturating_sub(1);
        self.stats.games_finished += 1;
        if let Some(metrics) = &self.metrics {
            metrics.record_game_event("finished");
        }
    }

    /// Snapshot of the engine for health reporting
    pub fn status(&self) -> EngineStatus {
        let now = self.clock.now();
        EngineStatus {
            allow_matchmaking: self.settings.allow_matchmaking,
            profiles: self.profiles.len(),
            in_rate_limit_cooldown: !self
                .state
                .rate_limit_cooled_down(now, self.settings.rate_limit_timeout_seconds),
            state: self.state.snapshot(now),
            stats: self.stats.clone(),
        }
    }

    fn record_outcome(&mut self, outcome: &ChallengeOutcome) {
        self.stats.attempts += 1;
        match outcome {
            ChallengeOutcome::Created(_) => self.stats.challenges_created += 1,
            ChallengeOutcome::NoOpponent => self.stats.no_opponent += 1,
            ChallengeOutcome::RateLimited => self.stats.rate_limited += 1,
            ChallengeOutcome::Unconfirmed | ChallengeOutcome::Failed(_) => {
                self.stats.failures += 1
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_challenge_outcome(outcome);
            metrics.set_active_challenge(self.state.has_active_challenge());
        }
    }
}
