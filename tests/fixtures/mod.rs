//! Test fixtures shared by the integration test crates
#![allow(dead_code)]

use bot_matchmaker::client::InMemoryChallengeClient;
use bot_matchmaker::clock::ManualClock;
use bot_matchmaker::config::{ChallengeFields, MatchmakingSection, ModeSetting, VariantSetting};
use bot_matchmaker::engine::MatchmakingEngine;
use bot_matchmaker::types::{BotCandidate, PerfRecord};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::Arc;

pub const OWN_USERNAME: &str = "MatchBot";

/// Builder for online bot candidates
pub struct CandidateBuilder {
    candidate: BotCandidate,
}

impl CandidateBuilder {
    pub fn new(username: &str) -> Self {
        Self {
            candidate: BotCandidate {
                username: username.to_string(),
                disabled: false,
                tos_violation: false,
                perfs: HashMap::new(),
            },
        }
    }

    pub fn rated(mut self, perf: &str, rating: i32, games: u32) -> Self {
        self.candidate
            .perfs
            .insert(perf.to_string(), PerfRecord { rating, games });
        self
    }

    pub fn disabled(mut self) -> Self {
        self.candidate.disabled = true;
        self
    }

    pub fn tos_violation(mut self) -> Self {
        self.candidate.tos_violation = true;
        self
    }

    pub fn build(self) -> BotCandidate {
        self.candidate
    }
}

/// An established bullet bot
pub fn bullet_bot(username: &str, rating: i32) -> BotCandidate {
    CandidateBuilder::new(username)
        .rated("bullet", rating, 100)
        .build()
}

/// Many bullet bots with ratings spread across 800..3000
pub fn bullet_population(count: usize) -> Vec<BotCandidate> {
    (0..count)
        .map(|i| bullet_bot(&format!("bot_{}", i), 800 + ((i * 37) % 2200) as i32))
        .collect()
}

/// Casual standard bullet, matchmaking on, one-minute idle timeout
pub fn casual_bullet_fields() -> ChallengeFields {
    ChallengeFields {
        allow_matchmaking: Some(true),
        challenge_timeout: Some(1),
        rate_limit_timeout: Some(10),
        challenge_mode: Some(ModeSetting::Casual),
        challenge_variant: Some(VariantSetting::Named("standard".to_string())),
        ..Default::default()
    }
}

pub fn section(defaults: ChallengeFields) -> MatchmakingSection {
    MatchmakingSection {
        defaults,
        challenges: Vec::new(),
    }
}

/// Engine wired to an in-memory server and a manual clock
pub struct TestSystem {
    pub engine: MatchmakingEngine<StdRng>,
    pub client: Arc<InMemoryChallengeClient>,
    pub clock: ManualClock,
}

impl TestSystem {
    pub fn new(section: MatchmakingSection, bots: Vec<BotCandidate>) -> Self {
        Self::with_seed(section, bots, 7)
    }

    pub fn with_seed(section: MatchmakingSection, bots: Vec<BotCandidate>, seed: u64) -> Self {
        let client = Arc::new(InMemoryChallengeClient::with_bots(bots));
        let clock = ManualClock::starting_now();
        let engine = MatchmakingEngine::with_parts(
            &section,
            vec!["standard".to_string(), "chess960".to_string()],
            OWN_USERNAME,
            client.clone(),
            Arc::new(clock.clone()),
            StdRng::seed_from_u64(seed),
        )
        .expect("Failed to build test engine");

        Self {
            engine,
            client,
            clock,
        }
    }

    /// One poll tick as the service runs it
    pub async fn tick(&mut self) -> Option<bot_matchmaker::types::ChallengeOutcome> {
        self.engine.cancel_expired_challenges().await;
        if self.engine.state().games_in_progress == 0 && self.engine.should_create_challenge() {
            Some(self.engine.challenge().await)
        } else {
            None
        }
    }
}
