//! Opponent selection and game parameter resolution
//!
//! Resolves a challenge profile into concrete game parameters and filters
//! the online bots down to the ones worth challenging.

use crate::config::matchmaking::{
    ChallengeProfile, VariantSetting, DEFAULT_INCREMENT_SECONDS, DEFAULT_INITIAL_TIME_SECONDS,
};
use crate::types::{BotCandidate, GameParameters, GameType, TimeControl, STANDARD_VARIANT};
use crate::utils::same_username;
use rand::seq::SliceRandom;
use rand::Rng;

/// Criteria an online bot must meet to be challenged
#[derive(Debug, Clone, PartialEq)]
pub struct OpponentCriteria {
    /// Our own account, never challenged
    pub own_username: String,
    /// Bucket whose rating is compared
    pub game_type: GameType,
    /// Inclusive rating range (min, max)
    pub rating_range: (i32, i32),
    pub allow_tos_violation: bool,
    pub blocklist: Vec<String>,
}

impl OpponentCriteria {
    /// Criteria for a profile and the game type it resolved to
    pub fn for_profile(profile: &ChallengeProfile, own_username: &str, game_type: GameType) -> Self {
        Self {
            own_username: own_username.to_string(),
            game_type,
            rating_range: (profile.opponent_min_rating, profile.opponent_max_rating),
            allow_tos_violation: profile.opponent_allow_tos_violation,
            blocklist: profile.opponent_blocklist.clone(),
        }
    }

    /// Whether `candidate` may be challenged
    pub fn accepts(&self, candidate: &BotCandidate) -> bool {
        if same_username(&candidate.username, &self.own_username) {
            return false;
        }

        if candidate.disabled {
            return false;
        }

        if candidate.tos_violation && !self.allow_tos_violation {
            return false;
        }

        if self
            .blocklist
            .iter()
            .any(|blocked| same_username(blocked, &candidate.username))
        {
            return false;
        }

        // Only bots with an established rating in this bucket
        match candidate.perf(&self.game_type) {
            Some(perf) if perf.games > 0 => {
                perf.rating >= self.rating_range.0 && perf.rating <= self.rating_range.1
            }
            _ => false,
        }
    }
}

/// Candidates accepted by `criteria`, in their original order
pub fn eligible_candidates<'a>(
    candidates: &'a [BotCandidate],
    criteria: &OpponentCriteria,
) -> Vec<&'a BotCandidate> {
    candidates
        .iter()
        .filter(|candidate| criteria.accepts(candidate))
        .collect()
}

/// Resolve mode, variant and clock settings for one challenge
///
/// A random variant with no supported variants falls back to standard;
/// profile validation rejects that configuration up front.
pub fn resolve_parameters<R: Rng + ?Sized>(
    profile: &ChallengeProfile,
    supported_variants: &[String],
    rng: &mut R,
) -> GameParameters {
    let mode = profile.challenge_mode.resolve(rng);

    let variant = match &profile.challenge_variant {
        VariantSetting::Named(name) => name.clone(),
        VariantSetting::Random => supported_variants
            .choose(rng)
            .cloned()
            .unwrap_or_else(|| STANDARD_VARIANT.to_string()),
    };

    let (base_time, increment) = if profile.allows_clock() {
        let base_time = profile
            .challenge_initial_time
            .as_ref()
            .and_then(|values| values.choose(rng))
            .unwrap_or(DEFAULT_INITIAL_TIME_SECONDS);
        let increment = profile
            .challenge_increment
            .as_ref()
            .and_then(|values| values.choose(rng))
            .unwrap_or(DEFAULT_INCREMENT_SECONDS);
        (Some(base_time), Some(increment))
    } else {
        (None, None)
    };

    let days = profile
        .challenge_days
        .as_ref()
        .and_then(|values| values.choose(rng));

    GameParameters {
        mode,
        variant,
        base_time,
        increment,
        days,
    }
}

/// Pick the clock style to send; a coin flip when both are plausible
pub fn choose_time_control<R: Rng + ?Sized>(params: &GameParameters, rng: &mut R) -> TimeControl {
    let clock = TimeControl::Clock {
        limit: params.base_time.unwrap_or(DEFAULT_INITIAL_TIME_SECONDS),
        increment: params.increment.unwrap_or(DEFAULT_INCREMENT_SECONDS),
    };

    match (params.has_clock(), params.days) {
        (_, None) => clock,
        (false, Some(days)) => TimeControl::Correspondence { days },
        (true, Some(days)) => {
            if rng.gen_bool(0.5) {
                TimeControl::Correspondence { days }
            } else {
                clock
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::matchmaking::{MatchmakingSection, ModeSetting, OneOrMany};
    use crate::types::{ChallengeMode, PerfRecord};
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn bot(name: &str, game_type: &str, rating: i32, games: u32) -> BotCandidate {
        let mut perfs = HashMap::new();
        perfs.insert(game_type.to_string(), PerfRecord { rating, games });
        BotCandidate {
            username: name.to_string(),
            disabled: false,
            tos_violation: false,
            perfs,
        }
    }

    fn profile() -> ChallengeProfile {
        MatchmakingSection::default().settings()
    }

    fn criteria(profile: &ChallengeProfile) -> OpponentCriteria {
        OpponentCriteria::for_profile(profile, "MyBot", GameType::Bullet)
    }

    #[test]
    fn test_rating_window_is_inclusive() {
        let mut profile = profile();
        profile.opponent_min_rating = 1000;
        profile.opponent_max_rating = 2000;
        let criteria = criteria(&profile);

        assert!(criteria.accepts(&bot("low", "bullet", 1000, 5)));
        assert!(criteria.accepts(&bot("high", "bullet", 2000, 5)));
        assert!(!criteria.accepts(&bot("too_low", "bullet", 999, 5)));
        assert!(!criteria.accepts(&bot("too_high", "bullet", 2001, 5)));
    }

    #[test]
    fn test_max_rating_scenario() {
        let mut profile = profile();
        profile.opponent_max_rating = 4000;
        let candidates = vec![bot("strong", "bullet", 5000, 10), bot("fair", "bullet", 2000, 10)];

        let eligible = eligible_candidates(&candidates, &criteria(&profile));
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].username, "fair");
    }

    #[test]
    fn test_rejections() {
        let profile = profile();
        let criteria = criteria(&profile);

        assert!(!criteria.accepts(&bot("mybot", "bullet", 1500, 10)));
        assert!(!criteria.accepts(&bot("unrated", "bullet", 1500, 0)));
        assert!(!criteria.accepts(&bot("blitzer", "blitz", 1500, 10)));

        let mut disabled = bot("disabled", "bullet", 1500, 10);
        disabled.disabled = true;
        assert!(!criteria.accepts(&disabled));
    }

    #[test]
    fn test_tos_and_blocklist() {
        let mut profile = profile();
        profile.opponent_blocklist = vec!["Blocked".to_string()];
        profile.opponent_allow_tos_violation = false;
        let criteria = criteria(&profile);

        let mut cheater = bot("cheater", "bullet", 1500, 10);
        cheater.tos_violation = true;
        assert!(!criteria.accepts(&cheater));
        assert!(!criteria.accepts(&bot("blocked", "bullet", 1500, 10)));

        profile.opponent_allow_tos_violation = true;
        let lenient = OpponentCriteria::for_profile(&profile, "MyBot", GameType::Bullet);
        assert!(lenient.accepts(&cheater));
    }

    #[test]
    fn test_resolve_defaults() {
        let mut rng = StdRng::seed_from_u64(3);
        let params = resolve_parameters(&profile(), &["standard".to_string()], &mut rng);
        assert_eq!(params.variant, "standard");
        assert_eq!(params.base_time, Some(60));
        assert_eq!(params.increment, Some(2));
        assert_eq!(params.days, None);
        assert_eq!(GameType::for_parameters(&params), GameType::Bullet);
    }

    #[test]
    fn test_resolve_variant() {
        let mut rng = StdRng::seed_from_u64(3);
        let variants = vec!["chess960".to_string(), "atomic".to_string()];
        for _ in 0..20 {
            let params = resolve_parameters(&profile(), &variants, &mut rng);
            assert!(variants.contains(&params.variant));
        }
        assert_eq!(resolve_parameters(&profile(), &[], &mut rng).variant, "standard");

        let mut named = profile();
        named.challenge_variant = VariantSetting::Named("horde".to_string());
        assert_eq!(resolve_parameters(&named, &variants, &mut rng).variant, "horde");
    }

    #[test]
    fn test_days_only_profile_sends_correspondence() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut profile = profile();
        profile.challenge_mode = ModeSetting::Rated;
        profile.challenge_days = Some(OneOrMany::One(3));

        let params = resolve_parameters(&profile, &["standard".to_string()], &mut rng);
        assert_eq!(params.mode, ChallengeMode::Rated);
        assert_eq!(params.base_time, None);
        assert_eq!(GameType::for_parameters(&params), GameType::Correspondence);

        for _ in 0..20 {
            assert_eq!(
                choose_time_control(&params, &mut rng),
                TimeControl::Correspondence { days: 3 }
            );
        }
    }

    #[test]
    fn test_both_styles_are_sampled() {
        let mut rng = StdRng::seed_from_u64(5);
        let params = GameParameters {
            mode: ChallengeMode::Casual,
            variant: "standard".to_string(),
            base_time: Some(180),
            increment: Some(2),
            days: Some(1),
        };
        let picks: Vec<_> = (0..64).map(|_| choose_time_control(&params, &mut rng)).collect();
        assert!(picks.contains(&TimeControl::Correspondence { days: 1 }));
        assert!(picks.contains(&TimeControl::Clock {
            limit: 180,
            increment: 2
        }));
    }

    proptest! {
        #[test]
        fn prop_accepted_candidates_respect_criteria(
            ratings in proptest::collection::vec(0i32..5000, 1..30),
            min in 0i32..2500,
            span in 0i32..2500,
        ) {
            let mut profile = profile();
            profile.opponent_min_rating = min;
            profile.opponent_max_rating = min + span;
            profile.opponent_blocklist = vec!["bot0".to_string()];
            let criteria = criteria(&profile);

            let mut candidates: Vec<BotCandidate> = ratings
                .iter()
                .enumerate()
                .map(|(i, rating)| bot(&format!("bot{}", i), "bullet", *rating, 1))
                .collect();
            candidates.push(bot("MyBot", "bullet", min, 1));

            for accepted in eligible_candidates(&candidates, &criteria) {
                let rating = accepted.perfs["bullet"].rating;
                prop_assert!(rating >= min && rating <= min + span);
                prop_assert_ne!(accepted.username.as_str(), "bot0");
                prop_assert_ne!(accepted.username.as_str(), "MyBot");
            }
        }
    }
}
