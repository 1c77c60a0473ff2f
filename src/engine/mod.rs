//! Matchmaking engine
//!
//! Timing state machine, opponent filter and the lifecycle of the single
//! outstanding challenge.

pub mod matchmaker;
pub mod selection;
pub mod state;

pub use matchmaker::{
    EngineStatus, MatchmakingEngine, MatchmakingStats, OpponentSelection,
    CHALLENGE_EXPIRE_SECONDS, CHALLENGE_SPACING_SECONDS,
};
pub use selection::{choose_time_control, eligible_candidates, resolve_parameters, OpponentCriteria};
pub use state::{EngineState, StateSnapshot};
