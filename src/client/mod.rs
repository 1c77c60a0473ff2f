//! Game server client
//!
//! The engine treats the game server as an opaque collaborator reached
//! through the [`ChallengeClient`] trait.

pub mod http;
pub mod provider;

// Re-export commonly used types
pub use http::HttpChallengeClient;
pub use provider::{ChallengeClient, InMemoryChallengeClient, SentChallenge};
