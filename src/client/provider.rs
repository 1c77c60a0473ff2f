//! Game server client interface and the in-memory implementation
//!
//! The engine only talks to the game server through [`ChallengeClient`], so
//! the HTTP implementation can be swapped for [`InMemoryChallengeClient`] in
//! tests and simulations.

use crate::error::{ClientError, ClientResult};
use crate::types::{BotCandidate, ChallengeId, ChallengeRequest, ChallengeResponse};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::RwLock;

/// Remote operations used by the matchmaking engine
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChallengeClient: Send + Sync {
    /// Challenge `username` to a game with the given parameters
    async fn challenge(
        &self,
        username: &str,
        request: &ChallengeRequest,
    ) -> ClientResult<ChallengeResponse>;

    /// Cancel a pending challenge (best effort)
    async fn cancel(&self, challenge_id: &str) -> ClientResult<()>;

    /// Fresh snapshot of the bots currently online
    async fn get_online_bots(&self) -> ClientResult<Vec<BotCandidate>>;
}

/// A challenge recorded by [`InMemoryChallengeClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentChallenge {
    pub username: String,
    pub request: ChallengeRequest,
}

/// In-memory client for testing and development
///
/// Challenge responses are scripted in order; once the script runs out every
/// challenge succeeds with a generated identifier.
#[derive(Debug, Default)]
pub struct InMemoryChallengeClient {
    online_bots: RwLock<Vec<BotCandidate>>,
    scripted_responses: RwLock<VecDeque<ClientResult<ChallengeResponse>>>,
    online_bots_error: RwLock<Option<ClientError>>,
    cancel_error: RwLock<Option<ClientError>>,
    sent: RwLock<Vec<SentChallenge>>,
    cancelled: RwLock<Vec<ChallengeId>>,
}

impl InMemoryChallengeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a client with a fixed set of online bots
    pub fn with_bots(bots: Vec<BotCandidate>) -> Self {
        let client = Self::new();
        client.set_online_bots(bots);
        client
    }

    pub fn set_online_bots(&self, bots: Vec<BotCandidate>) {
        if let Ok(mut online) = self.online_bots.write() {
            *online = bots;
        }
    }

    /// Queue the result of the next challenge call
    pub fn push_response(&self, response: ClientResult<ChallengeResponse>) {
        if let Ok(mut scripted) = self.scripted_responses.write() {
            scripted.push_back(response);
        }
    }

    /// Make every `get_online_bots` call fail until cleared with `None`
    pub fn fail_online_bots(&self, error: Option<ClientError>) {
        if let Ok(mut slot) = self.online_bots_error.write() {
            *slot = error;
        }
    }

    /// Make every `cancel` call fail until cleared with `None`
    pub fn fail_cancel(&self, error: Option<ClientError>) {
        if let Ok(mut slot) = self.cancel_error.write() {
            *slot = error;
        }
    }

    /// Challenges sent so far
    pub fn sent_challenges(&self) -> Vec<SentChallenge> {
        self.sent
            .read()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    /// Challenge identifiers cancelled so far
    pub fn cancelled_challenges(&self) -> Vec<ChallengeId> {
        self.cancelled
            .read()
            .map(|cancelled| cancelled.clone())
            .unwrap_or_default()
    }

    fn lock_error(what: &str) -> ClientError {
        ClientError::Transport(format!("Failed to acquire {} lock", what))
    }
}

#[async_trait]
impl ChallengeClient for InMemoryChallengeClient {
    async fn challenge(
        &self,
        username: &str,
        request: &ChallengeRequest,
    ) -> ClientResult<ChallengeResponse> {
        let mut sent = self.sent.write().map_err(|_| Self::lock_error("sent"))?;
        sent.push(SentChallenge {
            username: username.to_string(),
            request: request.clone(),
        });
        let count = sent.len();
        drop(sent);

        let scripted = self
            .scripted_responses
            .write()
            .map_err(|_| Self::lock_error("responses"))?
            .pop_front();

        scripted.unwrap_or_else(|| Ok(ChallengeResponse::with_id(format!("challenge{}", count))))
    }

    async fn cancel(&self, challenge_id: &str) -> ClientResult<()> {
        if let Some(error) = self
            .cancel_error
            .read()
            .map_err(|_| Self::lock_error("cancel error"))?
            .clone()
        {
            return Err(error);
        }

        self.cancelled
            .write()
            .map_err(|_| Self::lock_error("cancelled"))?
            .push(challenge_id.to_string());
        Ok(())
    }

    async fn get_online_bots(&self) -> ClientResult<Vec<BotCandidate>> {
        if let Some(error) = self
            .online_bots_error
            .read()
            .map_err(|_| Self::lock_error("online bots error"))?
            .clone()
        {
            return Err(error);
        }

        self.online_bots
            .read()
            .map(|bots| bots.clone())
            .map_err(|_| Self::lock_error("online bots"))
    }
}
