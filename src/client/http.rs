//! HTTP client for the game server API
//!
//! Talks to a Lichess-compatible bot API with a bearer token. Online bots and
//! account events are streamed as newline-delimited JSON.

use crate::client::provider::ChallengeClient;
use crate::config::ServerSettings;
use crate::error::{ClientError, ClientResult};
use crate::types::{BotCandidate, ChallengeRequest, ChallengeResponse, ServerEvent};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("bot-matchmaker/", env!("CARGO_PKG_VERSION"));

/// Bearer-token client for the game server
#[derive(Debug, Clone)]
pub struct HttpChallengeClient {
    http: Client,
    /// No overall timeout; the event stream stays open indefinitely
    stream_http: Client,
    base_url: Url,
    token: String,
}

#[derive(Debug, Deserialize)]
struct Account {
    username: String,
}

impl HttpChallengeClient {
    pub fn new(settings: &ServerSettings) -> ClientResult<Self> {
        let request_timeout = Duration::from_secs(settings.request_timeout_seconds);
        let http = Client::builder()
            .timeout(request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(transport_error)?;
        let stream_http = Client::builder()
            .connect_timeout(request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(transport_error)?;
        let base_url = Url::parse(&settings.url).map_err(|e| {
            ClientError::Transport(format!("Invalid server URL '{}': {}", settings.url, e))
        })?;

        Ok(Self {
            http,
            stream_http,
            base_url,
            token: settings.token.clone(),
        })
    }

    /// Endpoint URL with each segment percent-encoded
    fn url(&self, segments: &[&str]) -> ClientResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ClientError::Transport(format!("Server URL '{}' cannot have a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Name of the account the token belongs to
    pub async fn account_username(&self) -> ClientResult<String> {
        let response = self
            .http
            .get(self.url(&["api", "account"])?)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport_error)?;
        let account: Account = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        Ok(account.username)
    }

    /// Stream account events into a channel until the connection closes
    ///
    /// Returns once the server ends the stream or the receiver is dropped.
    pub async fn stream_events(&self, events: mpsc::Sender<ServerEvent>) -> ClientResult<()> {
        let response = self
            .stream_http
            .get(self.url(&["api", "stream", "event"])?)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;

        let mut stream = response.bytes_stream();
        let mut buffer = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(transport_error)?;
            buffer.extend_from_slice(&chunk);

            for event in drain_ndjson::<ServerEvent>(&mut buffer) {
                if events.send(event).await.is_err() {
                    debug!("Event receiver dropped, closing event stream");
                    return Ok(());
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ChallengeClient for HttpChallengeClient {
    async fn challenge(
        &self,
        username: &str,
        request: &ChallengeRequest,
    ) -> ClientResult<ChallengeResponse> {
        let response = self
            .http
            .post(self.url(&["api", "challenge", username])?)
            .bearer_auth(&self.token)
            .form(&request.form_fields())
            .send()
            .await
            .map_err(transport_error)?;

        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn cancel(&self, challenge_id: &str) -> ClientResult<()> {
        let response = self
            .http
            .post(self.url(&["api", "challenge", challenge_id, "cancel"])?)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await?;
        Ok(())
    }

    async fn get_online_bots(&self) -> ClientResult<Vec<BotCandidate>> {
        let response = self
            .http
            .get(self.url(&["api", "bot", "online"])?)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport_error)?;
        let body = check_status(response)
            .await?
            .bytes()
            .await
            .map_err(transport_error)?;

        let mut buffer = body.to_vec();
        buffer.push(b'\n');
        Ok(drain_ndjson(&mut buffer))
    }
}

fn transport_error(error: reqwest::Error) -> ClientError {
    ClientError::Transport(error.to_string())
}

/// Map error statuses to [`ClientError`], 429 becoming `RateLimited`
async fn check_status(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ClientError::RateLimited);
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ClientError::Status {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response)
}

/// Parse every complete line in `buffer`, leaving a trailing partial line
///
/// Blank keep-alive lines are skipped and malformed lines are logged.
pub(crate) fn drain_ndjson<T: DeserializeOwned>(buffer: &mut Vec<u8>) -> Vec<T> {
    let mut items = Vec::new();
    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        let line = &line[..line.len() - 1];
        if line.iter().all(|b| b.is_ascii_whitespace()) {
            continue;
        }
        match serde_json::from_slice(line) {
            Ok(item) => items.push(item),
            Err(e) => warn!(
                "Skipping malformed line from server: {} ({})",
                String::from_utf8_lossy(line),
                e
            ),
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GameRef;

    #[test]
    fn test_drain_ndjson_keeps_partial_lines() {
        let mut buffer = b"{\"username\":\"a\"}\n\n{\"username\":\"b\"}\n{\"user".to_vec();
        let bots: Vec<BotCandidate> = drain_ndjson(&mut buffer);
        assert_eq!(bots.len(), 2);
        assert_eq!(bots[1].username, "b");
        assert_eq!(buffer, b"{\"user".to_vec());

        buffer.extend_from_slice(b"name\":\"c\"}\n");
        let bots: Vec<BotCandidate> = drain_ndjson(&mut buffer);
        assert_eq!(bots.len(), 1);
        assert_eq!(bots[0].username, "c");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drain_ndjson_skips_malformed_lines() {
        let mut buffer =
            b"not json\n{\"type\":\"gameFinish\",\"game\":{\"id\":\"g9\"}}\n".to_vec();
        let events: Vec<ServerEvent> = drain_ndjson(&mut buffer);
        assert_eq!(
            events,
            vec![ServerEvent::GameFinish {
                game: GameRef {
                    id: "g9".to_string()
                }
            }]
        );
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let settings = ServerSettings {
            url: "https://example.org/".to_string(),
            ..Default::default()
        };
        let client = HttpChallengeClient::new(&settings).unwrap();
        assert_eq!(
            client.url(&["api", "bot", "online"]).unwrap().as_str(),
            "https://example.org/api/bot/online"
        );
    }

    #[test]
    fn test_path_segments_are_escaped() {
        let settings = ServerSettings {
            url: "https://example.org/lichess".to_string(),
            ..Default::default()
        };
        let client = HttpChallengeClient::new(&settings).unwrap();
        assert_eq!(
            client
                .url(&["api", "challenge", "evil/bot?x=1", "cancel"])
                .unwrap()
                .as_str(),
            "https://example.org/lichess/api/challenge/evil%2Fbot%3Fx=1/cancel"
        );
    }

    #[test]
    fn test_invalid_server_url_is_rejected() {
        let settings = ServerSettings {
            url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            HttpChallengeClient::new(&settings),
            Err(ClientError::Transport(_))
        ));
    }
}
