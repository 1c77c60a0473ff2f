//! Application state and service coordination
//!
//! Owns the matchmaking engine and the background tasks that drive it: the
//! poll loop, the game event consumer, the server event stream and the
//! health server.

use crate::client::HttpChallengeClient;
use crate::config::AppConfig;
use crate::engine::{EngineStatus, MatchmakingEngine};
use crate::metrics::{HealthServer, HealthServerConfig, MetricsCollector};
use crate::service::health::HealthCheck;
use crate::types::{ChallengeOutcome, ServerEvent};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Delay before reopening a closed server event stream
const EVENT_STREAM_RETRY: Duration = Duration::from_secs(5);

/// Interval of the uptime / health gauge refresh
const HEALTH_METRICS_INTERVAL: Duration = Duration::from_secs(30);

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    config: AppConfig,

    /// The engine is driven by the poll loop and the event consumer
    engine: Arc<Mutex<MatchmakingEngine>>,

    metrics: Arc<MetricsCollector>,

    /// Live source of game events, absent when events are injected
    event_source: Option<Arc<HttpChallengeClient>>,
    events_tx: mpsc::Sender<ServerEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<ServerEvent>>>,

    background_tasks: Mutex<Vec<JoinHandle<()>>>,
    health_server: Mutex<Option<Arc<HealthServer>>>,

    is_running: Arc<RwLock<bool>>,
    started_at: Instant,
}

impl AppState {
    /// Initialize the application against the configured game server
    ///
    /// The bot's own username is taken from the configuration, or looked up
    /// from the account the token belongs to.
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing bot matchmaker");
        info!(
            "Configuration: service={}, server={}",
            config.service.name, config.server.url
        );

        let client = Arc::new(HttpChallengeClient::new(&config.server).map_err(|e| {
            ServiceError::Initialization {
                message: format!("Failed to create game server client: {}", e),
            }
        })?);

        let username = match config.server.username.as_deref() {
            Some(username) if !username.is_empty() => username.to_string(),
            _ => {
                let username = client.account_username().await.map_err(|e| {
                    ServiceError::Initialization {
                        message: format!("Failed to look up bot account: {}", e),
                    }
                })?;
                info!("Running as bot account '{}'", username);
                username
            }
        };

        let metrics = Self::initialize_metrics()?;
        let engine = MatchmakingEngine::new(
            &config.matchmaking,
            config.challenge.matchmaking_variants(),
            username,
            client.clone(),
        )
        .map_err(|e| ServiceError::Configuration {
            message: e.to_string(),
        })?;

        Ok(Self::assemble(config, engine, metrics, Some(client)))
    }

    /// Build the application around an existing engine
    ///
    /// No server event stream is opened; events are delivered through
    /// [`AppState::event_sender`].
    pub fn with_engine(
        config: AppConfig,
        engine: MatchmakingEngine,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self::assemble(config, engine, metrics, None)
    }

    fn assemble(
        config: AppConfig,
        engine: MatchmakingEngine,
        metrics: Arc<MetricsCollector>,
        event_source: Option<Arc<HttpChallengeClient>>,
    ) -> Self {
        let engine = engine.with_metrics(metrics.clone());
        metrics.set_engine_flag(
            "allow_matchmaking",
            config.matchmaking.settings().allow_matchmaking,
        );
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            config,
            engine: Arc::new(Mutex::new(engine)),
            metrics,
            event_source,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            background_tasks: Mutex::new(Vec::new()),
            health_server: Mutex::new(None),
            is_running: Arc::new(RwLock::new(false)),
            started_at: Instant::now(),
        }
    }

    fn initialize_metrics() -> Result<Arc<MetricsCollector>, ServiceError> {
        MetricsCollector::new()
            .map(Arc::new)
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to create metrics collector: {}", e),
            })
    }

    /// Start the health server and all background tasks
    pub async fn start(self: &Arc<Self>) -> Result<(), ServiceError> {
        info!("Starting bot matchmaker");

        let Some(events_rx) = self.events_rx.lock().await.take() else {
            return Err(ServiceError::BackgroundTask {
                message: "Service was already started".to_string(),
            });
        };

        *self.is_running.write().await = true;

        if self.config.service.enable_health_server {
            self.start_health_server().await;
        } else {
            info!("Health server disabled");
        }

        let mut tasks = vec![
            self.spawn_poll_loop(),
            self.spawn_event_consumer(events_rx),
            self.spawn_health_metrics(),
        ];
        if let Some(source) = &self.event_source {
            tasks.push(self.spawn_event_stream(source.clone()));
        }

        info!("{} background tasks started", tasks.len());
        self.background_tasks.lock().await.extend(tasks);
        Ok(())
    }

    /// Stop background tasks and the health server
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of bot matchmaker");
        *self.is_running.write().await = false;

        if let Some(server) = self.health_server.lock().await.take() {
            if let Err(e) = server.stop().await {
                warn!("Failed to stop health server: {}", e);
            }
        }

        let tasks: Vec<_> = self.background_tasks.lock().await.drain(..).collect();
        debug!("Aborting {} background tasks", tasks.len());
        for task in tasks {
            task.abort();
        }

        let status = self.engine_status().await;
        info!("Final matchmaking statistics: {:?}", status.stats);
        if let Some(challenge_id) = status.state.active_challenge_id {
            warn!("Challenge {} was still pending at shutdown", challenge_id);
        }

        info!("Bot matchmaker shutdown completed");
        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn engine(&self) -> Arc<Mutex<MatchmakingEngine>> {
        self.engine.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Sender for game events, fed to the engine once started
    pub fn event_sender(&self) -> mpsc::Sender<ServerEvent> {
        self.events_tx.clone()
    }

    pub async fn engine_status(&self) -> EngineStatus {
        self.engine.lock().await.status()
    }

    /// Run a single poll tick
    pub async fn poll_once(&self) -> Option<ChallengeOutcome> {
        poll_engine(&self.engine, &self.metrics).await
    }

    /// Forward one game event to the engine
    pub async fn handle_event(&self, event: ServerEvent) {
        dispatch_event(&self.engine, event).await
    }

    async fn start_health_server(self: &Arc<Self>) {
        let config = HealthServerConfig {
            port: self.config.service.health_port,
            ..Default::default()
        };
        let server =
            Arc::new(HealthServer::new(config, self.metrics.clone()).with_app_state(self.clone()));
        *self.health_server.lock().await = Some(server.clone());

        let handle = tokio::spawn(async move {
            if let Err(e) = server.start().await {
                error!("Health server failed: {}", e);
            }
        });
        self.background_tasks.lock().await.push(handle);
        info!(
            "Health endpoints served on port {}",
            self.config.service.health_port
        );
    }

    fn spawn_poll_loop(&self) -> JoinHandle<()> {
        let engine = self.engine.clone();
        let metrics = self.metrics.clone();
        let is_running = self.is_running.clone();
        let poll_interval = self.config.poll_interval();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            info!("Poll loop started ({:?} interval)", poll_interval);

            while *is_running.read().await {
                interval.tick().await;
                if let Some(outcome) = poll_engine(&engine, &metrics).await {
                    debug!("Matchmaking attempt finished: {}", outcome.label());
                }
            }

            info!("Poll loop stopped");
        })
    }

    fn spawn_event_consumer(&self, mut events: mpsc::Receiver<ServerEvent>) -> JoinHandle<()> {
        let engine = self.engine.clone();

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                dispatch_event(&engine, event).await;
            }
            debug!("Event consumer stopped");
        })
    }

    fn spawn_event_stream(&self, source: Arc<HttpChallengeClient>) -> JoinHandle<()> {
        let events = self.events_tx.clone();
        let is_running = self.is_running.clone();

        tokio::spawn(async move {
            while *is_running.read().await {
                match source.stream_events(events.clone()).await {
                    Ok(()) => info!("Server event stream closed"),
                    Err(e) => warn!("Server event stream failed: {}", e),
                }
                tokio::time::sleep(EVENT_STREAM_RETRY).await;
            }
        })
    }

    fn spawn_health_metrics(self: &Arc<Self>) -> JoinHandle<()> {
        let app_state = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEALTH_METRICS_INTERVAL);

            while app_state.is_running().await {
                interval.tick().await;
                let metrics = app_state.metrics();
                metrics
                    .service()
                    .uptime_seconds
                    .set(app_state.uptime().as_secs() as i64);

                match HealthCheck::readiness_check(app_state.clone()).await {
                    Ok(status) => metrics.update_health_status(status.as_code()),
                    Err(e) => warn!("Health metrics update failed: {}", e),
                }
            }
        })
    }
}

/// Expire the pending challenge, then issue a new one when the engine allows
/// and no game is in progress
async fn poll_engine(
    engine: &Mutex<MatchmakingEngine>,
    metrics: &MetricsCollector,
) -> Option<ChallengeOutcome> {
    let timer = metrics.start_timer();
    let mut engine = engine.lock().await;

    if let Some(challenge_id) = engine.cancel_expired_challenges().await {
        info!("Cancelled expired challenge {}", challenge_id);
    }

    // No new challenges while a game is being played
    let outcome = if engine.state().games_in_progress == 0 && engine.should_create_challenge() {
        Some(engine.challenge().await)
    } else {
        None
    };

    metrics.set_rate_limit_cooldown(engine.status().in_rate_limit_cooldown);
    metrics.record_poll(timer.stop());
    outcome
}

async fn dispatch_event(engine: &Mutex<MatchmakingEngine>, event: ServerEvent) {
    match event {
        ServerEvent::GameStart { game } => engine.lock().await.on_game_started(&game.id),
        ServerEvent::GameFinish { game } => engine.lock().await.on_game_finished(&game.id),
        ServerEvent::Other => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryChallengeClient;
    use crate::clock::ManualClock;
    use crate::config::{ChallengeFields, ModeSetting, VariantSetting};
    use crate::types::{BotCandidate, GameRef, PerfRecord};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn bot(name: &str) -> BotCandidate {
        let mut perfs = HashMap::new();
        perfs.insert("bullet".to_string(), PerfRecord { rating: 1800, games: 30 });
        BotCandidate {
            username: name.to_string(),
            disabled: false,
            tos_violation: false,
            perfs,
        }
    }

    fn app(client: Arc<InMemoryChallengeClient>, clock: &ManualClock) -> AppState {
        let mut config = AppConfig::default();
        config.service.enable_health_server = false;
        config.matchmaking.defaults = ChallengeFields {
            allow_matchmaking: Some(true),
            challenge_timeout: Some(1),
            challenge_mode: Some(ModeSetting::Casual),
            challenge_variant: Some(VariantSetting::Named("standard".to_string())),
            ..Default::default()
        };

        let engine = MatchmakingEngine::with_parts(
            &config.matchmaking,
            config.challenge.matchmaking_variants(),
            "MyBot",
            client,
            Arc::new(clock.clone()),
            StdRng::seed_from_u64(1),
        )
        .unwrap();
        AppState::with_engine(config, engine, Arc::new(MetricsCollector::new().unwrap()))
    }

    #[tokio::test]
    async fn test_poll_once_issues_and_expires_challenges() {
        let clock = ManualClock::starting_now();
        let client = Arc::new(InMemoryChallengeClient::with_bots(vec![bot("Rival")]));
        let app = app(client.clone(), &clock);

        assert_eq!(app.poll_once().await, None);

        clock.advance_secs(60);
        assert_eq!(
            app.poll_once().await,
            Some(ChallengeOutcome::Created("challenge1".to_string()))
        );

        // The expired challenge is cancelled and a new one goes out in the same tick
        clock.advance_secs(26);
        assert_eq!(
            app.poll_once().await,
            Some(ChallengeOutcome::Created("challenge2".to_string()))
        );
        assert_eq!(client.cancelled_challenges(), vec!["challenge1".to_string()]);
        assert_eq!(app.engine_status().await.stats.cancelled, 1);
    }

    #[tokio::test]
    async fn test_events_reach_the_engine() {
        let clock = ManualClock::starting_now();
        let client = Arc::new(InMemoryChallengeClient::with_bots(vec![bot("Rival")]));
        let app = app(client, &clock);

        clock.advance_secs(60);
        app.poll_once().await;
        app.handle_event(ServerEvent::GameStart {
            game: GameRef {
                id: "g1".to_string(),
            },
        })
        .await;
        app.handle_event(ServerEvent::Other).await;

        let status = app.engine_status().await;
        assert!(status.state.active_challenge_id.is_none());
        assert_eq!(status.stats.games_started, 1);
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let clock = ManualClock::starting_now();
        let client = Arc::new(InMemoryChallengeClient::new());
        let app = Arc::new(app(client, &clock));

        app.start().await.unwrap();
        assert!(app.is_running().await);
        assert!(app.start().await.is_err());

        app.event_sender()
            .send(ServerEvent::GameFinish {
                game: GameRef {
                    id: "g2".to_string(),
                },
            })
            .await
            .unwrap();
        for _ in 0..50 {
            if app.engine_status().await.stats.games_finished == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(app.engine_status().await.stats.games_finished, 1);

        app.shutdown().await.unwrap();
        assert!(!app.is_running().await);
    }
}
