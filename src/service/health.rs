//! Health checks
//!
//! Liveness, readiness and a detailed report built from the engine status.
//! A running rate-limit cooldown reports the service as degraded.

use crate::engine::EngineStatus;
use crate::service::app::AppState;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Engine lock wait before the engine is reported busy
const ENGINE_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Gauge value (0=unhealthy, 1=degraded, 2=healthy)
    pub fn as_code(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    fn worst(self, other: HealthStatus) -> HealthStatus {
        if other.as_code() < self.as_code() {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Detailed health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub checks: Vec<ComponentCheck>,
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    /// Optional explanation when not healthy
    pub message: Option<String>,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    pub uptime_seconds: u64,
    /// Missing when the engine stayed busy past the lock timeout
    pub engine: Option<EngineStatus>,
}

impl HealthCheck {
    /// Full health report of the service
    pub async fn check(app_state: Arc<AppState>) -> Result<Self> {
        let engine = Self::engine_status(&app_state).await;

        let checks = vec![
            Self::check_service_running(&app_state).await,
            Self::check_engine(engine.as_ref()),
            Self::check_rate_limit(engine.as_ref()),
        ];
        let status = checks
            .iter()
            .fold(HealthStatus::Healthy, |status, check| status.worst(check.status));

        Ok(HealthCheck {
            status,
            service: app_state.config().service.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats: ServiceStats {
                uptime_seconds: app_state.uptime().as_secs(),
                engine,
            },
        })
    }

    /// The service is alive while its background tasks run
    pub async fn liveness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if app_state.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Ready when running; degraded while the rate-limit cooldown runs
    pub async fn readiness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if !app_state.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }

        let engine = Self::engine_status(&app_state).await;
        Ok(Self::check_engine(engine.as_ref())
            .status
            .worst(Self::check_rate_limit(engine.as_ref()).status))
    }

    async fn engine_status(app_state: &AppState) -> Option<EngineStatus> {
        let engine = app_state.engine();
        let status = match tokio::time::timeout(ENGINE_LOCK_TIMEOUT, engine.lock()).await {
            Ok(guard) => Some(guard.status()),
            Err(_) => {
                debug!("Engine busy for more than {:?}", ENGINE_LOCK_TIMEOUT);
                None
            }
        };
        status
    }

    async fn check_service_running(app_state: &AppState) -> ComponentCheck {
        let (status, message) = if app_state.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
        }
    }

    fn check_engine(engine: Option<&EngineStatus>) -> ComponentCheck {
        let (status, message) = match engine {
            Some(status) if !status.allow_matchmaking => (
                HealthStatus::Healthy,
                Some("Matchmaking is disabled".to_string()),
            ),
            Some(_) => (HealthStatus::Healthy, None),
            None => (
                HealthStatus::Degraded,
                Some("Engine is busy".to_string()),
            ),
        };

        ComponentCheck {
            name: "matchmaking_engine".to_string(),
            status,
            message,
        }
    }

    fn check_rate_limit(engine: Option<&EngineStatus>) -> ComponentCheck {
        let (status, message) = match engine {
            Some(status) if status.in_rate_limit_cooldown => (
                HealthStatus::Degraded,
                Some(format!(
                    "Rate limited {}s ago",
                    status.state.seconds_since_rate_limited
                )),
            ),
            _ => (HealthStatus::Healthy, None),
        };

        ComponentCheck {
            name: "rate_limit".to_string(),
            status,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryChallengeClient;
    use crate::clock::ManualClock;
    use crate::config::{AppConfig, ChallengeFields, VariantSetting};
    use crate::engine::MatchmakingEngine;
    use crate::error::ClientError;
    use crate::metrics::MetricsCollector;
    use crate::types::{BotCandidate, PerfRecord};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn app_state(client: Arc<InMemoryChallengeClient>, clock: &ManualClock) -> Arc<AppState> {
        let mut config = AppConfig::default();
        config.service.enable_health_server = false;
        config.matchmaking.defaults = ChallengeFields {
            allow_matchmaking: Some(true),
            challenge_timeout: Some(1),
            challenge_variant: Some(VariantSetting::Named("standard".to_string())),
            ..Default::default()
        };
        let engine = MatchmakingEngine::with_parts(
            &config.matchmaking,
            vec!["standard".to_string()],
            "MyBot",
            client,
            Arc::new(clock.clone()),
            StdRng::seed_from_u64(9),
        )
        .unwrap();
        Arc::new(AppState::with_engine(
            config,
            engine,
            Arc::new(MetricsCollector::new().unwrap()),
        ))
    }

    #[test]
    fn test_worst_status() {
        assert_eq!(
            HealthStatus::Healthy.worst(HealthStatus::Degraded),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthStatus::Unhealthy.worst(HealthStatus::Degraded),
            HealthStatus::Unhealthy
        );
        assert_eq!(HealthStatus::Degraded.to_string(), "degraded");
    }

    #[tokio::test]
    async fn test_not_running_is_unhealthy() {
        let clock = ManualClock::starting_now();
        let app = app_state(Arc::new(InMemoryChallengeClient::new()), &clock);

        assert_eq!(
            HealthCheck::liveness_check(app.clone()).await.unwrap(),
            HealthStatus::Unhealthy
        );
        let report = HealthCheck::check(app).await.unwrap();
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert!(report.stats.engine.is_some());
        assert!(serde_json::to_string(&report)
            .unwrap()
            .contains("service_running"));
    }

    #[tokio::test]
    async fn test_rate_limit_degrades_readiness() {
        let clock = ManualClock::starting_now();
        let mut perfs = HashMap::new();
        perfs.insert("bullet".to_string(), PerfRecord { rating: 1500, games: 3 });
        let client = Arc::new(InMemoryChallengeClient::with_bots(vec![BotCandidate {
            username: "Rival".to_string(),
            disabled: false,
            tos_violation: false,
            perfs,
        }]));
        client.push_response(Err(ClientError::RateLimited));
        let app = app_state(client, &clock);
        app.start().await.unwrap();

        assert_eq!(
            HealthCheck::readiness_check(app.clone()).await.unwrap(),
            HealthStatus::Healthy
        );

        clock.advance_secs(60);
        app.poll_once().await;
        assert_eq!(
            HealthCheck::readiness_check(app.clone()).await.unwrap(),
            HealthStatus::Degraded
        );

        app.shutdown().await.unwrap();
    }
}
