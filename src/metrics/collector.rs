//! Metrics collection using Prometheus
//!
//! Challenge outcomes, cancellations and engine gauges for the bot
//! matchmaker, exported through the health server's `/metrics` endpoint.

use crate::types::ChallengeOutcome;
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the matchmaker
#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<Registry>,
    service_metrics: ServiceMetrics,
    challenge_metrics: ChallengeMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Time spent in one poll tick
    pub poll_duration: Histogram,
}

/// Challenge-related metrics
#[derive(Clone)]
pub struct ChallengeMetrics {
    /// Matchmaking attempts by outcome
    pub challenges_total: IntCounterVec,

    /// Pending challenges cancelled after expiring
    pub challenges_cancelled_total: IntCounter,

    /// Game events observed (started / finished)
    pub games_total: IntCounterVec,

    /// Bots that passed the filter on the last attempt
    pub eligible_opponents: IntGauge,

    /// 1 while a challenge is pending
    pub active_challenge: IntGauge,

    /// 1 while the rate-limit cooldown is running
    pub rate_limit_cooldown: IntGauge,

    /// Engine flags by name (allow_matchmaking, ...)
    pub engine_flags: IntGaugeVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with its own registry
    pub fn new() -> Result<Self> {
        Self::with_registry(Arc::new(Registry::new()))
    }

    /// Create a new metrics collector on an existing registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let challenge_metrics = ChallengeMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            challenge_metrics,
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn challenges(&self) -> &ChallengeMetrics {
        &self.challenge_metrics
    }

    /// Count one matchmaking attempt under its outcome label
    pub fn record_challenge_outcome(&self, outcome: &ChallengeOutcome) {
        self.challenge_metrics
            .challenges_total
            .with_label_values(&[outcome.label()])
            .inc();

        if *outcome == ChallengeOutcome::RateLimited {
            self.set_rate_limit_cooldown(true);
        }
    }

    pub fn record_cancellation(&self) {
        self.challenge_metrics.challenges_cancelled_total.inc();
    }

    /// Count a game event, `started` or `finished`
    pub fn record_game_event(&self, event: &str) {
        self.challenge_metrics
            .games_total
            .with_label_values(&[event])
            .inc();
    }

    pub fn set_eligible_opponents(&self, count: usize) {
        self.challenge_metrics
            .eligible_opponents
            .set(count as i64);
    }

    pub fn set_active_challenge(&self, active: bool) {
        self.challenge_metrics.active_challenge.set(active as i64);
    }

    pub fn set_rate_limit_cooldown(&self, cooling_down: bool) {
        self.challenge_metrics
            .rate_limit_cooldown
            .set(cooling_down as i64);
    }

    pub fn set_engine_flag(&self, flag: &str, enabled: bool) {
        self.challenge_metrics
            .engine_flags
            .with_label_values(&[flag])
            .set(enabled as i64);
    }

    /// Record how long a poll tick took
    pub fn record_poll(&self, duration: Duration) {
        self.service_metrics
            .poll_duration
            .observe(duration.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("bot_matchmaker_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "bot_matchmaker_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let poll_duration = Histogram::with_opts(
            HistogramOpts::new(
                "bot_matchmaker_poll_duration_seconds",
                "Time spent handling one poll tick",
            )
            .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;
        registry.register(Box::new(poll_duration.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
            poll_duration,
        })
    }
}

impl ChallengeMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let challenges_total = IntCounterVec::new(
            Opts::new(
                "bot_matchmaker_challenges_total",
                "Matchmaking attempts by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(challenges_total.clone()))?;

        let challenges_cancelled_total = IntCounter::new(
            "bot_matchmaker_challenges_cancelled_total",
            "Pending challenges cancelled after expiring",
        )?;
        registry.register(Box::new(challenges_cancelled_total.clone()))?;

        let games_total = IntCounterVec::new(
            Opts::new("bot_matchmaker_games_total", "Game events observed"),
            &["event"],
        )?;
        registry.register(Box::new(games_total.clone()))?;

        let eligible_opponents = IntGauge::new(
            "bot_matchmaker_eligible_opponents",
            "Online bots that passed the filter on the last attempt",
        )?;
        registry.register(Box::new(eligible_opponents.clone()))?;

        let active_challenge = IntGauge::new(
            "bot_matchmaker_active_challenge",
            "Whether a challenge is pending (0/1)",
        )?;
        registry.register(Box::new(active_challenge.clone()))?;

        let rate_limit_cooldown = IntGauge::new(
            "bot_matchmaker_rate_limit_cooldown",
            "Whether the rate-limit cooldown is running (0/1)",
        )?;
        registry.register(Box::new(rate_limit_cooldown.clone()))?;

        let engine_flags = IntGaugeVec::new(
            Opts::new("bot_matchmaker_engine_flags", "Engine feature flags (0/1)"),
            &["flag"],
        )?;
        registry.register(Box::new(engine_flags.clone()))?;

        Ok(Self {
            challenges_total,
            challenges_cancelled_total,
            games_total,
            eligible_opponents,
            active_challenge,
            rate_limit_cooldown,
            engine_flags,
        })
    }
}
