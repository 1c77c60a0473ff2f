//! Metrics and monitoring for the bot matchmaker
//!
//! Prometheus metrics collection plus the HTTP server exposing health,
//! readiness and metrics endpoints.

pub mod collector;
pub mod health;

pub use collector::{ChallengeMetrics, MetricsCollector, MetricsTimer, ServiceMetrics};
pub use health::{HealthServer, HealthServerConfig};
