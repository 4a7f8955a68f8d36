use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::api::ApiError;
use crate::log_store::{details, LogCategory, LogStore};
use crate::notifications::{Notifier, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Badge {
    Success,
    Warning,
    Danger,
    Secondary,
    Primary,
}

impl Badge {
    #[must_use]
    pub fn style_class(self) -> &'static str {
        match self {
            Self::Success => "bg-success",
            Self::Warning => "bg-warning",
            Self::Danger => "bg-danger",
            Self::Secondary => "bg-secondary",
            Self::Primary => "bg-primary",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown status `{0}`")]
pub struct UnknownStatus(pub String);

/// Lifecycle state reported for a cloud instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
    Available,
    Online,
    Runnable,
    Active,
    Ready,
    Stopped,
    Error,
    Warning,
}

impl InstanceStatus {
    #[must_use]
    pub fn badge(self) -> Badge {
        match self {
            Self::Available | Self::Online | Self::Runnable | Self::Active | Self::Ready => {
                Badge::Success
            }
            Self::Stopped => Badge::Secondary,
            Self::Error => Badge::Danger,
            Self::Warning => Badge::Warning,
        }
    }
}

impl FromStr for InstanceStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "available" => Ok(Self::Available),
            "online" => Ok(Self::Online),
            "runnable" => Ok(Self::Runnable),
            "active" => Ok(Self::Active),
            "ready" => Ok(Self::Ready),
            "stopped" => Ok(Self::Stopped),
            "error" => Ok(Self::Error),
            "warning" => Ok(Self::Warning),
            _ => Err(UnknownStatus(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Warning,
    Degraded,
    Critical,
}

impl HealthStatus {
    #[must_use]
    pub fn badge(self) -> Badge {
        match self {
            Self::Healthy => Badge::Success,
            Self::Warning | Self::Degraded => Badge::Warning,
            Self::Critical => Badge::Danger,
        }
    }
}

impl FromStr for HealthStatus {
    type Err = UnknownStatus;

    /// Health values are upper-case on the wire and matched exactly.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "HEALTHY" => Ok(Self::Healthy),
            "WARNING" => Ok(Self::Warning),
            "DEGRADED" => Ok(Self::Degraded),
            "CRITICAL" => Ok(Self::Critical),
            _ => Err(UnknownStatus(value.to_string())),
        }
    }
}

/// Badge for a raw status string; unknown values render as secondary.
#[must_use]
pub fn instance_badge(raw: &str) -> Badge {
    raw.parse::<InstanceStatus>()
        .map_or(Badge::Secondary, InstanceStatus::badge)
}

#[must_use]
pub fn health_badge(raw: &str) -> Badge {
    raw.parse::<HealthStatus>()
        .map_or(Badge::Secondary, HealthStatus::badge)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMetrics {
    #[serde(default)]
    pub active_connections: u64,
    #[serde(default)]
    pub health_score: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitoringOverview {
    pub total_active_connections: u64,
    pub average_health_score: u32,
}

impl MonitoringOverview {
    #[must_use]
    pub fn from_metrics(metrics: &BTreeMap<String, ProviderMetrics>) -> Self {
        if metrics.is_empty() {
            return Self::default();
        }

        let total_active_connections = metrics.values().map(|m| m.active_connections).sum();
        let total_score: f64 = metrics.values().map(|m| m.health_score).sum();
        #[allow(clippy::cast_precision_loss)]
        let average = total_score / metrics.len() as f64;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let average_health_score = average.round().max(0.0) as u32;

        Self {
            total_active_connections,
            average_health_score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderHealth {
    pub provider: String,
    pub status: Option<HealthStatus>,
    pub raw: String,
}

impl ProviderHealth {
    #[must_use]
    pub fn badge(&self) -> Badge {
        self.status.map_or(Badge::Secondary, HealthStatus::badge)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringSnapshot {
    pub taken_at: DateTime<Utc>,
    pub metrics: BTreeMap<String, ProviderMetrics>,
    pub overview: MonitoringOverview,
    pub health: Vec<ProviderHealth>,
}

#[async_trait]
pub trait MonitoringApi: Send + Sync {
    async fn metrics(&self) -> Result<BTreeMap<String, ProviderMetrics>, ApiError>;
    async fn health(&self) -> Result<BTreeMap<String, String>, ApiError>;
}

#[derive(Debug, Error)]
#[error("monitoring refresh failed: {0}")]
pub struct CloudMonitorError(#[source] pub ApiError);

pub struct CloudMonitor<A: MonitoringApi> {
    api: Arc<A>,
    logs: Arc<LogStore>,
    notifier: Arc<dyn Notifier>,
    latest: Mutex<Option<MonitoringSnapshot>>,
}

impl<A: MonitoringApi> CloudMonitor<A> {
    #[must_use]
    pub fn new(api: Arc<A>, logs: Arc<LogStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            api,
            logs,
            notifier,
            latest: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn latest(&self) -> Option<MonitoringSnapshot> {
        self.latest.lock().clone()
    }

    pub async fn refresh(&self) -> Result<MonitoringSnapshot, CloudMonitorError> {
        self.refresh_at(Utc::now()).await
    }

    pub async fn refresh_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<MonitoringSnapshot, CloudMonitorError> {
        let metrics = self.api.metrics().await.map_err(|error| self.report(error))?;
        let health = self.api.health().await.map_err(|error| self.report(error))?;

        let health = health
            .into_iter()
            .map(|(provider, raw)| ProviderHealth {
                status: raw.parse().ok(),
                provider,
                raw,
            })
            .collect::<Vec<_>>();
        let snapshot = MonitoringSnapshot {
            taken_at: now,
            overview: MonitoringOverview::from_metrics(&metrics),
            metrics,
            health,
        };

        self.logs.record(
            LogCategory::Monitoring,
            "Refreshed cloud monitoring",
            details([
                ("providers", json!(snapshot.metrics.len())),
                (
                    "activeConnections",
                    json!(snapshot.overview.total_active_connections),
                ),
                ("healthScore", json!(snapshot.overview.average_health_score)),
            ]),
        );
        *self.latest.lock() = Some(snapshot.clone());
        Ok(snapshot)
    }

    fn report(&self, error: ApiError) -> CloudMonitorError {
        self.logs.record(
            LogCategory::Error,
            "Failed to refresh cloud monitoring",
            details([("error", json!(error.to_string()))]),
        );
        self.notifier
            .notify(&format!("Error refreshing dashboard: {error}"), Severity::Danger);
        CloudMonitorError(error)
    }
}
