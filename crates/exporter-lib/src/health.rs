//! Last-run state of the price catalog and the scheduled jobs
//!
//! `/healthz` reports this state, `/readyz` only asks whether a catalog
//! has been loaded. Any problem a run reports degrades the report; the
//! exporter keeps serving the gauges it has.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::pipeline::RunSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Catalog currently used for pricing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogState {
    pub built_at: Option<DateTime<Utc>>,
    /// Error of the latest refresh, cleared by the next successful one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_error: Option<String>,
}

/// Outcome of the latest run of an account-wide job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub finished_at: DateTime<Utc>,
    pub accounts: usize,
    pub accounts_skipped: usize,
    pub services_failed: usize,
}

impl JobState {
    fn from_summary(summary: &RunSummary) -> Self {
        Self {
            finished_at: Utc::now(),
            accounts: summary.accounts_attempted(),
            accounts_skipped: summary.accounts_failed,
            services_failed: summary.services_failed,
        }
    }

    fn problem(&self, job: &str) -> Option<String> {
        if self.accounts_skipped > 0 {
            Some(format!(
                "{}: {} of {} accounts skipped",
                job, self.accounts_skipped, self.accounts
            ))
        } else if self.services_failed > 0 {
            Some(format!("{}: {} services failed", job, self.services_failed))
        } else {
            None
        }
    }
}

/// Delivery of the latest recommendation batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierState {
    pub sent: usize,
    pub undelivered: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub catalog: CatalogState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_collection: Option<JobState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<JobState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifier: Option<NotifierState>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub problems: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Default)]
struct ExporterState {
    catalog: CatalogState,
    cost_collection: Option<JobState>,
    recommendations: Option<JobState>,
    notifier: Option<NotifierState>,
}

impl ExporterState {
    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if let Some(error) = &self.catalog.refresh_error {
            problems.push(format!("catalog refresh failed: {}", error));
        }
        problems.extend(
            self.cost_collection
                .as_ref()
                .and_then(|job| job.problem(crate::pipeline::COST_JOB)),
        );
        problems.extend(
            self.recommendations
                .as_ref()
                .and_then(|job| job.problem(crate::pipeline::RECOMMENDATION_JOB)),
        );
        if let Some(notifier) = self.notifier.as_ref().filter(|n| n.undelivered > 0) {
            problems.push(format!("{} messages not delivered", notifier.undelivered));
        }
        problems
    }
}

/// Shared handle updated by the scheduler and read by the API
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<ExporterState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog was built and swapped in
    pub async fn catalog_loaded(&self, built_at: DateTime<Utc>) {
        let mut state = self.state.write().await;
        state.catalog = CatalogState {
            built_at: Some(built_at),
            refresh_error: None,
        };
    }

    /// A refresh failed; the previous catalog stays in use
    pub async fn catalog_refresh_failed(&self, reason: impl Into<String>) {
        self.state.write().await.catalog.refresh_error = Some(reason.into());
    }

    pub async fn record_cost_collection(&self, summary: &RunSummary) {
        self.state.write().await.cost_collection = Some(JobState::from_summary(summary));
    }

    /// Also records delivery, one message being due per evaluated resource
    pub async fn record_recommendations(&self, summary: &RunSummary) {
        let mut state = self.state.write().await;
        state.recommendations = Some(JobState::from_summary(summary));
        state.notifier = Some(NotifierState {
            sent: summary.messages_sent,
            undelivered: summary.resources.saturating_sub(summary.messages_sent),
        });
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        let problems = state.problems();
        HealthResponse {
            status: if problems.is_empty() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            catalog: state.catalog.clone(),
            cost_collection: state.cost_collection.clone(),
            recommendations: state.recommendations.clone(),
            notifier: state.notifier.clone(),
            problems,
        }
    }

    /// Ready as soon as a catalog exists, whatever the jobs reported since
    pub async fn readiness(&self) -> ReadinessResponse {
        if self.state.read().await.catalog.built_at.is_some() {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        } else {
            ReadinessResponse {
                ready: false,
                reason: Some("Price catalog not loaded yet".to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(processed: usize, failed: usize) -> RunSummary {
        RunSummary {
            accounts_processed: processed,
            accounts_failed: failed,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_not_ready_until_catalog_loaded() {
        let registry = HealthRegistry::new();

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("Price catalog not loaded yet"));

        registry.catalog_loaded(Utc::now()).await;
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_ready_but_degrades() {
        let registry = HealthRegistry::new();
        let built = Utc::now();
        registry.catalog_loaded(built).await;
        registry.catalog_refresh_failed("price list unavailable").await;

        assert!(registry.readiness().await.ready);
        let health = registry.health().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.catalog.built_at, Some(built));
        assert_eq!(
            health.problems,
            vec!["catalog refresh failed: price list unavailable".to_string()]
        );

        registry.catalog_loaded(Utc::now()).await;
        let health = registry.health().await;
        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(health.catalog.refresh_error.is_none());
    }

    #[tokio::test]
    async fn test_skipped_accounts_degrade_until_clean_run() {
        let registry = HealthRegistry::new();
        registry.catalog_loaded(Utc::now()).await;

        registry.record_cost_collection(&summary(2, 1)).await;
        let health = registry.health().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.problems, vec!["cost_collection: 1 of 3 accounts skipped".to_string()]);
        let job = health.cost_collection.unwrap();
        assert_eq!((job.accounts, job.accounts_skipped), (3, 1));

        registry.record_cost_collection(&summary(3, 0)).await;
        assert_eq!(registry.health().await.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_every_account_skipped_is_still_only_degraded() {
        let registry = HealthRegistry::new();
        registry.catalog_loaded(Utc::now()).await;
        registry.record_recommendations(&summary(0, 2)).await;

        assert_eq!(registry.health().await.status, HealthStatus::Degraded);
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_undelivered_messages_reported() {
        let registry = HealthRegistry::new();
        registry
            .record_recommendations(&RunSummary {
                accounts_processed: 1,
                resources: 4,
                messages_sent: 3,
                ..Default::default()
            })
            .await;

        let health = registry.health().await;
        let notifier = health.notifier.unwrap();
        assert_eq!((notifier.sent, notifier.undelivered), (3, 1));
        assert_eq!(health.problems, vec!["1 messages not delivered".to_string()]);
    }

    #[tokio::test]
    async fn test_report_omits_jobs_that_never_ran() {
        let registry = HealthRegistry::new();
        registry.catalog_loaded(Utc::now()).await;

        let json = serde_json::to_value(registry.health().await).unwrap();
        assert_eq!(json["status"], "healthy");
        assert!(json["catalog"]["built_at"].is_string());
        assert!(json.get("cost_collection").is_none());
        assert!(json.get("problems").is_none());
    }
}
