//! The scheduled jobs: cost collection and rightsizing recommendations
//!
//! Both jobs walk the configured accounts in order. An account whose
//! credentials cannot be obtained is logged, counted and skipped; a service
//! that fails inside an account does not stop the other service.

pub mod refresh;

pub use refresh::{load_catalogs, refresh_catalogs, CatalogSettings};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::catalog::{Catalog, CatalogHandle, ProductFamily};
use crate::collector::{
    describe_resources, provisioned_storage_now, AccountClients, CredentialProvider,
    UtilizationSampler,
};
use crate::cost::{calculate_monthly_and_current, BillingPeriod};
use crate::error::FinopsResult;
use crate::models::{AccountCostReport, Service};
use crate::observability::{ExporterMetrics, StructuredLogger};
use crate::recommend::{find_candidates, format_recommendation, CandidateQuery, Recommendation};

pub const COST_JOB: &str = "cost_collection";
pub const RECOMMENDATION_JOB: &str = "recommendations";
pub const CATALOG_JOB: &str = "catalog_refresh";

/// Destination of per-account cost figures
pub trait CostSink: Send + Sync {
    fn publish(&self, report: &AccountCostReport) -> FinopsResult<()>;
}

/// Destination of recommendation messages
#[async_trait]
pub trait ChatNotifier: Send + Sync {
    async fn notify(&self, message: &str) -> FinopsResult<()>;
}

/// Counters of one job run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub accounts_processed: usize,
    pub accounts_failed: usize,
    pub services_failed: usize,
    pub resources: usize,
    pub messages_sent: usize,
}

impl RunSummary {
    pub fn accounts_attempted(&self) -> usize {
        self.accounts_processed + self.accounts_failed
    }
}

/// Settings shared by both jobs
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Role assumed in every member account
    pub role_name: String,
    /// Enterprise discount applied uniformly, in [0, 1]
    pub discount: f64,
}

pub struct Pipeline {
    credentials: Arc<dyn CredentialProvider>,
    catalogs: Arc<CatalogHandle>,
    settings: PipelineSettings,
    metrics: ExporterMetrics,
    logger: StructuredLogger,
}

impl Pipeline {
    pub fn new(
        credentials: Arc<dyn CredentialProvider>,
        catalogs: Arc<CatalogHandle>,
        settings: PipelineSettings,
        metrics: ExporterMetrics,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            credentials,
            catalogs,
            settings,
            metrics,
            logger,
        }
    }

    pub fn catalogs(&self) -> &Arc<CatalogHandle> {
        &self.catalogs
    }

    /// Delegated clients for an account; a failure is recorded against `job`
    async fn assume(&self, job: &str, account: &str, summary: &mut RunSummary) -> Option<AccountClients> {
        match self.credentials.assume(account, &self.settings.role_name).await {
            Ok(clients) => {
                summary.accounts_processed += 1;
                Some(clients)
            }
            Err(e) => {
                summary.accounts_failed += 1;
                self.metrics.inc_account_failures(job);
                self.logger.log_account_skipped(job, account, &e.to_string());
                None
            }
        }
    }

    fn finish(&self, job: &str, started: Instant, summary: &RunSummary) {
        let elapsed = started.elapsed().as_secs_f64();
        self.metrics.observe_job_duration(job, elapsed);
        self.logger
            .log_job_complete(job, elapsed, summary.accounts_processed, summary.accounts_failed);
    }

    /// Price every resource of every account and publish the figures
    pub async fn collect_costs(&self, accounts: &[String], sink: &dyn CostSink) -> RunSummary {
        self.collect_costs_at(accounts, sink, Local::now()).await
    }

    pub async fn collect_costs_at(
        &self,
        accounts: &[String],
        sink: &dyn CostSink,
        now: DateTime<Local>,
    ) -> RunSummary {
        let started = Instant::now();
        let catalogs = self.catalogs.snapshot();
        let period = BillingPeriod::at(&now);
        let mut summary = RunSummary::default();

        for account in accounts {
            let Some(clients) = self.assume(COST_JOB, account, &mut summary).await else {
                continue;
            };

            for service in Service::ALL {
                let report = self
                    .account_costs(&clients, service, catalogs.get(service), &period, now.with_timezone(&Utc))
                    .await;

                match report {
                    Ok(report) => {
                        summary.resources += report.resources.len();
                        match sink.publish(&report) {
                            Ok(()) => self.logger.log_costs_published(
                                account,
                                service,
                                report.resources.len(),
                                report.total_month,
                            ),
                            Err(e) => warn!(account = %account, service = %service, error = %e, "Failed to publish costs"),
                        }
                    }
                    Err(e) => {
                        summary.services_failed += 1;
                        warn!(
                            account = %account,
                            service = %service,
                            error = format!("{:#}", e),
                            "Cost collection failed for service"
                        );
                    }
                }
            }
        }

        self.finish(COST_JOB, started, &summary);
        summary
    }

    async fn account_costs(
        &self,
        clients: &AccountClients,
        service: Service,
        catalog: &Catalog,
        period: &BillingPeriod,
        now: DateTime<Utc>,
    ) -> Result<AccountCostReport> {
        let resources = describe_resources(clients.inventory.as_ref(), service).await?;
        let mut projections = Vec::with_capacity(resources.len());

        for resource in &resources {
            let storage_now = provisioned_storage_now(clients.metrics.as_ref(), resource, now).await;
            let snapshot_gb = match clients.inventory.latest_snapshot_gb(service, &resource.id).await {
                Ok(size) => size,
                Err(e) => {
                    debug!(resource = %resource.id, error = %e, "No snapshot size, pricing snapshots at zero");
                    None
                }
            };

            let projection = calculate_monthly_and_current(
                resource,
                catalog,
                self.settings.discount,
                storage_now,
                snapshot_gb,
                period,
            );
            projections.push((resource.id.clone(), projection));
        }

        Ok(AccountCostReport::from_projections(
            clients.account.clone(),
            service,
            projections,
        ))
    }

    /// Search cheaper capacity for every resource and post one message each
    pub async fn generate_recommendations(
        &self,
        accounts: &[String],
        notifier: &dyn ChatNotifier,
    ) -> RunSummary {
        self.generate_recommendations_at(accounts, notifier, Local::now())
            .await
    }

    pub async fn generate_recommendations_at(
        &self,
        accounts: &[String],
        notifier: &dyn ChatNotifier,
        now: DateTime<Local>,
    ) -> RunSummary {
        let started = Instant::now();
        let catalogs = self.catalogs.snapshot();
        let hours_in_month = BillingPeriod::at(&now).hours_in_month;
        let mut summary = RunSummary::default();

        for account in accounts {
            let Some(clients) = self.assume(RECOMMENDATION_JOB, account, &mut summary).await else {
                continue;
            };

            for service in Service::ALL {
                let sampler = UtilizationSampler::ending_at(clients.metrics.clone(), now.with_timezone(&Utc));
                let outcome = self
                    .account_recommendations(
                        &clients,
                        service,
                        catalogs.get(service),
                        &sampler,
                        hours_in_month,
                        notifier,
                        &mut summary,
                    )
                    .await;

                if let Err(e) = outcome {
                    summary.services_failed += 1;
                    warn!(
                        account = %account,
                        service = %service,
                        error = format!("{:#}", e),
                        "Recommendation run failed for service"
                    );
                }
            }
        }

        self.finish(RECOMMENDATION_JOB, started, &summary);
        summary
    }

    #[allow(clippy::too_many_arguments)]
    async fn account_recommendations(
        &self,
        clients: &AccountClients,
        service: Service,
        catalog: &Catalog,
        sampler: &UtilizationSampler,
        hours_in_month: f64,
        notifier: &dyn ChatNotifier,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let resources = describe_resources(clients.inventory.as_ref(), service).await?;

        for resource in resources {
            let Some(current) =
                catalog.instance_offer(service, &resource.capacity_class, &resource.topology)
            else {
                warn!(
                    account = %clients.account,
                    service = %service,
                    resource = %resource.id,
                    capacity_class = %resource.capacity_class,
                    topology = %resource.topology,
                    "Current capacity class not in catalog, skipping"
                );
                continue;
            };

            let utilization = sampler.sample(service, &resource.id).await;
            let query = CandidateQuery::for_current(current, utilization, None);
            let candidates = catalog
                .family(ProductFamily::instances_of(service))
                .map(|offers| find_candidates(&query, offers, hours_in_month))
                .unwrap_or_default();

            let recommendation = Recommendation {
                account: clients.account.clone(),
                service,
                resource_id: resource.id,
                current_class: resource.capacity_class,
                utilization,
                candidates,
            };

            self.logger.log_recommendation(
                &recommendation.account,
                service,
                &recommendation.resource_id,
                &recommendation.current_class,
                recommendation.candidates.len(),
            );
            summary.resources += 1;

            match notifier.notify(&format_recommendation(&recommendation)).await {
                Ok(()) => summary.messages_sent += 1,
                Err(e) => warn!(
                    resource = %recommendation.resource_id,
                    error = %e,
                    "Failed to deliver recommendation"
                ),
            }
        }

        Ok(())
    }
}
