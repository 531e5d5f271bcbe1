//! Observability infrastructure for the cost exporter
//!
//! Provides:
//! - Prometheus cost gauges per resource and per account/service
//! - Operational metrics (catalog size, rejected offers, account failures, job latency)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge, register_gauge_vec, register_histogram_vec, register_int_counter_vec,
    register_int_gauge_vec, Gauge, GaugeVec, HistogramVec, IntCounterVec, IntGaugeVec,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, OnceLock};
use tracing::{info, warn};

use crate::error::{FinopsError, FinopsResult};
use crate::models::{AccountCostReport, Service};
use crate::pipeline::CostSink;

/// Histogram buckets for job durations (in seconds)
const JOB_DURATION_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0];

static GLOBAL_METRICS: OnceLock<ExporterMetricsInner> = OnceLock::new();

struct ExporterMetricsInner {
    current_costs: GaugeVec,
    monthly_costs: GaugeVec,
    total_current_costs: GaugeVec,
    total_monthly_costs: GaugeVec,
    catalog_offers: IntGaugeVec,
    catalog_built_timestamp: Gauge,
    rejected_offers: IntCounterVec,
    account_failures: IntCounterVec,
    job_duration_seconds: HistogramVec,
    /// Resource series last published per (account, service)
    published: Mutex<HashMap<(String, String), BTreeSet<String>>>,
}

impl ExporterMetricsInner {
    fn new() -> Self {
        Self {
            current_costs: register_gauge_vec!(
                "current_costs",
                "Cost of a resource accrued so far in the current billing month",
                &["resource_name", "account", "service"]
            )
            .expect("Failed to register current_costs"),

            monthly_costs: register_gauge_vec!(
                "monthly_costs",
                "Forecast cost of a resource for the full billing month",
                &["resource_name", "account", "service"]
            )
            .expect("Failed to register monthly_costs"),

            total_current_costs: register_gauge_vec!(
                "total_current_costs",
                "Cost accrued so far in the current billing month per account and service",
                &["account", "service"]
            )
            .expect("Failed to register total_current_costs"),

            total_monthly_costs: register_gauge_vec!(
                "total_monthly_costs",
                "Forecast full-month cost per account and service",
                &["account", "service"]
            )
            .expect("Failed to register total_monthly_costs"),

            catalog_offers: register_int_gauge_vec!(
                "finops_catalog_offers",
                "Offers held in the price catalog per product family",
                &["service", "family"]
            )
            .expect("Failed to register finops_catalog_offers"),

            catalog_built_timestamp: register_gauge!(
                "finops_catalog_built_timestamp_seconds",
                "Unix time the active price catalog was built"
            )
            .expect("Failed to register finops_catalog_built_timestamp_seconds"),

            rejected_offers: register_int_counter_vec!(
                "finops_rejected_offers_total",
                "Price-list records rejected as malformed",
                &["service"]
            )
            .expect("Failed to register finops_rejected_offers_total"),

            account_failures: register_int_counter_vec!(
                "finops_account_failures_total",
                "Accounts skipped because credentials could not be obtained",
                &["job"]
            )
            .expect("Failed to register finops_account_failures_total"),

            job_duration_seconds: register_histogram_vec!(
                "finops_job_duration_seconds",
                "Wall-clock duration of scheduled jobs",
                &["job"],
                JOB_DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register finops_job_duration_seconds"),

            published: Mutex::new(HashMap::new()),
        }
    }
}

/// Exporter metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share it.
#[derive(Clone)]
pub struct ExporterMetrics {
    _private: (),
}

impl Default for ExporterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ExporterMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ExporterMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ExporterMetricsInner {
        GLOBAL_METRICS.get_or_init(ExporterMetricsInner::new)
    }

    pub fn set_catalog_offers(&self, service: Service, family: &str, count: usize) {
        self.inner()
            .catalog_offers
            .with_label_values(&[service.label(), family])
            .set(count as i64);
    }

    pub fn set_catalog_built(&self, unix_secs: i64) {
        self.inner().catalog_built_timestamp.set(unix_secs as f64);
    }

    pub fn inc_rejected_offers(&self, service: Service, count: usize) {
        self.inner()
            .rejected_offers
            .with_label_values(&[service.label()])
            .inc_by(count as u64);
    }

    pub fn inc_account_failures(&self, job: &str) {
        self.inner().account_failures.with_label_values(&[job]).inc();
    }

    pub fn observe_job_duration(&self, job: &str, duration_secs: f64) {
        self.inner()
            .job_duration_seconds
            .with_label_values(&[job])
            .observe(duration_secs);
    }

    /// Remove per-resource series of resources missing from the latest report
    fn retire_stale_series(&self, report: &AccountCostReport) {
        let inner = self.inner();
        let service = report.service.label();
        let current: BTreeSet<String> = report.resources.keys().cloned().collect();

        let mut published = match inner.published.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let previous = published
            .insert((report.account.clone(), service.to_string()), current.clone())
            .unwrap_or_default();

        for gone in previous.difference(&current) {
            let labels = [gone.as_str(), report.account.as_str(), service];
            let _ = inner.current_costs.remove_label_values(&labels);
            let _ = inner.monthly_costs.remove_label_values(&labels);
        }
    }
}

fn publish_err(metric: &str, e: prometheus::Error) -> FinopsError {
    FinopsError::Publish(format!("{}: {}", metric, e))
}

impl CostSink for ExporterMetrics {
    fn publish(&self, report: &AccountCostReport) -> FinopsResult<()> {
        let inner = self.inner();
        let service = report.service.label();
        let account = report.account.as_str();

        for (resource, projection) in &report.resources {
            let labels = [resource.as_str(), account, service];
            inner
                .current_costs
                .get_metric_with_label_values(&labels)
                .map_err(|e| publish_err("current_costs", e))?
                .set(projection.current_period_cost);
            inner
                .monthly_costs
                .get_metric_with_label_values(&labels)
                .map_err(|e| publish_err("monthly_costs", e))?
                .set(projection.full_month_cost);
        }

        inner
            .total_current_costs
            .get_metric_with_label_values(&[account, service])
            .map_err(|e| publish_err("total_current_costs", e))?
            .set(report.total_current);
        inner
            .total_monthly_costs
            .get_metric_with_label_values(&[account, service])
            .map_err(|e| publish_err("total_monthly_costs", e))?
            .set(report.total_month);

        self.retire_stale_series(report);
        Ok(())
    }
}

/// Structured logger for exporter events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, accounts: usize, discount: f64) {
        info!(
            event = "exporter_started",
            instance = %self.instance,
            exporter_version = %version,
            accounts = accounts,
            discount = discount,
            "Cost exporter started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "exporter_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Cost exporter shutting down"
        );
    }

    pub fn log_catalog_built(&self, service: Service, offers: usize, rejected: usize) {
        if rejected > 0 {
            warn!(
                event = "catalog_built",
                instance = %self.instance,
                service = %service,
                offers = offers,
                rejected = rejected,
                "Price catalog built with rejected records"
            );
        } else {
            info!(
                event = "catalog_built",
                instance = %self.instance,
                service = %service,
                offers = offers,
                "Price catalog built"
            );
        }
    }

    pub fn log_catalog_refresh_failed(&self, error: &str) {
        warn!(
            event = "catalog_refresh_failed",
            instance = %self.instance,
            error = %error,
            "Catalog refresh failed, keeping previous catalog"
        );
    }

    pub fn log_account_skipped(&self, job: &str, account: &str, reason: &str) {
        warn!(
            event = "account_skipped",
            instance = %self.instance,
            job = %job,
            account = %account,
            reason = %reason,
            "Skipping account"
        );
    }

    pub fn log_costs_published(&self, account: &str, service: Service, resources: usize, total_month: f64) {
        info!(
            event = "costs_published",
            instance = %self.instance,
            account = %account,
            service = %service,
            resources = resources,
            total_monthly_costs = total_month,
            "Published cost metrics"
        );
    }

    pub fn log_recommendation(
        &self,
        account: &str,
        service: Service,
        resource_id: &str,
        current_class: &str,
        candidates: usize,
    ) {
        info!(
            event = "recommendation_generated",
            instance = %self.instance,
            account = %account,
            service = %service,
            resource = %resource_id,
            current_class = %current_class,
            candidates = candidates,
            "Generated rightsizing recommendation"
        );
    }

    pub fn log_job_complete(&self, job: &str, duration_secs: f64, accounts: usize, failed: usize) {
        info!(
            event = "job_complete",
            instance = %self.instance,
            job = %job,
            duration_secs = duration_secs,
            accounts_processed = accounts,
            accounts_failed = failed,
            "Scheduled job finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CostProjection;

    fn gauge_value(vec: &GaugeVec, labels: &[&str]) -> f64 {
        vec.get_metric_with_label_values(labels).unwrap().get()
    }

    #[test]
    fn test_publish_sets_resource_and_total_gauges() {
        let metrics = ExporterMetrics::new();
        let report = AccountCostReport::from_projections(
            "111111111111",
            Service::Rds,
            vec![(
                "orders-db".to_string(),
                CostProjection {
                    current_period_cost: 9.8,
                    full_month_cost: 25.4,
                },
            )],
        );

        metrics.publish(&report).unwrap();

        let inner = metrics.inner();
        assert_eq!(gauge_value(&inner.current_costs, &["orders-db", "111111111111", "rds"]), 9.8);
        assert_eq!(gauge_value(&inner.monthly_costs, &["orders-db", "111111111111", "rds"]), 25.4);
        assert_eq!(gauge_value(&inner.total_monthly_costs, &["111111111111", "rds"]), 25.4);
    }

    #[test]
    fn test_vanished_resource_series_are_removed() {
        let metrics = ExporterMetrics::new();
        let projection = CostProjection {
            current_period_cost: 1.0,
            full_month_cost: 2.0,
        };

        let first = AccountCostReport::from_projections(
            "222222222222",
            Service::ElastiCache,
            vec![("a".to_string(), projection), ("b".to_string(), projection)],
        );
        metrics.publish(&first).unwrap();

        let second = AccountCostReport::from_projections(
            "222222222222",
            Service::ElastiCache,
            vec![("a".to_string(), projection)],
        );
        metrics.publish(&second).unwrap();

        let families = prometheus::gather();
        let monthly = families
            .iter()
            .find(|family| family.get_name() == "monthly_costs")
            .unwrap();
        let names: Vec<_> = monthly
            .get_metric()
            .iter()
            .filter(|m| m.get_label().iter().any(|l| l.get_value() == "222222222222"))
            .flat_map(|m| {
                m.get_label()
                    .iter()
                    .filter(|l| l.get_name() == "resource_name")
                    .map(|l| l.get_value().to_string())
                    .collect::<Vec<_>>()
            })
            .collect();
        assert_eq!(names, vec!["a".to_string()]);
    }

    #[test]
    fn test_operational_metrics() {
        let metrics = ExporterMetrics::new();
        metrics.set_catalog_offers(Service::Rds, "Database Instance", 42);
        metrics.set_catalog_built(1_700_000_000);
        metrics.inc_rejected_offers(Service::Rds, 2);
        metrics.inc_account_failures("cost_collection");
        metrics.observe_job_duration("cost_collection", 1.5);

        let inner = metrics.inner();
        assert_eq!(
            inner
                .catalog_offers
                .with_label_values(&["rds", "Database Instance"])
                .get(),
            42
        );
        assert!(inner.rejected_offers.with_label_values(&["rds"]).get() >= 2);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("finops-exporter");
        assert_eq!(logger.instance, "finops-exporter");
    }
}
