//! Worst-case utilization over the sampling window

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{Datapoint, MetricQuery, MetricsSource, Statistic};
use crate::models::{round2, ResourceDescriptor, Service, UtilizationProfile};

/// Trailing window utilization is sampled over
pub const SAMPLING_WINDOW_DAYS: i64 = 7;

/// Bucket size of the sampled series
pub const SAMPLING_PERIOD_SECS: u32 = 3600;

/// Window and bucket of the free-storage reading used for current storage
const FREE_STORAGE_WINDOW_SECS: i64 = 60;

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Largest value of a series, zero for an empty one
pub fn peak(points: &[Datapoint]) -> f64 {
    points.iter().map(|p| p.value).fold(0.0, f64::max)
}

pub fn bytes_to_gib(bytes: f64) -> f64 {
    bytes / BYTES_PER_GIB
}

/// Combined transmit and receive rate in Mbit/s
pub fn network_mbps(transmit_bytes_per_sec: f64, receive_bytes_per_sec: f64) -> f64 {
    (transmit_bytes_per_sec + receive_bytes_per_sec) * 8.0 / 1e6
}

/// Combined read and write operations per second
pub fn combined_iops(read: f64, write: f64) -> f64 {
    round2(read + write)
}

/// Combined read and write throughput in MB/s
pub fn throughput_mb_per_sec(read_bytes_per_sec: f64, write_bytes_per_sec: f64) -> f64 {
    round2((read_bytes_per_sec + write_bytes_per_sec) / BYTES_PER_MIB)
}

/// Reduces metric series of one resource to a [`UtilizationProfile`]
pub struct UtilizationSampler {
    metrics: Arc<dyn MetricsSource>,
    end: DateTime<Utc>,
}

impl UtilizationSampler {
    pub fn new(metrics: Arc<dyn MetricsSource>) -> Self {
        Self::ending_at(metrics, Utc::now())
    }

    pub fn ending_at(metrics: Arc<dyn MetricsSource>, end: DateTime<Utc>) -> Self {
        Self { metrics, end }
    }

    /// Peak of one metric over the window; a failed fetch is logged and read as no data
    async fn metric_peak(&self, service: Service, resource_id: &str, metric: &str, unit: &str) -> f64 {
        let query = MetricQuery {
            service,
            resource_id: resource_id.to_string(),
            metric_name: metric.to_string(),
            start: self.end - Duration::days(SAMPLING_WINDOW_DAYS),
            end: self.end,
            period_secs: SAMPLING_PERIOD_SECS,
            statistic: Statistic::Maximum,
            unit: unit.to_string(),
        };

        match self.metrics.datapoints(&query).await {
            Ok(points) => peak(&points),
            Err(e) => {
                warn!(
                    service = %service,
                    resource = %resource_id,
                    metric = %metric,
                    error = %e,
                    "Metric unavailable, treating as zero"
                );
                0.0
            }
        }
    }

    /// Sample every dimension the service publishes
    pub async fn sample(&self, service: Service, resource_id: &str) -> UtilizationProfile {
        let cpu = self
            .metric_peak(service, resource_id, "CPUUtilization", "Percent")
            .await;
        let freeable = self
            .metric_peak(service, resource_id, "FreeableMemory", "Bytes")
            .await;
        let transmit = self
            .metric_peak(service, resource_id, "NetworkTransmitThroughput", "Bytes/Second")
            .await;
        let receive = self
            .metric_peak(service, resource_id, "NetworkReceiveThroughput", "Bytes/Second")
            .await;

        let (iops_max, throughput_mbps_max) = match service {
            Service::Rds => {
                let read_iops = self
                    .metric_peak(service, resource_id, "ReadIOPS", "Count/Second")
                    .await;
                let write_iops = self
                    .metric_peak(service, resource_id, "WriteIOPS", "Count/Second")
                    .await;
                let read_bytes = self
                    .metric_peak(service, resource_id, "ReadThroughput", "Bytes/Second")
                    .await;
                let write_bytes = self
                    .metric_peak(service, resource_id, "WriteThroughput", "Bytes/Second")
                    .await;
                (
                    combined_iops(read_iops, write_iops),
                    throughput_mb_per_sec(read_bytes, write_bytes),
                )
            }
            Service::ElastiCache => (0.0, 0.0),
        };

        let profile = UtilizationProfile {
            cpu_percent_max: round2(cpu),
            memory_free_gb_max: bytes_to_gib(freeable),
            network_mbps_max: network_mbps(transmit, receive),
            iops_max,
            throughput_mbps_max,
        };

        debug!(
            service = %service,
            resource = %resource_id,
            cpu_percent_max = profile.cpu_percent_max,
            memory_free_gb_max = profile.memory_free_gb_max,
            network_mbps_max = profile.network_mbps_max,
            "Utilization sampled"
        );

        profile
    }
}

/// Storage in use right now: allocated GB minus the latest free-space reading
///
/// `None` when the service does not report free storage or no reading exists
/// for the last minute.
pub async fn provisioned_storage_now(
    metrics: &dyn MetricsSource,
    resource: &ResourceDescriptor,
    now: DateTime<Utc>,
) -> Option<f64> {
    if resource.service != Service::Rds {
        return None;
    }

    let query = MetricQuery {
        service: resource.service,
        resource_id: resource.id.clone(),
        metric_name: "FreeStorageSpace".to_string(),
        start: now - Duration::seconds(FREE_STORAGE_WINDOW_SECS),
        end: now,
        period_secs: FREE_STORAGE_WINDOW_SECS as u32,
        statistic: Statistic::Average,
        unit: "Bytes".to_string(),
    };

    match metrics.datapoints(&query).await {
        Ok(points) => points
            .iter()
            .max_by_key(|point| point.timestamp)
            .map(|point| (resource.storage_gb - bytes_to_gib(point.value)).max(0.0)),
        Err(e) => {
            warn!(
                resource = %resource.id,
                error = %e,
                "Free storage unavailable, current storage priced at zero"
            );
            None
        }
    }
}
