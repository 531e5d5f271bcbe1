//! Seams to the provider's inventory, monitoring and price-list APIs
//!
//! The pipeline only talks to these traits. [`ExportDirectory`] implements
//! all of them over the provider's JSON output captured on disk.

mod export_dir;
pub mod inventory;
pub mod utilization;

pub use export_dir::{AccountExport, ExportDirectory};
pub use inventory::{describe_resources, RawCacheCluster, RawDbInstance, RawSnapshot};
pub use utilization::{provisioned_storage_now, UtilizationSampler};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::catalog::ProductFamily;
use crate::error::FinopsResult;
use crate::models::Service;

pub use async_trait::async_trait;

/// Aggregation applied to each metric bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statistic {
    Maximum,
    Average,
}

impl Statistic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Statistic::Maximum => "Maximum",
            Statistic::Average => "Average",
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One metric-statistics request against a single resource
#[derive(Debug, Clone)]
pub struct MetricQuery {
    pub service: Service,
    pub resource_id: String,
    pub metric_name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub period_secs: u32,
    pub statistic: Statistic,
    pub unit: String,
}

/// A single aggregated bucket of a metric series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Datapoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Price-list request for one product family
#[derive(Debug, Clone)]
pub struct PriceListQuery {
    pub service: Service,
    pub family: ProductFamily,
    pub location: String,
    /// Only applied to database services
    pub database_engine: Option<String>,
}

/// Lists live resources in one account
#[async_trait]
pub trait InventorySource: Send + Sync {
    async fn db_instances(&self) -> Result<Vec<RawDbInstance>>;

    async fn cache_clusters(&self) -> Result<Vec<RawCacheCluster>>;

    /// Allocated storage of the newest backup snapshot, `None` when there is none
    async fn latest_snapshot_gb(&self, service: Service, resource_id: &str) -> Result<Option<f64>>;
}

/// Fetches metric statistics
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn datapoints(&self, query: &MetricQuery) -> Result<Vec<Datapoint>>;
}

/// Fetches raw price-list documents, one JSON string per product
#[async_trait]
pub trait PriceListSource: Send + Sync {
    async fn price_list(&self, query: &PriceListQuery) -> Result<Vec<String>>;
}

/// Clients scoped to one account
#[derive(Clone)]
pub struct AccountClients {
    pub account: String,
    pub inventory: Arc<dyn InventorySource>,
    pub metrics: Arc<dyn MetricsSource>,
}

/// Obtains delegated credentials for member accounts
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn assume(&self, account: &str, role: &str) -> FinopsResult<AccountClients>;
}
