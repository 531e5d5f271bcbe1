//! Core data models for the cost exporter

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::catalog::{ContractLength, PurchaseOption};

/// Managed cloud service a resource or catalog belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Rds,
    ElastiCache,
}

impl Service {
    pub const ALL: [Service; 2] = [Service::Rds, Service::ElastiCache];

    /// Service code understood by the price-list API
    pub fn service_code(&self) -> &'static str {
        match self {
            Service::Rds => "AmazonRDS",
            Service::ElastiCache => "AmazonElastiCache",
        }
    }

    /// Short label used on published metrics and log lines
    pub fn label(&self) -> &'static str {
        match self {
            Service::Rds => "rds",
            Service::ElastiCache => "ec",
        }
    }

    /// Monitoring namespace holding this service's metrics
    pub fn metric_namespace(&self) -> &'static str {
        match self {
            Service::Rds => "AWS/RDS",
            Service::ElastiCache => "AWS/ElastiCache",
        }
    }

    /// Dimension name identifying a single resource in the namespace
    pub fn metric_dimension(&self) -> &'static str {
        match self {
            Service::Rds => "DBInstanceIdentifier",
            Service::ElastiCache => "CacheClusterId",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Deployment redundancy mode of a resource or an offer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topology {
    SingleAz,
    MultiAz,
    /// On-premises extension (outpost) deployment
    Outpost,
    /// Any other deployment option the catalog lists, kept verbatim
    Other(String),
}

impl Topology {
    pub fn from_deployment_option(option: &str) -> Self {
        match option.trim() {
            "Single-AZ" => Topology::SingleAz,
            "Multi-AZ" => Topology::MultiAz,
            other => Topology::Other(other.to_string()),
        }
    }

    pub fn from_multi_az(multi_az: bool) -> Self {
        if multi_az {
            Topology::MultiAz
        } else {
            Topology::SingleAz
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Topology::SingleAz => "Single-AZ",
            Topology::MultiAz => "Multi-AZ",
            Topology::Outpost => "Outpost",
            Topology::Other(option) => option,
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Storage volume type of a database instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageType {
    Gp2,
    Gp3,
    Io1,
    Io2,
    /// Previous-generation magnetic storage
    Standard,
    Other(String),
}

impl StorageType {
    /// Parse the storage type reported by the inventory API (`gp2`, `io1`, ...)
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "gp2" => StorageType::Gp2,
            "gp3" => StorageType::Gp3,
            "io1" => StorageType::Io1,
            "io2" => StorageType::Io2,
            "standard" => StorageType::Standard,
            other => StorageType::Other(other.to_string()),
        }
    }

    /// Map the catalog's `volumeType` attribute onto a storage type
    pub fn from_volume_type(volume_type: &str) -> Self {
        match volume_type.trim() {
            "General Purpose" => StorageType::Gp2,
            "General Purpose-GP3" => StorageType::Gp3,
            "Provisioned IOPS" => StorageType::Io1,
            "Provisioned IOPS-IO2" => StorageType::Io2,
            "Magnetic" => StorageType::Standard,
            other => StorageType::Other(other.to_string()),
        }
    }
}

/// Commitment under which a running resource is billed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitmentTerm {
    OnDemand,
    Reserved {
        option: PurchaseOption,
        length: ContractLength,
    },
}

/// Normalized view of a live database instance or cache cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub id: String,
    pub service: Service,
    /// Instance class or cache node type, e.g. `db.t3.micro`
    pub capacity_class: String,
    pub topology: Topology,
    /// Allocated storage in GB
    pub storage_gb: f64,
    pub storage_type: Option<StorageType>,
    /// Provisioned IOPS (zero when not provisioned)
    pub iops: f64,
    /// Provisioned storage throughput in MB/s
    pub throughput_mbps: f64,
    pub backup_retention_days: u32,
    pub term: CommitmentTerm,
    pub engine: Option<String>,
    pub engine_version: Option<String>,
    pub network_type: Option<String>,
}

/// Worst-case utilization observed over the sampling window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UtilizationProfile {
    pub cpu_percent_max: f64,
    pub memory_free_gb_max: f64,
    pub network_mbps_max: f64,
    pub iops_max: f64,
    pub throughput_mbps_max: f64,
}

/// Current-period and full-month cost of a single resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostProjection {
    pub current_period_cost: f64,
    pub full_month_cost: f64,
}

impl CostProjection {
    pub fn rounded(&self) -> Self {
        Self {
            current_period_cost: round2(self.current_period_cost),
            full_month_cost: round2(self.full_month_cost),
        }
    }
}

/// Per-account, per-service cost figures ready to publish
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountCostReport {
    pub account: String,
    pub service: Service,
    /// Rounded projection per resource id
    pub resources: BTreeMap<String, CostProjection>,
    pub total_current: f64,
    pub total_month: f64,
}

impl AccountCostReport {
    /// Round each resource for display and sum totals from the unrounded figures
    pub fn from_projections(
        account: impl Into<String>,
        service: Service,
        projections: impl IntoIterator<Item = (String, CostProjection)>,
    ) -> Self {
        let mut resources = BTreeMap::new();
        let mut total_current = 0.0;
        let mut total_month = 0.0;

        for (id, projection) in projections {
            total_current += projection.current_period_cost;
            total_month += projection.full_month_cost;
            resources.insert(id, projection.rounded());
        }

        Self {
            account: account.into(),
            service,
            resources,
            total_current: round2(total_current),
            total_month: round2(total_month),
        }
    }
}

/// Round a monetary figure to cents
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
