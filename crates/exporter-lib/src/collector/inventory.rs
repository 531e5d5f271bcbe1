//! Live inventory records and their normalized descriptors

use anyhow::{Context, Result};
use serde::Deserialize;

use super::InventorySource;
use crate::models::{CommitmentTerm, ResourceDescriptor, Service, StorageType, Topology};

/// Database instance as returned by the inventory API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawDbInstance {
    #[serde(rename = "DBInstanceIdentifier")]
    pub db_instance_identifier: String,
    #[serde(rename = "DBInstanceClass")]
    pub db_instance_class: String,
    #[serde(default)]
    pub allocated_storage: f64,
    #[serde(rename = "MultiAZ", default)]
    pub multi_az: bool,
    #[serde(default)]
    pub storage_type: Option<String>,
    #[serde(default)]
    pub storage_throughput: Option<f64>,
    #[serde(default)]
    pub iops: Option<f64>,
    #[serde(default)]
    pub backup_retention_period: u32,
    #[serde(default)]
    pub network_type: Option<String>,
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub engine_version: Option<String>,
}

impl From<RawDbInstance> for ResourceDescriptor {
    fn from(raw: RawDbInstance) -> Self {
        Self {
            id: raw.db_instance_identifier,
            service: Service::Rds,
            capacity_class: raw.db_instance_class,
            topology: Topology::from_multi_az(raw.multi_az),
            storage_gb: raw.allocated_storage,
            storage_type: raw.storage_type.as_deref().map(StorageType::parse),
            iops: raw.iops.unwrap_or(0.0),
            throughput_mbps: raw.storage_throughput.unwrap_or(0.0),
            backup_retention_days: raw.backup_retention_period,
            term: CommitmentTerm::OnDemand,
            engine: raw.engine,
            engine_version: raw.engine_version,
            network_type: raw.network_type,
        }
    }
}

/// Cache cluster as returned by the inventory API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawCacheCluster {
    pub cache_cluster_id: String,
    pub cache_node_type: String,
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub engine_version: Option<String>,
    #[serde(default)]
    pub network_type: Option<String>,
    #[serde(default)]
    pub preferred_outpost_arn: Option<String>,
    #[serde(default)]
    pub snapshot_retention_limit: u32,
}

impl From<RawCacheCluster> for ResourceDescriptor {
    fn from(raw: RawCacheCluster) -> Self {
        let topology = if raw.preferred_outpost_arn.is_some() {
            Topology::Outpost
        } else {
            Topology::SingleAz
        };

        Self {
            id: raw.cache_cluster_id,
            service: Service::ElastiCache,
            capacity_class: raw.cache_node_type,
            topology,
            storage_gb: 0.0,
            storage_type: None,
            iops: 0.0,
            throughput_mbps: 0.0,
            backup_retention_days: raw.snapshot_retention_limit,
            term: CommitmentTerm::OnDemand,
            engine: raw.engine,
            engine_version: raw.engine_version,
            network_type: raw.network_type,
        }
    }
}

/// Backup snapshot entry; only its size is priced
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawSnapshot {
    #[serde(default)]
    pub allocated_storage: Option<f64>,
}

/// Size of the newest snapshot in a listing ordered oldest first
pub fn latest_snapshot_gb(snapshots: &[RawSnapshot]) -> Option<f64> {
    snapshots.last().and_then(|snapshot| snapshot.allocated_storage)
}

#[derive(Debug, Deserialize)]
pub(crate) struct DescribeDbInstances {
    #[serde(rename = "DBInstances", default)]
    pub db_instances: Vec<RawDbInstance>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DescribeCacheClusters {
    #[serde(rename = "CacheClusters", default)]
    pub cache_clusters: Vec<RawCacheCluster>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DescribeSnapshots {
    #[serde(rename = "DBSnapshots", alias = "Snapshots", default)]
    pub snapshots: Vec<RawSnapshot>,
}

/// List one service's resources in an account as descriptors
pub async fn describe_resources(
    inventory: &dyn InventorySource,
    service: Service,
) -> Result<Vec<ResourceDescriptor>> {
    let resources = match service {
        Service::Rds => inventory
            .db_instances()
            .await
            .context("Failed to list database instances")?
            .into_iter()
            .map(ResourceDescriptor::from)
            .collect(),
        Service::ElastiCache => inventory
            .cache_clusters()
            .await
            .context("Failed to list cache clusters")?
            .into_iter()
            .map(ResourceDescriptor::from)
            .collect(),
    };

    Ok(resources)
}
