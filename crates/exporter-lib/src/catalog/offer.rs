//! Typed offers, one variant per product family
//!
//! Instance offers from both services share the [`CapacityComparable`]
//! surface the recommendation engine filters on. The remaining families are
//! add-on rates looked up by structured fields.

use serde::{Deserialize, Serialize};

use super::raw::RawPriceRecord;
use super::terms::{CostTerms, OnDemandRate, ReservedTerms};
use super::text::{parse_memory_gb, parse_network_mbps};
use super::ProductFamily;
use crate::error::{FinopsError, FinopsResult};
use crate::models::{StorageType, Topology};

/// CPU utilization percent an instance is assumed to sustain at peak,
/// leaving headroom for bursts
pub const ASSUMED_PEAK_CPU_PERCENT: f64 = 70.0;

/// Usage-type marker the catalog puts on outpost SKUs
const OUTPOST_MARKER: &str = "Outpost";

/// Usage-type marker on multi-zone storage SKUs
const MULTI_AZ_MARKER: &str = "Multi-AZ";

/// Capacity shared by database instance classes and cache node types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceCapacity {
    /// Capacity class, e.g. `db.m5.large` or `cache.r6g.xlarge`
    pub instance_type: String,
    pub instance_family: Option<String>,
    pub memory_gb: f64,
    pub vcpu: u32,
    /// vCPU count scaled by the assumed peak utilization
    pub cpu_score: f64,
    pub network_mbps: f64,
    /// Provisioned IOPS ceiling when the catalog publishes one
    pub iops: Option<f64>,
}

impl InstanceCapacity {
    fn from_record(family: &str, record: &RawPriceRecord) -> FinopsResult<Self> {
        let key = record.label();

        let memory_text = record.require(family, "memory")?;
        let memory_gb = parse_memory_gb(memory_text).ok_or_else(|| {
            FinopsError::malformed(family, &key, format!("unreadable memory '{}'", memory_text))
        })?;

        let vcpu_text = record.require(family, "vcpu")?;
        let vcpu = vcpu_text.trim().parse::<u32>().map_err(|_| {
            FinopsError::malformed(family, &key, format!("unreadable vcpu '{}'", vcpu_text))
        })?;

        let network_text = record.require(family, "networkPerformance")?;
        let network_mbps = parse_network_mbps(network_text).ok_or_else(|| {
            FinopsError::malformed(
                family,
                &key,
                format!("unreadable network performance '{}'", network_text),
            )
        })?;

        let iops = record
            .attribute("iops")
            .and_then(|value| value.trim().parse::<f64>().ok());

        Ok(Self {
            instance_type: record.require(family, "instanceType")?.to_string(),
            instance_family: record.attribute("instanceFamily").map(str::to_string),
            memory_gb,
            vcpu,
            cpu_score: vcpu as f64 * ASSUMED_PEAK_CPU_PERCENT,
            network_mbps,
            iops,
        })
    }
}

/// Capability surface the recommendation engine compares candidates on
pub trait CapacityComparable: Send + Sync {
    fn capacity(&self) -> &InstanceCapacity;

    fn topology(&self) -> &Topology;

    fn cost_terms(&self) -> &CostTerms;

    fn capacity_class(&self) -> &str {
        &self.capacity().instance_type
    }

    fn on_demand_hourly(&self) -> f64 {
        self.cost_terms().on_demand.price_per_unit
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseInstanceOffer {
    pub usage_type: String,
    pub capacity: InstanceCapacity,
    pub topology: Topology,
    pub database_engine: Option<String>,
    /// Instance storage description, e.g. `EBS Only`
    pub storage: Option<String>,
    pub costs: CostTerms,
}

impl CapacityComparable for DatabaseInstanceOffer {
    fn capacity(&self) -> &InstanceCapacity {
        &self.capacity
    }

    fn topology(&self) -> &Topology {
        &self.topology
    }

    fn cost_terms(&self) -> &CostTerms {
        &self.costs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheInstanceOffer {
    pub usage_type: String,
    pub capacity: InstanceCapacity,
    /// `Outpost` for on-premises extension SKUs, `SingleAz` otherwise
    pub topology: Topology,
    pub cache_engine: Option<String>,
    pub costs: CostTerms,
}

impl CacheInstanceOffer {
    pub fn is_outpost(&self) -> bool {
        self.topology == Topology::Outpost
    }
}

impl CapacityComparable for CacheInstanceOffer {
    fn capacity(&self) -> &InstanceCapacity {
        &self.capacity
    }

    fn topology(&self) -> &Topology {
        &self.topology
    }

    fn cost_terms(&self) -> &CostTerms {
        &self.costs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageOffer {
    pub usage_type: String,
    pub volume_type: String,
    pub storage_type: StorageType,
    pub storage_media: Option<String>,
    pub min_volume: Option<String>,
    pub max_volume: Option<String>,
    pub topology: Topology,
    pub rate: OnDemandRate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IopsOffer {
    pub usage_type: String,
    pub group_description: Option<String>,
    pub storage_type: StorageType,
    pub topology: Topology,
    pub rate: OnDemandRate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputOffer {
    pub topology: Topology,
    pub rate: OnDemandRate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotOffer {
    pub storage_media: String,
    pub topology: Option<Topology>,
    pub rate: OnDemandRate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerlessOffer {
    pub usage_type: String,
    pub cache_engine: Option<String>,
    pub rate: OnDemandRate,
}

/// Family whose only priced attribute is a single on-demand rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatRateOffer {
    pub key: String,
    pub rate: OnDemandRate,
}

/// A priced SKU from one product family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Offer {
    DatabaseInstance(DatabaseInstanceOffer),
    CacheInstance(CacheInstanceOffer),
    DatabaseStorage(StorageOffer),
    ProvisionedIops(IopsOffer),
    ProvisionedThroughput(ThroughputOffer),
    StorageSnapshot(SnapshotOffer),
    Serverless(ServerlessOffer),
    GlobalDatastore(FlatRateOffer),
    CpuCredits(FlatRateOffer),
    PerformanceInsights(FlatRateOffer),
    RdsProxy(FlatRateOffer),
    SystemOperation(FlatRateOffer),
}

impl Offer {
    /// Capacity view for instance offers, `None` for add-on families
    pub fn as_capacity(&self) -> Option<&dyn CapacityComparable> {
        match self {
            Offer::DatabaseInstance(offer) => Some(offer as &dyn CapacityComparable),
            Offer::CacheInstance(offer) => Some(offer as &dyn CapacityComparable),
            _ => None,
        }
    }

    pub fn on_demand(&self) -> &OnDemandRate {
        match self {
            Offer::DatabaseInstance(offer) => &offer.costs.on_demand,
            Offer::CacheInstance(offer) => &offer.costs.on_demand,
            Offer::DatabaseStorage(offer) => &offer.rate,
            Offer::ProvisionedIops(offer) => &offer.rate,
            Offer::ProvisionedThroughput(offer) => &offer.rate,
            Offer::StorageSnapshot(offer) => &offer.rate,
            Offer::Serverless(offer) => &offer.rate,
            Offer::GlobalDatastore(offer)
            | Offer::CpuCredits(offer)
            | Offer::PerformanceInsights(offer)
            | Offer::RdsProxy(offer)
            | Offer::SystemOperation(offer) => &offer.rate,
        }
    }

    pub fn reserved(&self) -> Option<&ReservedTerms> {
        self.as_capacity()
            .and_then(|offer| offer.cost_terms().reserved.as_ref())
    }
}

/// Topology of an add-on SKU: the `deploymentOption` attribute when present,
/// otherwise the multi-zone marker in the usage type
fn addon_topology(record: &RawPriceRecord, usage_type: &str) -> Topology {
    match record.attribute("deploymentOption") {
        Some(option) => Topology::from_deployment_option(option),
        None if usage_type.contains(MULTI_AZ_MARKER) => Topology::MultiAz,
        None => Topology::SingleAz,
    }
}

/// Parse one raw record into its family's offer and catalog key
pub fn parse_offer(family: ProductFamily, record: &RawPriceRecord) -> FinopsResult<(String, Offer)> {
    let name = family.as_str();
    let label = record.label();
    let on_demand = || super::terms::on_demand_rate(name, &label, &record.terms);

    match family {
        ProductFamily::DatabaseInstance => {
            let usage_type = record.require(name, "usagetype")?.to_string();
            let offer = DatabaseInstanceOffer {
                capacity: InstanceCapacity::from_record(name, record)?,
                topology: Topology::from_deployment_option(
                    record.require(name, "deploymentOption")?,
                ),
                database_engine: record.attribute("databaseEngine").map(str::to_string),
                storage: record.attribute("storage").map(str::to_string),
                costs: CostTerms::from_raw(name, &usage_type, &record.terms)?,
                usage_type: usage_type.clone(),
            };
            Ok((usage_type, Offer::DatabaseInstance(offer)))
        }
        ProductFamily::CacheInstance => {
            let usage_type = record.require(name, "usagetype")?.to_string();
            let topology = if usage_type.contains(OUTPOST_MARKER) {
                Topology::Outpost
            } else {
                Topology::SingleAz
            };
            let offer = CacheInstanceOffer {
                capacity: InstanceCapacity::from_record(name, record)?,
                topology,
                cache_engine: record.attribute("cacheEngine").map(str::to_string),
                costs: CostTerms::from_raw(name, &usage_type, &record.terms)?,
                usage_type: usage_type.clone(),
            };
            Ok((usage_type, Offer::CacheInstance(offer)))
        }
        ProductFamily::DatabaseStorage => {
            let usage_type = record.require(name, "usagetype")?.to_string();
            let volume_type = record.require(name, "volumeType")?.to_string();
            let offer = StorageOffer {
                storage_type: StorageType::from_volume_type(&volume_type),
                volume_type,
                storage_media: record.attribute("storageMedia").map(str::to_string),
                min_volume: record.attribute("minVolumeSize").map(str::to_string),
                max_volume: record.attribute("maxVolumeSize").map(str::to_string),
                topology: addon_topology(record, &usage_type),
                rate: on_demand()?,
                usage_type: usage_type.clone(),
            };
            Ok((usage_type, Offer::DatabaseStorage(offer)))
        }
        ProductFamily::ProvisionedIops => {
            let usage_type = record.require(name, "usagetype")?.to_string();
            let upper = usage_type.to_ascii_uppercase();
            let storage_type = if upper.contains("GP3") {
                StorageType::Gp3
            } else if upper.contains("IO2") {
                StorageType::Io2
            } else {
                StorageType::Io1
            };
            let offer = IopsOffer {
                group_description: record.attribute("groupDescription").map(str::to_string),
                storage_type,
                topology: Topology::from_deployment_option(
                    record.require(name, "deploymentOption")?,
                ),
                rate: on_demand()?,
                usage_type: usage_type.clone(),
            };
            Ok((usage_type, Offer::ProvisionedIops(offer)))
        }
        ProductFamily::ProvisionedThroughput => {
            let deployment = record.require(name, "deploymentOption")?.to_string();
            let offer = ThroughputOffer {
                topology: Topology::from_deployment_option(&deployment),
                rate: on_demand()?,
            };
            Ok((deployment, Offer::ProvisionedThroughput(offer)))
        }
        ProductFamily::StorageSnapshot => {
            let storage_media = record.require(name, "storageMedia")?.to_string();
            let offer = SnapshotOffer {
                topology: record
                    .attribute("deploymentOption")
                    .map(Topology::from_deployment_option),
                rate: on_demand()?,
                storage_media: storage_media.clone(),
            };
            Ok((storage_media, Offer::StorageSnapshot(offer)))
        }
        ProductFamily::ElastiCacheServerless => {
            let usage_type = record.require(name, "usagetype")?.to_string();
            let offer = ServerlessOffer {
                cache_engine: record.attribute("cacheEngine").map(str::to_string),
                rate: on_demand()?,
                usage_type: usage_type.clone(),
            };
            Ok((usage_type, Offer::Serverless(offer)))
        }
        ProductFamily::GlobalDatastore
        | ProductFamily::CpuCredits
        | ProductFamily::PerformanceInsights
        | ProductFamily::RdsProxy
        | ProductFamily::SystemOperation => {
            let key_attribute = match family {
                ProductFamily::CpuCredits => "instanceFamily",
                ProductFamily::PerformanceInsights => "instanceTypeFamily",
                ProductFamily::SystemOperation => "group",
                _ => "usagetype",
            };
            let key = record.require(name, key_attribute)?.to_string();
            let flat = FlatRateOffer {
                key: key.clone(),
                rate: on_demand()?,
            };
            let offer = match family {
                ProductFamily::GlobalDatastore => Offer::GlobalDatastore(flat),
                ProductFamily::CpuCredits => Offer::CpuCredits(flat),
                ProductFamily::PerformanceInsights => Offer::PerformanceInsights(flat),
                ProductFamily::RdsProxy => Offer::RdsProxy(flat),
                _ => Offer::SystemOperation(flat),
            };
            Ok((key, offer))
        }
    }
}
