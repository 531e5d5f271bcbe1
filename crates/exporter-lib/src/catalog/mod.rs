//! Price catalog built from the provider's price-list records
//!
//! Raw records are normalized per product family into typed [`Offer`]s. A
//! catalog is built once per service at startup and rebuilt monthly; readers
//! share an immutable snapshot through [`CatalogHandle`].

mod handle;
mod offer;
mod raw;
mod terms;
mod text;

#[cfg(test)]
pub(crate) mod testing;

pub use handle::{CatalogHandle, PriceCatalogs};
pub use offer::{
    parse_offer, CacheInstanceOffer, CapacityComparable, DatabaseInstanceOffer, FlatRateOffer,
    InstanceCapacity, IopsOffer, Offer, ServerlessOffer, SnapshotOffer, StorageOffer,
    ThroughputOffer, ASSUMED_PEAK_CPU_PERCENT,
};
pub use raw::{RawPriceDimension, RawPriceRecord, RawProduct, RawTerm, RawTerms};
pub use terms::{ContractLength, CostTerms, OnDemandRate, PurchaseOption, ReservedRate, ReservedTerms};
pub use text::{parse_memory_gb, parse_network_mbps};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

use crate::error::FinopsError;
use crate::models::{Service, Topology};

/// Product family of the provider's price list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProductFamily {
    DatabaseInstance,
    DatabaseStorage,
    ProvisionedIops,
    ProvisionedThroughput,
    StorageSnapshot,
    CpuCredits,
    PerformanceInsights,
    RdsProxy,
    SystemOperation,
    CacheInstance,
    ElastiCacheServerless,
    GlobalDatastore,
}

impl ProductFamily {
    /// Families priced for each service
    pub fn for_service(service: Service) -> &'static [ProductFamily] {
        match service {
            Service::Rds => &[
                ProductFamily::DatabaseInstance,
                ProductFamily::DatabaseStorage,
                ProductFamily::RdsProxy,
                ProductFamily::CpuCredits,
                ProductFamily::ProvisionedIops,
                ProductFamily::SystemOperation,
                ProductFamily::PerformanceInsights,
                ProductFamily::ProvisionedThroughput,
                ProductFamily::StorageSnapshot,
            ],
            Service::ElastiCache => &[
                ProductFamily::CacheInstance,
                ProductFamily::ElastiCacheServerless,
                ProductFamily::GlobalDatastore,
                ProductFamily::StorageSnapshot,
            ],
        }
    }

    /// Family holding the service's sizeable instances
    pub fn instances_of(service: Service) -> ProductFamily {
        match service {
            Service::Rds => ProductFamily::DatabaseInstance,
            Service::ElastiCache => ProductFamily::CacheInstance,
        }
    }

    /// Family name exactly as the price-list API spells it
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductFamily::DatabaseInstance => "Database Instance",
            ProductFamily::DatabaseStorage => "Database Storage",
            ProductFamily::ProvisionedIops => "Provisioned IOPS",
            ProductFamily::ProvisionedThroughput => "Provisioned Throughput",
            ProductFamily::StorageSnapshot => "Storage Snapshot",
            ProductFamily::CpuCredits => "CPU Credits",
            ProductFamily::PerformanceInsights => "Performance Insights",
            ProductFamily::RdsProxy => "RDSProxy",
            ProductFamily::SystemOperation => "System Operation",
            ProductFamily::CacheInstance => "Cache Instance",
            ProductFamily::ElastiCacheServerless => "ElastiCache Serverless",
            ProductFamily::GlobalDatastore => "Amazon ElastiCache Global Datastore",
        }
    }
}

impl fmt::Display for ProductFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Offers of one family, keyed by the family's offer key
pub type OfferMap = BTreeMap<String, Offer>;

/// All offers of one service, grouped by product family
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    families: BTreeMap<ProductFamily, OfferMap>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an offer; an existing offer with the same key is replaced
    pub fn insert(&mut self, family: ProductFamily, key: String, offer: Offer) -> Option<Offer> {
        self.families.entry(family).or_default().insert(key, offer)
    }

    pub fn family(&self, family: ProductFamily) -> Option<&OfferMap> {
        self.families.get(&family)
    }

    pub fn offer(&self, family: ProductFamily, key: &str) -> Option<&Offer> {
        self.families.get(&family)?.get(key)
    }

    /// Offers of one family, empty when the family was never loaded
    pub fn offers(&self, family: ProductFamily) -> impl Iterator<Item = (&String, &Offer)> {
        self.families.get(&family).into_iter().flat_map(|offers| offers.iter())
    }

    pub fn family_len(&self, family: ProductFamily) -> usize {
        self.families.get(&family).map(BTreeMap::len).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.families.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Instance offer for a capacity class in a topology
    ///
    /// Matches the structured class and topology fields exactly. When several
    /// offers match, the one with the lowest key wins.
    pub fn instance_offer(
        &self,
        service: Service,
        capacity_class: &str,
        topology: &Topology,
    ) -> Option<&dyn CapacityComparable> {
        self.offers(ProductFamily::instances_of(service))
            .filter_map(|(_, offer)| offer.as_capacity())
            .find(|offer| offer.capacity_class() == capacity_class && offer.topology() == topology)
    }
}

/// Outcome of building a catalog: the offers kept and the records rejected
#[derive(Debug, Default)]
pub struct CatalogBuild {
    pub catalog: Catalog,
    pub rejected: Vec<FinopsError>,
}

/// Normalize raw price-list documents into a catalog
///
/// Each document is parsed on its own; a malformed one is logged, recorded in
/// [`CatalogBuild::rejected`] and skipped. Families the service does not
/// price are ignored.
pub fn build_catalog(
    service: Service,
    raw_offers_by_family: &BTreeMap<ProductFamily, Vec<String>>,
) -> CatalogBuild {
    let mut build = CatalogBuild::default();

    for family in ProductFamily::for_service(service) {
        let Some(documents) = raw_offers_by_family.get(family) else {
            warn!(service = %service, family = %family, "No price-list records for product family");
            continue;
        };

        for document in documents {
            let parsed = RawPriceRecord::from_json(family.as_str(), document)
                .and_then(|record| parse_offer(*family, &record));

            match parsed {
                Ok((key, offer)) => {
                    build.catalog.insert(*family, key, offer);
                }
                Err(e) => {
                    warn!(
                        service = %service,
                        family = %family,
                        error = %e,
                        "Rejected malformed price-list record"
                    );
                    build.rejected.push(e);
                }
            }
        }
    }

    info!(
        service = %service,
        offers = build.catalog.len(),
        rejected = build.rejected.len(),
        "Price catalog built"
    );

    build
}
