//! Rate lookups against a service catalog
//!
//! Every lookup matches on the structured fields parsed into the offer, never
//! on substrings of the usage-type key.

use tracing::warn;

use crate::catalog::{Catalog, Offer, ProductFamily};
use crate::models::{CommitmentTerm, Service, StorageType, Topology};

/// Storage media of the snapshot SKU, normalized for comparison
const SNAPSHOT_MEDIA: &str = "amazons3";

/// Hourly compute rate of a capacity class
///
/// Reserved commitments resolve to zero: running reservations are not priced
/// yet, so a reserved resource only carries its storage-related charges.
pub fn instance_hourly_rate(
    catalog: &Catalog,
    service: Service,
    capacity_class: &str,
    topology: &Topology,
    term: &CommitmentTerm,
) -> f64 {
    if let CommitmentTerm::Reserved { option, length } = term {
        warn!(
            capacity_class = %capacity_class,
            purchase_option = %option,
            contract_length = %length,
            "Reserved commitment is not priced, using zero compute rate"
        );
        return 0.0;
    }

    match catalog.instance_offer(service, capacity_class, topology) {
        Some(offer) => offer.on_demand_hourly(),
        None => {
            warn!(
                service = %service,
                capacity_class = %capacity_class,
                topology = %topology,
                "No catalog offer for capacity class, using zero compute rate"
            );
            0.0
        }
    }
}

/// Per GB-month storage rate for a volume type in a topology
pub fn storage_rate(catalog: &Catalog, storage_type: &StorageType, topology: &Topology) -> Option<f64> {
    catalog
        .offers(ProductFamily::DatabaseStorage)
        .find_map(|(_, offer)| match offer {
            Offer::DatabaseStorage(storage)
                if &storage.storage_type == storage_type && &storage.topology == topology =>
            {
                Some(storage.rate.price_per_unit)
            }
            _ => None,
        })
}

/// Per IOPS-month rate for provisioned IOPS on a volume type
///
/// gp3 volumes have their own SKU; io2 falls back to the io1 SKU when the
/// catalog has no io2 entry; everything else is billed at the io1 rate.
pub fn iops_rate(catalog: &Catalog, storage_type: &StorageType, topology: &Topology) -> Option<f64> {
    let lookup = |wanted: &StorageType| {
        catalog
            .offers(ProductFamily::ProvisionedIops)
            .find_map(|(_, offer)| match offer {
                Offer::ProvisionedIops(iops)
                    if &iops.storage_type == wanted && &iops.topology == topology =>
                {
                    Some(iops.rate.price_per_unit)
                }
                _ => None,
            })
    };

    match storage_type {
        StorageType::Gp3 => lookup(&StorageType::Gp3),
        StorageType::Io2 => lookup(&StorageType::Io2).or_else(|| lookup(&StorageType::Io1)),
        _ => lookup(&StorageType::Io1),
    }
}

/// Per MB/s-month rate for provisioned storage throughput
pub fn throughput_rate(catalog: &Catalog, topology: &Topology) -> Option<f64> {
    catalog
        .offers(ProductFamily::ProvisionedThroughput)
        .find_map(|(_, offer)| match offer {
            Offer::ProvisionedThroughput(throughput) if &throughput.topology == topology => {
                Some(throughput.rate.price_per_unit)
            }
            _ => None,
        })
}

/// Per GB-month rate for backup snapshot storage
pub fn snapshot_rate(catalog: &Catalog) -> Option<f64> {
    catalog
        .offers(ProductFamily::StorageSnapshot)
        .find_map(|(_, offer)| match offer {
            Offer::StorageSnapshot(snapshot)
                if normalize_media(&snapshot.storage_media) == SNAPSHOT_MEDIA =>
            {
                Some(snapshot.rate.price_per_unit)
            }
            _ => None,
        })
}

// The two services spell the media "AmazonS3" and "Amazon S3"
fn normalize_media(media: &str) -> String {
    media
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase()
}
