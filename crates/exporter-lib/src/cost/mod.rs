//! Current-period and full-month cost projection
//!
//! A resource's month is priced from its compute rate, allocated storage,
//! latest snapshot, provisioned throughput and provisioned IOPS, then reduced
//! by the enterprise discount. The current-period figure bills compute for
//! the hours elapsed so far and storage at what is provisioned right now;
//! snapshot, throughput and IOPS charges are carried in full in both figures.

mod period;
mod rates;

pub use period::{days_in_month, BillingPeriod};
pub use rates::{instance_hourly_rate, iops_rate, snapshot_rate, storage_rate, throughput_rate};

use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::models::{CostProjection, ResourceDescriptor};

/// Rates resolved for one resource
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceRates {
    pub compute_hourly: f64,
    pub storage_gb_month: f64,
    pub snapshot_gb_month: f64,
    pub throughput_mbps_month: f64,
    pub iops_month: f64,
}

impl ResourceRates {
    /// Resolve every rate the resource is billed on; missing ones price at zero
    pub fn resolve(resource: &ResourceDescriptor, catalog: &Catalog) -> Self {
        let compute_hourly = instance_hourly_rate(
            catalog,
            resource.service,
            &resource.capacity_class,
            &resource.topology,
            &resource.term,
        );

        let storage_gb_month = match &resource.storage_type {
            Some(storage_type) if resource.storage_gb > 0.0 => {
                storage_rate(catalog, storage_type, &resource.topology)
                    .unwrap_or_else(|| missing_rate(resource, "storage"))
            }
            _ => 0.0,
        };

        let iops_month = match &resource.storage_type {
            Some(storage_type) if resource.iops > 0.0 => {
                iops_rate(catalog, storage_type, &resource.topology)
                    .unwrap_or_else(|| missing_rate(resource, "provisioned IOPS"))
            }
            _ => 0.0,
        };

        let throughput_mbps_month = if resource.throughput_mbps > 0.0 {
            throughput_rate(catalog, &resource.topology)
                .unwrap_or_else(|| missing_rate(resource, "provisioned throughput"))
        } else {
            0.0
        };

        let snapshot_gb_month = snapshot_rate(catalog).unwrap_or_else(|| {
            debug!(resource = %resource.id, "Catalog has no snapshot storage rate");
            0.0
        });

        Self {
            compute_hourly,
            storage_gb_month,
            snapshot_gb_month,
            throughput_mbps_month,
            iops_month,
        }
    }
}

fn missing_rate(resource: &ResourceDescriptor, what: &str) -> f64 {
    warn!(
        resource = %resource.id,
        service = %resource.service,
        topology = %resource.topology,
        charge = what,
        "No catalog rate for charge, pricing it at zero"
    );
    0.0
}

/// Price one resource for the running billing month
///
/// `provisioned_storage_now` is the storage currently in use (allocated minus
/// free); `None` prices the current storage term at zero. `snapshot_storage_gb`
/// is the size of the latest backup snapshot; `None` means no snapshot.
pub fn calculate_monthly_and_current(
    resource: &ResourceDescriptor,
    catalog: &Catalog,
    discount: f64,
    provisioned_storage_now: Option<f64>,
    snapshot_storage_gb: Option<f64>,
    period: &BillingPeriod,
) -> CostProjection {
    let rates = ResourceRates::resolve(resource, catalog);
    project(resource, &rates, discount, provisioned_storage_now, snapshot_storage_gb, period)
}

/// Apply resolved rates to a resource
pub fn project(
    resource: &ResourceDescriptor,
    rates: &ResourceRates,
    discount: f64,
    provisioned_storage_now: Option<f64>,
    snapshot_storage_gb: Option<f64>,
    period: &BillingPeriod,
) -> CostProjection {
    let retained = 1.0 - discount.clamp(0.0, 1.0);

    let snapshot = snapshot_storage_gb.unwrap_or(0.0).max(0.0) * rates.snapshot_gb_month;
    let throughput = resource.throughput_mbps * rates.throughput_mbps_month;
    let iops = resource.iops * rates.iops_month;
    let fixed = snapshot + throughput + iops;

    let full_month = rates.compute_hourly * period.hours_in_month
        + resource.storage_gb * rates.storage_gb_month
        + fixed;

    let current = rates.compute_hourly * period.hours_elapsed
        + provisioned_storage_now.unwrap_or(0.0).max(0.0) * rates.storage_gb_month
        + fixed;

    CostProjection {
        current_period_cost: current * retained,
        full_month_cost: full_month * retained,
    }
}
