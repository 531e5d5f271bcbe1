//! Rightsizing recommendations
//!
//! A candidate is any instance offer of the same topology that costs no more
//! per hour than the current one and still covers the observed peak demand.
//! Every candidate is priced for a full month under each commitment term its
//! catalog entry carries.

mod report;

pub use report::{format_recommendation, Recommendation};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::catalog::{
    CapacityComparable, ContractLength, OfferMap, PurchaseOption, ReservedRate, ReservedTerms,
    ASSUMED_PEAK_CPU_PERCENT,
};
use crate::models::{Topology, UtilizationProfile};

/// Capacity a candidate must offer to absorb the observed peak
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapacityRequirement {
    pub memory_gb: f64,
    pub cpu_score: f64,
    pub network_mbps: f64,
    /// Nonzero requirements exclude candidates without a published IOPS ceiling
    pub iops: Option<f64>,
}

impl CapacityRequirement {
    /// Derive the requirement from a utilization profile and the offer it was measured on
    ///
    /// CPU demand is the current offer's cpu score scaled by the observed peak
    /// relative to the assumed-peak headroom. The memory requirement is the
    /// peak of the freeable-memory series.
    pub fn from_profile(
        profile: &UtilizationProfile,
        current: &dyn CapacityComparable,
        required_iops: Option<f64>,
    ) -> Self {
        Self {
            memory_gb: profile.memory_free_gb_max,
            cpu_score: current.capacity().cpu_score * profile.cpu_percent_max
                / ASSUMED_PEAK_CPU_PERCENT,
            network_mbps: profile.network_mbps_max,
            iops: required_iops,
        }
    }

    /// Whether a candidate's capacity covers this requirement
    pub fn is_met_by(&self, candidate: &dyn CapacityComparable) -> bool {
        let capacity = candidate.capacity();

        let iops_ok = match self.iops {
            Some(required) if required > 0.0 => {
                capacity.iops.map(|iops| iops >= required).unwrap_or(false)
            }
            _ => true,
        };

        capacity.memory_gb >= self.memory_gb
            && capacity.cpu_score >= self.cpu_score
            && capacity.network_mbps >= self.network_mbps
            && iops_ok
    }
}

/// One rightsizing search
pub struct CandidateQuery<'a> {
    pub utilization: UtilizationProfile,
    /// Offer the resource is running on today
    pub current: &'a dyn CapacityComparable,
    pub topology: Topology,
    /// Highest on-demand hourly rate a candidate may have
    pub cost_ceiling: f64,
    pub required_iops: Option<f64>,
}

impl<'a> CandidateQuery<'a> {
    /// Query bounded by the current offer's own hourly rate and topology
    pub fn for_current(
        current: &'a dyn CapacityComparable,
        utilization: UtilizationProfile,
        required_iops: Option<f64>,
    ) -> Self {
        Self {
            utilization,
            current,
            topology: current.topology().clone(),
            cost_ceiling: current.on_demand_hourly(),
            required_iops,
        }
    }

    pub fn requirement(&self) -> CapacityRequirement {
        CapacityRequirement::from_profile(&self.utilization, self.current, self.required_iops)
    }

    pub fn admits(&self, requirement: &CapacityRequirement, candidate: &dyn CapacityComparable) -> bool {
        candidate.topology() == &self.topology
            && candidate.on_demand_hourly() <= self.cost_ceiling
            && requirement.is_met_by(candidate)
    }
}

/// 1yr and 3yr monthly figures of one purchase option
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TermPair {
    pub one_year: Option<f64>,
    pub three_year: Option<f64>,
}

/// Reserved monthly costs, in whichever shape the offer's catalog entry uses
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ReservedMonthlyCosts {
    /// Legacy cache-node reservations
    HeavyUtilization(TermPair),
    Standard {
        /// 1yr no-upfront
        no_upfront: Option<f64>,
        partial_upfront: TermPair,
        all_upfront: TermPair,
    },
}

/// Full-month cost of a candidate under every term it is offered on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthlyCostByTerm {
    pub on_demand: f64,
    pub reserved: Option<ReservedMonthlyCosts>,
}

/// Monthly cost of a reserved cell: recurring charge plus the upfront fee
/// spread over the contract
pub fn amortized_monthly(rate: &ReservedRate, length: ContractLength, hours_in_month: f64) -> f64 {
    rate.price_per_unit * hours_in_month + rate.upfront_fee / f64::from(length.months())
}

fn term_pair(terms: &ReservedTerms, option: PurchaseOption, hours_in_month: f64) -> TermPair {
    let cell = |length: ContractLength| {
        terms
            .get(&option)
            .and_then(|lengths| lengths.get(&length))
            .map(|rate| amortized_monthly(rate, length, hours_in_month))
    };

    TermPair {
        one_year: cell(ContractLength::OneYear),
        three_year: cell(ContractLength::ThreeYears),
    }
}

impl MonthlyCostByTerm {
    pub fn for_offer(offer: &dyn CapacityComparable, hours_in_month: f64) -> Self {
        let costs = offer.cost_terms();
        let on_demand = costs.on_demand.price_per_unit * hours_in_month;

        let reserved = costs
            .reserved
            .as_ref()
            .filter(|terms| !terms.is_empty())
            .map(|terms| {
                if terms.contains_key(&PurchaseOption::HeavyUtilization) {
                    ReservedMonthlyCosts::HeavyUtilization(term_pair(
                        terms,
                        PurchaseOption::HeavyUtilization,
                        hours_in_month,
                    ))
                } else {
                    ReservedMonthlyCosts::Standard {
                        no_upfront: term_pair(terms, PurchaseOption::NoUpfront, hours_in_month)
                            .one_year,
                        partial_upfront: term_pair(
                            terms,
                            PurchaseOption::PartialUpfront,
                            hours_in_month,
                        ),
                        all_upfront: term_pair(terms, PurchaseOption::AllUpfront, hours_in_month),
                    }
                }
            });

        Self { on_demand, reserved }
    }

    /// Lowest monthly figure across all terms
    pub fn cheapest(&self) -> f64 {
        let mut figures = vec![self.on_demand];
        match self.reserved {
            Some(ReservedMonthlyCosts::HeavyUtilization(pair)) => {
                figures.extend(pair.one_year);
                figures.extend(pair.three_year);
            }
            Some(ReservedMonthlyCosts::Standard {
                no_upfront,
                partial_upfront,
                all_upfront,
            }) => {
                figures.extend(no_upfront);
                for pair in [partial_upfront, all_upfront] {
                    figures.extend(pair.one_year);
                    figures.extend(pair.three_year);
                }
            }
            None => {}
        }
        figures.into_iter().fold(f64::INFINITY, f64::min)
    }
}

/// Candidates from an instance family that satisfy the query, keyed by capacity class
///
/// When several offers share a capacity class the one with the lowest key
/// wins, as in [`Catalog::instance_offer`](crate::catalog::Catalog::instance_offer).
pub fn find_candidates(
    query: &CandidateQuery<'_>,
    family: &OfferMap,
    hours_in_month: f64,
) -> BTreeMap<String, MonthlyCostByTerm> {
    let requirement = query.requirement();
    let mut candidates = BTreeMap::new();

    for candidate in family
        .values()
        .filter_map(|offer| offer.as_capacity())
        .filter(|candidate| query.admits(&requirement, *candidate))
    {
        candidates
            .entry(candidate.capacity_class().to_string())
            .or_insert_with(|| MonthlyCostByTerm::for_offer(candidate, hours_in_month));
    }

    candidates
}
