//! Chat message rendering for rightsizing results

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;

use super::{MonthlyCostByTerm, ReservedMonthlyCosts};
use crate::models::{round2, Service, UtilizationProfile};

/// Rightsizing result for one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub account: String,
    pub service: Service,
    pub resource_id: String,
    pub current_class: String,
    pub utilization: UtilizationProfile,
    pub candidates: BTreeMap<String, MonthlyCostByTerm>,
}

impl Recommendation {
    /// Candidates ordered by on-demand monthly cost, then capacity class
    pub fn ranked(&self) -> Vec<(&String, &MonthlyCostByTerm)> {
        let mut ranked: Vec<_> = self.candidates.iter().collect();
        ranked.sort_by(|(a_class, a), (b_class, b)| {
            a.on_demand
                .total_cmp(&b.on_demand)
                .then_with(|| a_class.cmp(b_class))
        });
        ranked
    }
}

fn heading(service: Service) -> &'static str {
    match service {
        Service::Rds => "#### RDS Recommendations FinOps Tool",
        Service::ElastiCache => "#### EC Recommendations FinOps Tool",
    }
}

fn push_cell(msg: &mut String, label: &str, value: Option<f64>) {
    if let Some(value) = value {
        let _ = write!(msg, "\n {} monthly costs: {}", label, round2(value));
    }
}

/// Render a recommendation as a markdown chat message
pub fn format_recommendation(recommendation: &Recommendation) -> String {
    let mut msg = String::from(heading(recommendation.service));
    let peak = &recommendation.utilization;

    let _ = write!(msg, "\n Account: {}", recommendation.account);
    let _ = write!(
        msg,
        "\n Instance: {} ({})",
        recommendation.resource_id, recommendation.current_class
    );
    let _ = write!(
        msg,
        "\n Observed peak: CPU {}%, freeable memory {} GB, network {} Mbit/s",
        round2(peak.cpu_percent_max),
        round2(peak.memory_free_gb_max),
        round2(peak.network_mbps_max)
    );
    msg.push_str("\n Recommendations:");

    for (class, costs) in recommendation.ranked() {
        let _ = write!(msg, "\n ##### {}", class);
        push_cell(&mut msg, "OnDemand", Some(costs.on_demand));

        match costs.reserved {
            Some(ReservedMonthlyCosts::HeavyUtilization(pair)) => {
                push_cell(&mut msg, "Heavy Utilization 1yr", pair.one_year);
                push_cell(&mut msg, "Heavy Utilization 3yr", pair.three_year);
            }
            Some(ReservedMonthlyCosts::Standard {
                no_upfront,
                partial_upfront,
                all_upfront,
            }) => {
                push_cell(&mut msg, "Reserved (No Upfront)", no_upfront);
                push_cell(&mut msg, "Reserved (Partial Upfront, 1yr)", partial_upfront.one_year);
                push_cell(&mut msg, "Reserved (Partial Upfront, 3yr)", partial_upfront.three_year);
                push_cell(&mut msg, "Reserved (All Upfront, 1yr)", all_upfront.one_year);
                push_cell(&mut msg, "Reserved (All Upfront, 3yr)", all_upfront.three_year);
            }
            None => {}
        }
    }

    msg
}
