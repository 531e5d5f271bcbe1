//! Cost terms attached to every offer
//!
//! An offer always carries exactly one on-demand rate. Reserved pricing is
//! optional and grouped by purchase option, then contract length.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use super::raw::{RawTerm, RawTerms};
use crate::error::{FinopsError, FinopsResult};

/// Description the catalog puts on the one-time fee dimension of a reserved term
const UPFRONT_FEE_DESCRIPTION: &str = "Upfront Fee";

/// Payment structure of a reserved commitment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PurchaseOption {
    NoUpfront,
    PartialUpfront,
    AllUpfront,
    /// Legacy cache-node reservation model
    HeavyUtilization,
}

impl PurchaseOption {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "No Upfront" => Some(PurchaseOption::NoUpfront),
            "Partial Upfront" => Some(PurchaseOption::PartialUpfront),
            "All Upfront" => Some(PurchaseOption::AllUpfront),
            "Heavy Utilization" => Some(PurchaseOption::HeavyUtilization),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseOption::NoUpfront => "No Upfront",
            PurchaseOption::PartialUpfront => "Partial Upfront",
            PurchaseOption::AllUpfront => "All Upfront",
            PurchaseOption::HeavyUtilization => "Heavy Utilization",
        }
    }
}

impl fmt::Display for PurchaseOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Length of a reserved commitment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContractLength {
    OneYear,
    ThreeYears,
}

impl ContractLength {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "1yr" => Some(ContractLength::OneYear),
            "3yr" => Some(ContractLength::ThreeYears),
            _ => None,
        }
    }

    /// Months an upfront fee is amortized over
    pub fn months(&self) -> u32 {
        match self {
            ContractLength::OneYear => 12,
            ContractLength::ThreeYears => 36,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractLength::OneYear => "1yr",
            ContractLength::ThreeYears => "3yr",
        }
    }
}

impl fmt::Display for ContractLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pay-as-you-go price of an offer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnDemandRate {
    /// Billing unit, e.g. `Hrs`, `GB-Mo`, `IOPS-Mo`
    pub unit: String,
    pub price_per_unit: f64,
}

/// One cell of the reserved pricing table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservedRate {
    /// Unit of the recurring charge; `None` when the term only has an upfront fee
    pub unit: Option<String>,
    pub price_per_unit: f64,
    pub upfront_fee: f64,
}

pub type ReservedTerms = BTreeMap<PurchaseOption, BTreeMap<ContractLength, ReservedRate>>;

/// Full pricing table of an offer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostTerms {
    pub on_demand: OnDemandRate,
    /// `None` for on-demand-only offers
    pub reserved: Option<ReservedTerms>,
}

impl CostTerms {
    pub fn on_demand_only(unit: impl Into<String>, price_per_unit: f64) -> Self {
        Self {
            on_demand: OnDemandRate {
                unit: unit.into(),
                price_per_unit,
            },
            reserved: None,
        }
    }

    pub fn reserved_rate(
        &self,
        option: PurchaseOption,
        length: ContractLength,
    ) -> Option<&ReservedRate> {
        self.reserved.as_ref()?.get(&option)?.get(&length)
    }

    /// Extract the full cost table from a raw record's terms block
    pub fn from_raw(family: &str, key: &str, terms: &RawTerms) -> FinopsResult<Self> {
        let on_demand = on_demand_rate(family, key, terms)?;
        let reserved = match &terms.reserved {
            Some(raw) => Some(reserved_terms(family, key, raw)?),
            None => None,
        };
        Ok(Self {
            on_demand,
            reserved,
        })
    }
}

/// First price dimension of the first on-demand term
pub(crate) fn on_demand_rate(family: &str, key: &str, terms: &RawTerms) -> FinopsResult<OnDemandRate> {
    let dimension = terms
        .on_demand
        .values()
        .flat_map(|term| term.price_dimensions.values())
        .next()
        .ok_or_else(|| FinopsError::malformed(family, key, "no on-demand price dimension"))?;

    let price_per_unit = dimension
        .usd()
        .ok_or_else(|| FinopsError::malformed(family, key, "on-demand price has no USD value"))?;

    Ok(OnDemandRate {
        unit: dimension.unit.clone(),
        price_per_unit,
    })
}

/// Group reserved price dimensions by purchase option and contract length
fn reserved_terms(
    family: &str,
    key: &str,
    raw: &BTreeMap<String, RawTerm>,
) -> FinopsResult<ReservedTerms> {
    let mut table = ReservedTerms::new();

    for (code, term) in raw {
        let option_text = term.term_attributes.get("PurchaseOption").ok_or_else(|| {
            FinopsError::malformed(family, key, format!("reserved term {} has no PurchaseOption", code))
        })?;
        let length_text = term
            .term_attributes
            .get("LeaseContractLength")
            .ok_or_else(|| {
                FinopsError::malformed(
                    family,
                    key,
                    format!("reserved term {} has no LeaseContractLength", code),
                )
            })?;

        let (Some(option), Some(length)) = (
            PurchaseOption::parse(option_text),
            ContractLength::parse(length_text),
        ) else {
            debug!(
                family = %family,
                key = %key,
                purchase_option = %option_text,
                contract_length = %length_text,
                "Ignoring reserved term outside the supported option set"
            );
            continue;
        };

        let mut rate = ReservedRate {
            unit: None,
            price_per_unit: 0.0,
            upfront_fee: 0.0,
        };

        for dimension in term.price_dimensions.values() {
            let price = dimension.usd().ok_or_else(|| {
                FinopsError::malformed(family, key, format!("reserved term {} has no USD price", code))
            })?;

            if dimension.description == UPFRONT_FEE_DESCRIPTION {
                rate.upfront_fee = price;
            } else {
                rate.price_per_unit = price;
                rate.unit = Some(dimension.unit.clone());
            }
        }

        table.entry(option).or_default().insert(length, rate);
    }

    Ok(table)
}
