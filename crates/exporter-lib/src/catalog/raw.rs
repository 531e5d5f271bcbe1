//! Raw price-list records as returned by the provider's price-list API
//!
//! Every product is one JSON document with a `product` block (flat string
//! attributes) and a `terms` block keyed by term type, then by offer term
//! code.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

use crate::error::{FinopsError, FinopsResult};

#[derive(Debug, Clone, Deserialize)]
pub struct RawPriceRecord {
    pub product: RawProduct,
    #[serde(default)]
    pub terms: RawTerms,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProduct {
    #[serde(default)]
    pub product_family: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTerms {
    #[serde(rename = "OnDemand", default)]
    pub on_demand: BTreeMap<String, RawTerm>,
    #[serde(rename = "Reserved", default)]
    pub reserved: Option<BTreeMap<String, RawTerm>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTerm {
    #[serde(default)]
    pub price_dimensions: BTreeMap<String, RawPriceDimension>,
    #[serde(default)]
    pub term_attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPriceDimension {
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price_per_unit: HashMap<String, String>,
}

impl RawPriceDimension {
    /// Price in USD
    pub fn usd(&self) -> Option<f64> {
        self.price_per_unit
            .get("USD")
            .and_then(|price| price.trim().parse::<f64>().ok())
    }
}

impl RawPriceRecord {
    /// Decode one price-list document
    pub fn from_json(family: &str, document: &str) -> FinopsResult<Self> {
        serde_json::from_str(document)
            .map_err(|e| FinopsError::malformed(family, "<undecodable>", e.to_string()))
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.product.attributes.get(name).map(String::as_str)
    }

    /// Identifier used in error messages before the offer key is known
    pub fn label(&self) -> String {
        self.attribute("usagetype")
            .map(str::to_string)
            .or_else(|| self.product.sku.clone())
            .unwrap_or_else(|| "<unknown>".to_string())
    }

    /// Fetch an attribute the family schema requires
    pub fn require(&self, family: &str, name: &str) -> FinopsResult<&str> {
        self.attribute(name).ok_or_else(|| {
            FinopsError::malformed(family, self.label(), format!("missing attribute '{}'", name))
        })
    }
}
