//! Price-list document builders shared by unit tests

use serde_json::{json, Map, Value};

fn on_demand_terms(unit: &str, price: f64) -> Value {
    json!({
        "SKU.JRTCKXETXF": {
            "priceDimensions": {
                "SKU.JRTCKXETXF.6YS6EN2CT7": {
                    "unit": unit,
                    "description": "on-demand rate",
                    "pricePerUnit": {"USD": format!("{:.10}", price)}
                }
            },
            "termAttributes": {}
        }
    })
}

/// Reserved block with one term per (option, length, hourly, upfront) row
pub fn reserved_block(rows: &[(&str, &str, f64, f64)]) -> Value {
    let mut terms = Map::new();

    for (index, (option, length, hourly, upfront)) in rows.iter().enumerate() {
        let code = format!("SKU.R{}", index);
        let mut dimensions = Map::new();
        dimensions.insert(
            format!("{}.hrs", code),
            json!({
                "unit": "Hrs",
                "description": "reserved hourly rate",
                "pricePerUnit": {"USD": format!("{:.10}", hourly)}
            }),
        );
        if *upfront > 0.0 {
            dimensions.insert(
                format!("{}.fee", code),
                json!({
                    "unit": "Quantity",
                    "description": "Upfront Fee",
                    "pricePerUnit": {"USD": format!("{:.10}", upfront)}
                }),
            );
        }
        terms.insert(
            code,
            json!({
                "priceDimensions": dimensions,
                "termAttributes": {
                    "PurchaseOption": option,
                    "LeaseContractLength": length,
                    "OfferingClass": "standard"
                }
            }),
        );
    }

    Value::Object(terms)
}

/// Database Instance record in the price list's shape
pub fn db_instance_doc(
    class: &str,
    deployment: &str,
    memory: &str,
    vcpu: u32,
    network: &str,
    hourly: f64,
    reserved: Option<Value>,
) -> String {
    let usage_type = if deployment == "Multi-AZ" {
        format!("EUC1-Multi-AZUsage:{}", class)
    } else {
        format!("EUC1-InstanceUsage:{}", class)
    };

    let mut terms = Map::new();
    terms.insert("OnDemand".to_string(), on_demand_terms("Hrs", hourly));
    if let Some(reserved) = reserved {
        terms.insert("Reserved".to_string(), reserved);
    }

    json!({
        "product": {
            "productFamily": "Database Instance",
            "attributes": {
                "usagetype": usage_type,
                "instanceType": class,
                "instanceFamily": "General purpose",
                "memory": memory,
                "vcpu": vcpu.to_string(),
                "networkPerformance": network,
                "deploymentOption": deployment,
                "databaseEngine": "PostgreSQL",
                "storage": "EBS Only",
                "location": "EU (Frankfurt)"
            }
        },
        "terms": terms
    })
    .to_string()
}

/// Cache Instance record in the price list's shape
pub fn cache_instance_doc(
    usage_type: &str,
    class: &str,
    memory: &str,
    vcpu: u32,
    network: &str,
    hourly: f64,
) -> String {
    json!({
        "product": {
            "productFamily": "Cache Instance",
            "attributes": {
                "usagetype": usage_type,
                "instanceType": class,
                "instanceFamily": "Standard",
                "memory": memory,
                "vcpu": vcpu.to_string(),
                "networkPerformance": network,
                "cacheEngine": "Redis",
                "location": "EU (Frankfurt)"
            }
        },
        "terms": {"OnDemand": on_demand_terms("Hrs", hourly)}
    })
    .to_string()
}

/// On-demand-only record for the add-on families
pub fn on_demand_doc(attributes: &[(&str, &str)], unit: &str, price: f64) -> String {
    let attributes: Map<String, Value> = attributes
        .iter()
        .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
        .collect();

    json!({
        "product": {"attributes": attributes},
        "terms": {"OnDemand": on_demand_terms(unit, price)}
    })
    .to_string()
}
