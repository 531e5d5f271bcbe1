//! End-to-end runs of both jobs over an export directory

use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use exporter_lib::{
    catalog::{CatalogHandle, ProductFamily},
    collector::ExportDirectory,
    pipeline::{load_catalogs, CatalogSettings},
    AccountCostReport, ChatNotifier, CostSink, ExporterMetrics, FinopsResult, Pipeline,
    PipelineSettings, Service, StructuredLogger,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};

const ACCOUNT: &str = "111111111111";
const MISSING_ACCOUNT: &str = "222222222222";
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Default)]
struct RecordingSink {
    reports: Mutex<Vec<AccountCostReport>>,
}

impl CostSink for RecordingSink {
    fn publish(&self, report: &AccountCostReport) -> FinopsResult<()> {
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl ChatNotifier for RecordingNotifier {
    async fn notify(&self, message: &str) -> FinopsResult<()> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

fn write_json(path: &Path, value: Value) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, value.to_string()).unwrap();
}

fn on_demand(unit: &str, price: f64) -> Value {
    json!({
        "SKU.OD": {
            "priceDimensions": {
                "SKU.OD.RATE": {
                    "unit": unit,
                    "description": "on-demand rate",
                    "pricePerUnit": {"USD": price.to_string()}
                }
            },
            "termAttributes": {}
        }
    })
}

fn partial_upfront_1yr(hourly: f64, upfront: f64) -> Value {
    json!({
        "SKU.PU1": {
            "priceDimensions": {
                "SKU.PU1.HRS": {
                    "unit": "Hrs",
                    "description": "reserved hourly rate",
                    "pricePerUnit": {"USD": hourly.to_string()}
                },
                "SKU.PU1.FEE": {
                    "unit": "Quantity",
                    "description": "Upfront Fee",
                    "pricePerUnit": {"USD": upfront.to_string()}
                }
            },
            "termAttributes": {"PurchaseOption": "Partial Upfront", "LeaseContractLength": "1yr"}
        }
    })
}

fn db_instance(class: &str, deployment: &str, memory: &str, network: &str, hourly: f64, reserved: Option<Value>) -> Value {
    let usage_type = if deployment == "Multi-AZ" {
        format!("EUC1-Multi-AZUsage:{}", class)
    } else {
        format!("EUC1-InstanceUsage:{}", class)
    };
    let mut terms = json!({"OnDemand": on_demand("Hrs", hourly)});
    if let Some(reserved) = reserved {
        terms["Reserved"] = reserved;
    }

    json!({
        "product": {
            "productFamily": "Database Instance",
            "attributes": {
                "usagetype": usage_type,
                "instanceType": class,
                "memory": memory,
                "vcpu": "2",
                "networkPerformance": network,
                "deploymentOption": deployment,
                "databaseEngine": "PostgreSQL",
                "location": "EU (Frankfurt)"
            }
        },
        "terms": terms
    })
}

fn cache_instance(class: &str, memory: &str, hourly: f64) -> Value {
    json!({
        "product": {
            "productFamily": "Cache Instance",
            "attributes": {
                "usagetype": format!("EUC1-NodeUsage:{}", class),
                "instanceType": class,
                "memory": memory,
                "vcpu": "2",
                "networkPerformance": "Up to 5 Gigabit",
                "location": "EU (Frankfurt)"
            }
        },
        "terms": {"OnDemand": on_demand("Hrs", hourly)}
    })
}

fn rds_addon(attributes: Value, unit: &str, price: f64) -> Value {
    let mut attributes = attributes;
    attributes["location"] = json!("EU (Frankfurt)");
    attributes["databaseEngine"] = json!("PostgreSQL");
    json!({
        "product": {"attributes": attributes},
        "terms": {"OnDemand": on_demand(unit, price)}
    })
}

/// Price-list page as the API returns it: products encoded as JSON strings
fn page(products: Vec<Value>) -> Value {
    json!({"PriceList": products.into_iter().map(|p| p.to_string()).collect::<Vec<_>>()})
}

fn datapoints(statistic: &str, points: &[(DateTime<Utc>, f64)]) -> Value {
    json!({
        "Datapoints": points
            .iter()
            .map(|(at, value)| json!({"Timestamp": at.to_rfc3339(), statistic: value}))
            .collect::<Vec<_>>()
    })
}

fn build_export(root: &Path, now: DateTime<Utc>) {
    let rds = root.join("pricing/AmazonRDS");
    write_json(
        &rds.join("Database Instance/page-1.json"),
        page(vec![
            db_instance("db.m5.large", "Single-AZ", "8 GiB", "Up to 10 Gigabit", 0.2, None),
            db_instance(
                "db.t4g.large",
                "Single-AZ",
                "8 GiB",
                "Up to 5 Gigabit",
                0.15,
                Some(partial_upfront_1yr(0.05, 100.0)),
            ),
            db_instance("db.t4g.micro", "Single-AZ", "1 GiB", "Up to 5 Gigabit", 0.02, None),
            db_instance("db.t4g.large", "Multi-AZ", "8 GiB", "Up to 5 Gigabit", 0.3, None),
        ]),
    );
    // Unreadable record and a record from another region on a second page
    let mut broken = db_instance("db.x2.large", "Single-AZ", "32 GiB", "Moderate", 0.5, None);
    broken["product"]["attributes"]["vcpu"] = json!("many");
    let mut ireland = db_instance("db.r5.large", "Single-AZ", "16 GiB", "Up to 10 Gigabit", 0.01, None);
    ireland["product"]["attributes"]["location"] = json!("EU (Ireland)");
    write_json(&rds.join("Database Instance/page-2.json"), page(vec![broken, ireland]));

    write_json(
        &rds.join("Database Storage/page-1.json"),
        page(vec![rds_addon(
            json!({"usagetype": "EUC1-RDS:GP2-Storage", "volumeType": "General Purpose", "deploymentOption": "Single-AZ"}),
            "GB-Mo",
            0.1,
        )]),
    );
    write_json(
        &rds.join("Storage Snapshot/page-1.json"),
        page(vec![rds_addon(
            json!({"usagetype": "EUC1-RDS:ChargedBackupUsage", "storageMedia": "AmazonS3"}),
            "GB-Mo",
            0.05,
        )]),
    );

    write_json(
        &root.join("pricing/AmazonElastiCache/Cache Instance/page-1.json"),
        page(vec![
            cache_instance("cache.t3.micro", "0.5 GiB", 0.025),
            cache_instance("cache.t4g.micro", "0.5 GiB", 0.016),
            cache_instance("cache.m5.large", "6.38 GiB", 0.2),
        ]),
    );

    let account = root.join("accounts").join(ACCOUNT);
    write_json(
        &account.join("rds/describe-db-instances.json"),
        json!({"DBInstances": [{
            "DBInstanceIdentifier": "orders-db",
            "DBInstanceClass": "db.m5.large",
            "AllocatedStorage": 100,
            "MultiAZ": false,
            "StorageType": "gp2",
            "BackupRetentionPeriod": 7
        }]}),
    );
    write_json(
        &account.join("rds/snapshots/orders-db.json"),
        json!({"DBSnapshots": [{"AllocatedStorage": 20}]}),
    );
    write_json(
        &account.join("elasticache/describe-cache-clusters.json"),
        json!({"CacheClusters": [{"CacheClusterId": "sessions", "CacheNodeType": "cache.t3.micro"}]}),
    );

    let metrics = account.join("cloudwatch/AWS/RDS/orders-db");
    let hour_ago = now - Duration::hours(1);
    let day_ago = now - Duration::days(1);
    write_json(
        &metrics.join("CPUUtilization.json"),
        datapoints("Maximum", &[(day_ago, 12.0), (hour_ago, 30.0), (now - Duration::days(10), 95.0)]),
    );
    write_json(
        &metrics.join("FreeableMemory.json"),
        datapoints("Maximum", &[(day_ago, 2.0 * GIB), (hour_ago, 4.0 * GIB)]),
    );
    write_json(
        &metrics.join("NetworkTransmitThroughput.json"),
        datapoints("Maximum", &[(hour_ago, 1_000_000.0)]),
    );
    write_json(
        &metrics.join("NetworkReceiveThroughput.json"),
        datapoints("Maximum", &[(hour_ago, 1_000_000.0)]),
    );
    write_json(
        &metrics.join("FreeStorageSpace.json"),
        datapoints("Average", &[(now - Duration::seconds(30), 40.0 * GIB)]),
    );
}

async fn pipeline(root: &Path) -> Pipeline {
    let export = Arc::new(ExportDirectory::new(root));
    let metrics = ExporterMetrics::new();
    let logger = StructuredLogger::new("pipeline-tests");

    let catalogs = load_catalogs(export.as_ref(), &CatalogSettings::default(), &metrics, &logger)
        .await
        .unwrap();

    Pipeline::new(
        export,
        Arc::new(CatalogHandle::new(catalogs)),
        PipelineSettings {
            role_name: "finops-tool-member-role".to_string(),
            discount: 0.5,
        },
        metrics,
        logger,
    )
}

fn fixed_now() -> DateTime<Local> {
    Local.with_ymd_and_hms(2024, 4, 3, 5, 59, 0).unwrap()
}

fn accounts() -> Vec<String> {
    vec![ACCOUNT.to_string(), MISSING_ACCOUNT.to_string()]
}

#[tokio::test]
async fn test_catalog_built_from_export() {
    let temp = tempfile::tempdir().unwrap();
    build_export(temp.path(), fixed_now().with_timezone(&Utc));

    let pipeline = pipeline(temp.path()).await;
    let catalogs = pipeline.catalogs().snapshot();

    // Malformed and foreign-region records are not in the catalog
    assert_eq!(catalogs.rds.family_len(ProductFamily::DatabaseInstance), 4);
    assert_eq!(catalogs.rds.family_len(ProductFamily::DatabaseStorage), 1);
    assert_eq!(catalogs.elasticache.family_len(ProductFamily::CacheInstance), 3);
    assert!(catalogs
        .get(Service::Rds)
        .offer(ProductFamily::DatabaseInstance, "EUC1-InstanceUsage:db.r5.large")
        .is_none());
}

#[tokio::test]
async fn test_cost_collection_prices_each_resource() {
    let temp = tempfile::tempdir().unwrap();
    let now = fixed_now();
    build_export(temp.path(), now.with_timezone(&Utc));

    let pipeline = pipeline(temp.path()).await;
    let sink = RecordingSink::default();

    let summary = pipeline.collect_costs_at(&accounts(), &sink, now).await;

    assert_eq!(summary.accounts_processed, 1);
    assert_eq!(summary.accounts_failed, 1);
    assert_eq!(summary.services_failed, 0);
    assert_eq!(summary.resources, 2);

    let reports = sink.reports.lock().unwrap();
    assert_eq!(reports.len(), 2);

    // 720 h month, 53 h elapsed, 50% discount:
    // full    = (0.2 * 720 + 100 GB * 0.1 + 20 GB snapshot * 0.05) * 0.5
    // current = (0.2 * 53 + 60 GB in use * 0.1 + 20 GB * 0.05) * 0.5
    let rds = reports.iter().find(|r| r.service == Service::Rds).unwrap();
    assert_eq!(rds.account, ACCOUNT);
    assert_eq!(rds.resources["orders-db"].full_month_cost, 77.5);
    assert_eq!(rds.resources["orders-db"].current_period_cost, 8.8);
    assert_eq!(rds.total_month, 77.5);

    let cache = reports
        .iter()
        .find(|r| r.service == Service::ElastiCache)
        .unwrap();
    assert_eq!(cache.resources["sessions"].full_month_cost, 9.0);
    assert_eq!(cache.resources["sessions"].current_period_cost, 0.66);
}

#[tokio::test]
async fn test_recommendations_posted_per_resource() {
    let temp = tempfile::tempdir().unwrap();
    let now = fixed_now();
    build_export(temp.path(), now.with_timezone(&Utc));

    let pipeline = pipeline(temp.path()).await;
    let notifier = RecordingNotifier::default();

    let summary = pipeline
        .generate_recommendations_at(&accounts(), &notifier, now)
        .await;

    assert_eq!(summary.accounts_failed, 1);
    assert_eq!(summary.resources, 2);
    assert_eq!(summary.messages_sent, 2);

    let messages = notifier.messages.lock().unwrap();
    let rds = messages
        .iter()
        .find(|m| m.starts_with("#### RDS Recommendations FinOps Tool"))
        .unwrap();

    assert!(rds.contains("\n Instance: orders-db (db.m5.large)"));
    assert!(rds.contains("\n Observed peak: CPU 30%, freeable memory 4 GB, network 16 Mbit/s"));
    assert!(rds.contains("\n Reserved (Partial Upfront, 1yr) monthly costs: 44.33"));
    // Too small, other topology
    assert!(!rds.contains("db.t4g.micro"));
    assert_eq!(rds.matches("##### db.t4g.large").count(), 1);

    // Cheapest candidate listed first
    let t4g = rds.find("##### db.t4g.large").unwrap();
    let m5 = rds.find("##### db.m5.large").unwrap();
    assert!(t4g < m5);

    let cache = messages
        .iter()
        .find(|m| m.starts_with("#### EC Recommendations FinOps Tool"))
        .unwrap();
    assert!(cache.contains("##### cache.t4g.micro"));
    assert!(!cache.contains("cache.m5.large"));
}
