//! Provider API output captured on disk
//!
//! Layout under the export root:
//!
//! ```text
//! pricing/<ServiceCode>/<Product Family>/*.json   {"PriceList": [...]}
//! accounts/<id>/rds/describe-db-instances.json
//! accounts/<id>/rds/snapshots/<resource>.json
//! accounts/<id>/elasticache/describe-cache-clusters.json
//! accounts/<id>/elasticache/snapshots/<resource>.json
//! accounts/<id>/cloudwatch/<Namespace>/<resource>/<Metric>.json   {"Datapoints": [...]}
//! ```
//!
//! Every file holds exactly what the corresponding API call returns.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::debug;

use super::inventory::{
    latest_snapshot_gb, DescribeCacheClusters, DescribeDbInstances, DescribeSnapshots,
};
use super::{
    AccountClients, CredentialProvider, Datapoint, InventorySource, MetricQuery, MetricsSource,
    PriceListQuery, PriceListSource, RawCacheCluster, RawDbInstance, Statistic,
};
use crate::error::{FinopsError, FinopsResult};
use crate::models::Service;

fn service_dir(service: Service) -> &'static str {
    match service {
        Service::Rds => "rds",
        Service::ElastiCache => "elasticache",
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// JSON files of a directory in name order; a missing directory has none
async fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if fs::metadata(dir).await.is_err() {
        return Ok(Vec::new());
    }

    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to list {}", dir.display()))?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().map(|ext| ext == "json").unwrap_or(false) {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

#[derive(Debug, Deserialize)]
struct PriceListPage {
    #[serde(rename = "PriceList", default)]
    price_list: Vec<serde_json::Value>,
}

/// Attribute view used to apply the price-list term filters
#[derive(Debug, Deserialize)]
struct FilterView {
    product: FilterProduct,
}

#[derive(Debug, Deserialize)]
struct FilterProduct {
    #[serde(default)]
    attributes: HashMap<String, String>,
}

fn term_match(document: &str, filters: &[(&str, &str)]) -> bool {
    match serde_json::from_str::<FilterView>(document) {
        Ok(view) => filters
            .iter()
            .all(|(field, value)| view.product.attributes.get(*field).map(String::as_str) == Some(*value)),
        // Undecodable records are passed through so the catalog builder reports them
        Err(_) => true,
    }
}

#[derive(Debug, Deserialize)]
struct MetricStatistics {
    #[serde(rename = "Datapoints", default)]
    datapoints: Vec<RawDatapoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawDatapoint {
    timestamp: DateTime<Utc>,
    #[serde(default)]
    maximum: Option<f64>,
    #[serde(default)]
    average: Option<f64>,
}

impl RawDatapoint {
    fn value(&self, statistic: Statistic) -> Option<f64> {
        match statistic {
            Statistic::Maximum => self.maximum,
            Statistic::Average => self.average,
        }
    }
}

/// Root of a provider export
#[derive(Debug, Clone)]
pub struct ExportDirectory {
    root: PathBuf,
}

impl ExportDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn account_dir(&self, account: &str) -> PathBuf {
        self.root.join("accounts").join(account)
    }
}

#[async_trait]
impl PriceListSource for ExportDirectory {
    async fn price_list(&self, query: &PriceListQuery) -> Result<Vec<String>> {
        let service_root = self.root.join("pricing").join(query.service.service_code());
        if fs::metadata(&service_root).await.is_err() {
            return Err(FinopsError::PriceList {
                family: query.family.to_string(),
                reason: format!("no price-list export at {}", service_root.display()),
            }
            .into());
        }

        let mut filters = vec![("location", query.location.as_str())];
        if let Some(engine) = &query.database_engine {
            filters.push(("databaseEngine", engine.as_str()));
        }

        let mut documents = Vec::new();
        for page in json_files(&service_root.join(query.family.as_str())).await? {
            let page: PriceListPage = read_json(&page).await?;
            for item in page.price_list {
                // The API returns each product as a JSON-encoded string
                let document = match item {
                    serde_json::Value::String(encoded) => encoded,
                    other => other.to_string(),
                };
                if term_match(&document, &filters) {
                    documents.push(document);
                }
            }
        }

        debug!(
            service = %query.service,
            family = %query.family,
            records = documents.len(),
            "Read price-list export"
        );

        Ok(documents)
    }
}

#[async_trait]
impl CredentialProvider for ExportDirectory {
    async fn assume(&self, account: &str, role: &str) -> FinopsResult<AccountClients> {
        let dir = self.account_dir(account);

        match fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => {
                let export = Arc::new(AccountExport { dir });
                Ok(AccountClients {
                    account: account.to_string(),
                    inventory: export.clone(),
                    metrics: export,
                })
            }
            _ => Err(FinopsError::CredentialAssumption {
                account: account.to_string(),
                role: role.to_string(),
                reason: format!("no export for account at {}", dir.display()),
            }),
        }
    }
}

/// Export of one member account
#[derive(Debug, Clone)]
pub struct AccountExport {
    dir: PathBuf,
}

impl AccountExport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl InventorySource for AccountExport {
    async fn db_instances(&self) -> Result<Vec<RawDbInstance>> {
        let path = self.dir.join("rds").join("describe-db-instances.json");
        let listing: DescribeDbInstances = read_json(&path)
            .await
            .map_err(|e| FinopsError::Inventory(format!("{:#}", e)))?;
        Ok(listing.db_instances)
    }

    async fn cache_clusters(&self) -> Result<Vec<RawCacheCluster>> {
        let path = self
            .dir
            .join("elasticache")
            .join("describe-cache-clusters.json");
        let listing: DescribeCacheClusters = read_json(&path)
            .await
            .map_err(|e| FinopsError::Inventory(format!("{:#}", e)))?;
        Ok(listing.cache_clusters)
    }

    async fn latest_snapshot_gb(&self, service: Service, resource_id: &str) -> Result<Option<f64>> {
        let path = self
            .dir
            .join(service_dir(service))
            .join("snapshots")
            .join(format!("{}.json", resource_id));

        if fs::metadata(&path).await.is_err() {
            return Ok(None);
        }

        let listing: DescribeSnapshots = read_json(&path).await?;
        Ok(latest_snapshot_gb(&listing.snapshots))
    }
}

#[async_trait]
impl MetricsSource for AccountExport {
    async fn datapoints(&self, query: &MetricQuery) -> Result<Vec<Datapoint>> {
        let path = self
            .dir
            .join("cloudwatch")
            .join(query.service.metric_namespace())
            .join(&query.resource_id)
            .join(format!("{}.json", query.metric_name));

        if fs::metadata(&path).await.is_err() {
            return Err(FinopsError::MetricUnavailable {
                resource: query.resource_id.clone(),
                metric: query.metric_name.clone(),
                reason: "no datapoints exported".to_string(),
            }
            .into());
        }

        let stats: MetricStatistics = read_json(&path).await?;

        Ok(stats
            .datapoints
            .into_iter()
            .filter(|point| point.timestamp >= query.start && point.timestamp <= query.end)
            .filter_map(|point| {
                point.value(query.statistic).map(|value| Datapoint {
                    timestamp: point.timestamp,
                    value,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ProductFamily;
    use chrono::Duration;
    use serde_json::json;

    async fn write(path: PathBuf, value: serde_json::Value) {
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(path, value.to_string()).await.unwrap();
    }

    fn product(location: &str, engine: &str) -> String {
        json!({
            "product": {"attributes": {"location": location, "databaseEngine": engine, "storageMedia": "AmazonS3"}},
            "terms": {}
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_price_list_filters_by_location_and_engine() {
        let temp = tempfile::tempdir().unwrap();
        let export = ExportDirectory::new(temp.path());
        let family_dir = temp.path().join("pricing/AmazonRDS/Storage Snapshot");

        write(
            family_dir.join("page-1.json"),
            json!({"PriceList": [
                product("EU (Frankfurt)", "PostgreSQL"),
                product("EU (Ireland)", "PostgreSQL"),
                product("EU (Frankfurt)", "MySQL"),
            ]}),
        )
        .await;

        let query = PriceListQuery {
            service: Service::Rds,
            family: ProductFamily::StorageSnapshot,
            location: "EU (Frankfurt)".to_string(),
            database_engine: Some("PostgreSQL".to_string()),
        };

        let documents = export.price_list(&query).await.unwrap();
        assert_eq!(documents.len(), 1);
        assert!(documents[0].contains("Frankfurt"));
    }

    #[tokio::test]
    async fn test_missing_family_directory_is_empty() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp.path().join("pricing/AmazonElastiCache"))
            .await
            .unwrap();
        let export = ExportDirectory::new(temp.path());

        let query = PriceListQuery {
            service: Service::ElastiCache,
            family: ProductFamily::GlobalDatastore,
            location: "EU (Frankfurt)".to_string(),
            database_engine: None,
        };

        assert!(export.price_list(&query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_account_fails_credential_assumption() {
        let temp = tempfile::tempdir().unwrap();
        let export = ExportDirectory::new(temp.path());

        let err = export
            .assume("999999999999", "finops-tool-member-role")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, FinopsError::CredentialAssumption { .. }));
    }

    #[tokio::test]
    async fn test_datapoints_window_and_statistic() {
        let temp = tempfile::tempdir().unwrap();
        let account = temp.path().join("accounts/123");
        let now = Utc::now();

        write(
            account.join("cloudwatch/AWS/RDS/orders-db/CPUUtilization.json"),
            json!({"Datapoints": [
                {"Timestamp": (now - Duration::hours(1)).to_rfc3339(), "Maximum": 40.0, "Unit": "Percent"},
                {"Timestamp": (now - Duration::days(9)).to_rfc3339(), "Maximum": 99.0, "Unit": "Percent"},
                {"Timestamp": (now - Duration::hours(2)).to_rfc3339(), "Average": 20.0, "Unit": "Percent"}
            ]}),
        )
        .await;

        let clients = ExportDirectory::new(temp.path())
            .assume("123", "role")
            .await
            .unwrap();

        let query = MetricQuery {
            service: Service::Rds,
            resource_id: "orders-db".to_string(),
            metric_name: "CPUUtilization".to_string(),
            start: now - Duration::days(7),
            end: now,
            period_secs: 3600,
            statistic: Statistic::Maximum,
            unit: "Percent".to_string(),
        };

        let points = clients.metrics.datapoints(&query).await.unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 40.0);

        let missing = MetricQuery {
            metric_name: "FreeableMemory".to_string(),
            ..query
        };
        assert!(clients.metrics.datapoints(&missing).await.is_err());
    }

    #[tokio::test]
    async fn test_snapshot_and_inventory_files() {
        let temp = tempfile::tempdir().unwrap();
        let account = temp.path().join("accounts/123");

        write(
            account.join("elasticache/describe-cache-clusters.json"),
            json!({"CacheClusters": [{"CacheClusterId": "sessions", "CacheNodeType": "cache.t3.micro"}]}),
        )
        .await;
        write(
            account.join("elasticache/snapshots/sessions.json"),
            json!({"Snapshots": [{"AllocatedStorage": 1}, {"AllocatedStorage": 3}]}),
        )
        .await;

        let export = AccountExport::new(&account);

        let clusters = export.cache_clusters().await.unwrap();
        assert_eq!(clusters[0].cache_cluster_id, "sessions");
        assert_eq!(
            export
                .latest_snapshot_gb(Service::ElastiCache, "sessions")
                .await
                .unwrap(),
            Some(3.0)
        );
        assert_eq!(
            export
                .latest_snapshot_gb(Service::ElastiCache, "other")
                .await
                .unwrap(),
            None
        );
        assert!(export.db_instances().await.is_err());
    }
}
