//! Building the price catalogs and swapping them in

use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::catalog::{build_catalog, CatalogHandle, PriceCatalogs, ProductFamily};
use crate::collector::{PriceListQuery, PriceListSource};
use crate::models::Service;
use crate::observability::{ExporterMetrics, StructuredLogger};

/// Price-list filters applied to every query
#[derive(Debug, Clone)]
pub struct CatalogSettings {
    /// Region display name, e.g. `EU (Frankfurt)`
    pub location: String,
    /// Engine filter for database price lists, e.g. `PostgreSQL`
    pub database_engine: String,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            location: "EU (Frankfurt)".to_string(),
            database_engine: "PostgreSQL".to_string(),
        }
    }
}

impl CatalogSettings {
    fn query(&self, service: Service, family: ProductFamily) -> PriceListQuery {
        PriceListQuery {
            service,
            family,
            location: self.location.clone(),
            database_engine: match service {
                Service::Rds => Some(self.database_engine.clone()),
                Service::ElastiCache => None,
            },
        }
    }
}

/// Fetch every product family and build the catalogs of all services
///
/// Fails when any family cannot be fetched; malformed records only reduce
/// the catalog and are counted.
pub async fn load_catalogs(
    source: &dyn PriceListSource,
    settings: &CatalogSettings,
    metrics: &ExporterMetrics,
    logger: &StructuredLogger,
) -> Result<PriceCatalogs> {
    let mut catalogs = PriceCatalogs::default();

    for service in Service::ALL {
        let mut raw = BTreeMap::new();
        for family in ProductFamily::for_service(service) {
            let documents = source
                .price_list(&settings.query(service, *family))
                .await
                .with_context(|| format!("Failed to fetch '{}' price list for {}", family, service))?;
            raw.insert(*family, documents);
        }

        let build = build_catalog(service, &raw);
        for family in ProductFamily::for_service(service) {
            metrics.set_catalog_offers(service, family.as_str(), build.catalog.family_len(*family));
        }
        metrics.inc_rejected_offers(service, build.rejected.len());
        logger.log_catalog_built(service, build.catalog.len(), build.rejected.len());

        match service {
            Service::Rds => catalogs.rds = build.catalog,
            Service::ElastiCache => catalogs.elasticache = build.catalog,
        }
    }

    let built_at = Utc::now();
    metrics.set_catalog_built(built_at.timestamp());
    catalogs.built_at = Some(built_at);
    Ok(catalogs)
}

/// Rebuild the catalogs and swap them into `handle`
///
/// On failure the previous catalogs stay active and the error is returned.
pub async fn refresh_catalogs(
    handle: &CatalogHandle,
    source: &dyn PriceListSource,
    settings: &CatalogSettings,
    metrics: &ExporterMetrics,
    logger: &StructuredLogger,
) -> Result<Arc<PriceCatalogs>> {
    match load_catalogs(source, settings, metrics, logger).await {
        Ok(next) => Ok(handle.replace(next)),
        Err(e) => {
            logger.log_catalog_refresh_failed(&format!("{:#}", e));
            Err(e)
        }
    }
}
