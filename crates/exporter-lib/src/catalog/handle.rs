//! Shared, swappable catalog snapshot

use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};

use super::Catalog;
use crate::models::Service;

/// Catalogs for every service, built together and replaced together
#[derive(Debug, Clone, Default)]
pub struct PriceCatalogs {
    pub rds: Catalog,
    pub elasticache: Catalog,
    pub built_at: Option<DateTime<Utc>>,
}

impl PriceCatalogs {
    pub fn get(&self, service: Service) -> &Catalog {
        match service {
            Service::Rds => &self.rds,
            Service::ElastiCache => &self.elasticache,
        }
    }
}

/// Process-wide catalog reference
///
/// Readers take an `Arc` snapshot and keep it for the whole evaluation; a
/// refresh builds a new value off to the side and swaps the reference, so a
/// snapshot is never mutated while it is being read.
#[derive(Debug)]
pub struct CatalogHandle {
    current: RwLock<Arc<PriceCatalogs>>,
}

impl CatalogHandle {
    pub fn new(initial: PriceCatalogs) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    pub fn snapshot(&self) -> Arc<PriceCatalogs> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Swap in a freshly built catalog set, returning the previous one
    pub fn replace(&self, next: PriceCatalogs) -> Arc<PriceCatalogs> {
        let next = Arc::new(next);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, next)
    }
}
