//! Cost exporter library for managed database and cache fleets
//!
//! This crate provides the core functionality for:
//! - Normalizing price-list records into typed per-service catalogs
//! - Pricing running resources for the current billing month
//! - Finding cheaper capacity classes from observed utilization
//! - Running the scheduled jobs across member accounts
//! - Health checks and observability

pub mod catalog;
pub mod collector;
pub mod cost;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod recommend;

pub use error::{FinopsError, FinopsResult};
pub use health::{HealthRegistry, HealthResponse, HealthStatus, ReadinessResponse};
pub use models::*;
pub use observability::{ExporterMetrics, StructuredLogger};
pub use pipeline::{ChatNotifier, CostSink, Pipeline, PipelineSettings, RunSummary};
