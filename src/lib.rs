pub mod api;
pub mod config;
pub mod db;
pub mod errors;
pub mod execution;
pub mod ingestion;
pub mod intelligence;
pub mod metrics;
pub mod models;
pub mod services;
pub mod wallet;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::PositionStore;
use crate::services::StatusProvider;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PositionStore>,
    pub config: AppConfig,
    pub status: StatusProvider,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}
