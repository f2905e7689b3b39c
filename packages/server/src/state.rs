use std::sync::Arc;

use common::StorageBackend;
use sea_orm::DatabaseConnection;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub backend: Arc<dyn StorageBackend>,
    pub config: AppConfig,
}
