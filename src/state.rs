use sqlx::PgPool;
use std::sync::Arc;

use crate::config::{AppConfig, SecurityConfig};
use crate::registry::FilingService;
use crate::stamp::{PdfStamper, Stamper};
use crate::storage::StorageBackend;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub registry: FilingService,
    pub security: Arc<SecurityConfig>,
}

impl AppState {
    pub fn new(pool: PgPool, config: &AppConfig, storage: Arc<dyn StorageBackend>) -> Self {
        let stamper: Arc<dyn Stamper> = Arc::new(PdfStamper::new(config.stamp.clone()));
        Self {
            registry: FilingService::new(pool.clone(), &config.registry, storage, stamper),
            pool,
            security: Arc::new(config.security.clone()),
        }
    }
}
