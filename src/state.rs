use std::sync::Arc;

use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, PooledConnection};

use crate::auth::jwt::JwtService;
use crate::config::AppConfig;
use crate::db::PgPool;
use crate::error::{AppError, AppResult};
use crate::storage::ObjectStorage;

pub type DbConnection = PooledConnection<ConnectionManager<PgConnection>>;

/// Shared handles threaded through every route handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ObjectStorage>,
    pub jwt: JwtService,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        storage: Arc<dyn ObjectStorage>,
        jwt: JwtService,
    ) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            storage,
            jwt,
        }
    }

    /// Check a connection out of the pool; exhaustion surfaces as a 500.
    pub fn db(&self) -> AppResult<DbConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("could not get a database connection: {err}")))
    }
}
