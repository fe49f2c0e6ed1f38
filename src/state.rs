use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::repositories::postgres::PgStore;
use crate::repositories::store::SignalStore;

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The session/notification store.
    pub store: Arc<dyn SignalStore>,
    /// The application's configuration.
    pub config: Config,
}

impl AppState {
    /// Creates a new `AppState` backed by PostgreSQL.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let pool = crate::db::create_pool(&config.database_url).await?;
        tracing::info!("✅ PostgreSQL pool initialized");

        crate::db::run_migrations(&pool).await?;
        tracing::info!("✅ Schema migrations applied");

        Ok(AppState {
            store: Arc::new(PgStore::new(pool)),
            config: config.clone(),
        })
    }

    /// Creates an `AppState` over an arbitrary store backend. Used by tests
    /// with the in-memory store.
    pub fn with_store(store: Arc<dyn SignalStore>, config: Config) -> Self {
        AppState { store, config }
    }
}
