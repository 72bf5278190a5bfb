//! `watchpro serve`

use crate::cache::SearchCache;
use crate::config::Config;
use crate::error::Result;
use crate::server::{run_server, AppState};
use crate::storage::ChatStorage;
use crate::store::create_store;
use std::sync::Arc;
use std::time::Duration;

/// Run the HTTP API until Ctrl-C
///
/// Starts the cache sweeper when `cache.sweep_enabled` is set. The store is
/// closed on the way out, also when the server fails.
pub async fn run_serve(config: Config, bind: Option<String>) -> Result<()> {
    let store = create_store(&config.store)?;
    tracing::info!("Opened {} store", store.backend_name());

    let workflow = Arc::new(super::build_workflow(&config, Arc::clone(&store))?);
    let cache = SearchCache::from_config(Arc::clone(&store), &config.cache);

    let sweeper = config.cache.sweep_enabled.then(|| {
        cache.spawn_sweeper(Duration::from_secs(config.cache.sweep_interval_seconds))
    });

    let state = AppState {
        workflow,
        storage: ChatStorage::new(Arc::clone(&store)),
        cache,
        default_user_id: config.workflow.default_user_id.clone(),
    };

    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let result = run_server(state, &bind).await;

    if let Some(sweeper) = sweeper {
        sweeper.shutdown();
    }
    store.close().await?;
    tracing::info!("Store closed");
    result
}
