//! Shared application state.

use sqlx::PgPool;

use vendra_auth::AuthFlowService;
use vendra_cache::LayeredCache;
use vendra_ingest::IngestQueue;

/// State handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub flow: AuthFlowService,
    pub queue: IngestQueue,
    pub cache: LayeredCache,
    /// Shared secret for webhook signature verification, when configured.
    pub webhook_secret: Option<String>,
}
