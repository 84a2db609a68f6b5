use std::sync::Arc;

use parrot_db::DbPool;
use parrot_engine::collaborators::{AudioInspector, BlobStore};
use parrot_engine::registry::JobRegistry;

use crate::config::ServerConfig;

/// Shared application state for handlers.
///
/// The processing engine itself is not here: only the executor talks to
/// it, and the executor is wired separately in `main`.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub registry: JobRegistry,
    pub blobs: Arc<dyn BlobStore>,
    pub inspector: Arc<dyn AudioInspector>,
    pub config: Arc<ServerConfig>,
}
