use std::sync::Arc;
use std::time::Instant;

use crate::cache::RedisCache;
use crate::db::Database;

/// Shared application state. Both the database and the cache are optional so
/// the server can boot without them; routes that need storage answer 503
/// instead, and cache misses fall through to the database.
#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    db: Option<Arc<Database>>,
    cache: Option<Arc<RedisCache>>,
}

impl AppState {
    pub fn new(db: Option<Arc<Database>>, cache: Option<Arc<RedisCache>>) -> Self {
        Self {
            started_at: Instant::now(),
            db,
            cache,
        }
    }

    pub fn db(&self) -> Option<Arc<Database>> {
        self.db.clone()
    }

    pub fn cache(&self) -> Option<Arc<RedisCache>> {
        self.cache.clone()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
