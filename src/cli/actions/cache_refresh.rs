use crate::cache::{Cache, refresh};
use crate::cli::{actions::Action, globals::GlobalArgs};
use crate::db;
use anyhow::Result;

/// Handle the cache-refresh action: one reconciliation pass, then exit.
/// Scheduling is the caller's concern (cron or similar), never the server's.
pub async fn handle(action: Action, globals: &GlobalArgs) -> Result<()> {
    let Action::CacheRefresh { dsn } = action else {
        return Ok(());
    };

    let pool = db::connect(&dsn).await?;
    let cache = Cache::connect(&globals.redis_url).await;
    refresh::run(&pool, &cache).await
}
