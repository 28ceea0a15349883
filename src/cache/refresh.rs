//! Cache reconciliation.
//!
//! Invoked by an external scheduler (`custodia cache-refresh`), never from
//! the request path. Re-derives the entry for every user with an active
//! session and for every app, writing only keys absent from the cache; this
//! repairs entries lost to eviction or restart.

use anyhow::Result;
use sqlx::PgPool;
use tracing::info;

use super::{Cache, mirror};
use crate::identity::{UserScope, apps, users};
use crate::session;

pub async fn run(pool: &PgPool, cache: &Cache) -> Result<()> {
    let mut repaired = 0usize;

    for user_id in session::active_user_ids(pool).await? {
        if cache.exists(&mirror::principal_key(user_id)).await {
            continue;
        }
        // Soft-deleted users keep no cache entry even with a lingering session.
        let Some(user) = users::find(pool, user_id, UserScope::Default).await? else {
            continue;
        };
        mirror::write_user(pool, cache, &user, true).await;
        repaired += 1;
    }

    for app in apps::all(pool).await? {
        if cache.exists(&mirror::principal_key(app.id)).await {
            continue;
        }
        mirror::write_app(pool, cache, &app).await;
        repaired += 1;
    }

    info!("Cache refresh wrote {repaired} missing entries");
    Ok(())
}
