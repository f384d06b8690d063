//! Generic cache eviction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use crate::db::{AsyncDbPool, connection};
use crate::error::{AppError, AppResult};
use crate::repositories::traits::CacheStore;

#[derive(Clone)]
pub struct CacheRepository {
    pool: AsyncDbPool,
}

impl CacheRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheStore for CacheRepository {
    async fn delete_expired(&self, now: DateTime<Utc>, max_rows: i64) -> AppResult<usize> {
        use crate::schema::generic_cache::dsl::*;
        let mut conn = connection(&self.pool).await?;

        conn.transaction::<_, AppError, _>(|conn| {
            async move {
                let expired: Vec<Uuid> = generic_cache
                    .select(id)
                    .filter(expires_at.lt(now))
                    .order(expires_at.asc())
                    .limit(max_rows)
                    .for_update()
                    .skip_locked()
                    .load(conn)
                    .await?;
                if expired.is_empty() {
                    return Ok(0);
                }

                let deleted = diesel::delete(generic_cache.filter(id.eq_any(&expired)))
                    .execute(conn)
                    .await?;
                Ok(deleted)
            }
            .scope_boxed()
        })
        .await
    }
}
