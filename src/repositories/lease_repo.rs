//! Job lease persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use crate::db::{AsyncDbPool, connection};
use crate::error::{AppError, AppResult};
use crate::models::Lease;
use crate::repositories::traits::LeaseStore;

#[derive(Clone)]
pub struct LeaseRepository {
    pool: AsyncDbPool,
}

impl LeaseRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeaseStore for LeaseRepository {
    async fn try_insert(&self, lease: &Lease, now: DateTime<Utc>) -> AppResult<bool> {
        use crate::schema::job_leases::dsl::*;
        let mut conn = connection(&self.pool).await?;
        let lease = lease.clone();

        conn.transaction::<_, AppError, _>(|conn| {
            async move {
                diesel::delete(
                    job_leases
                        .filter(job_key.eq(&lease.job_key))
                        .filter(expires_at.lt(now)),
                )
                .execute(conn)
                .await?;

                let inserted = diesel::insert_into(job_leases)
                    .values(&lease)
                    .on_conflict_do_nothing()
                    .execute(conn)
                    .await?;

                Ok(inserted == 1)
            }
            .scope_boxed()
        })
        .await
    }

    async fn remove(&self, key: &str, lease_holder: Uuid) -> AppResult<bool> {
        use crate::schema::job_leases::dsl::*;
        let mut conn = connection(&self.pool).await?;

        let removed = diesel::delete(
            job_leases
                .filter(job_key.eq(key))
                .filter(holder.eq(lease_holder)),
        )
        .execute(&mut conn)
        .await
        .map_err(AppError::from)?;

        Ok(removed == 1)
    }
}
