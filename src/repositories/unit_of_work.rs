//! Per-page transactional commit.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};

use crate::db::{AsyncDbPool, connection};
use crate::error::{AppError, AppResult};
use crate::repositories::traits::{ChangeSet, UnitOfWork};
use crate::schema::{beta_feature_access, communication_emails, emails, user_profiles};

#[derive(Clone)]
pub struct PgUnitOfWork {
    pool: AsyncDbPool,
}

impl PgUnitOfWork {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(&self, changes: ChangeSet) -> AppResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut conn = connection(&self.pool).await?;

        conn.transaction::<_, AppError, _>(|conn| {
            async move {
                if !changes.deleted_profiles.is_empty() {
                    diesel::delete(
                        user_profiles::table
                            .filter(user_profiles::hdid.eq_any(&changes.deleted_profiles)),
                    )
                    .execute(conn)
                    .await?;
                }

                for profile in &changes.updated_profiles {
                    diesel::update(user_profiles::table.find(&profile.hdid))
                        .set(profile)
                        .execute(conn)
                        .await?;
                }

                if !changes.beta_grants.is_empty() {
                    diesel::insert_into(beta_feature_access::table)
                        .values(&changes.beta_grants)
                        .on_conflict_do_nothing()
                        .execute(conn)
                        .await?;
                }

                if !changes.emails.is_empty() {
                    diesel::insert_into(emails::table)
                        .values(&changes.emails)
                        .execute(conn)
                        .await?;
                }

                if !changes.communication_emails.is_empty() {
                    diesel::insert_into(communication_emails::table)
                        .values(&changes.communication_emails)
                        .execute(conn)
                        .await?;
                }

                Ok(())
            }
            .scope_boxed()
        })
        .await
    }
}
