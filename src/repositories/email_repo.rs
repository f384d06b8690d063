//! Outbound email persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use crate::db::{AsyncDbPool, connection};
use crate::error::{AppError, AppResult};
use crate::models::{Email, EmailStatus};
use crate::repositories::traits::EmailStore;

#[derive(Clone)]
pub struct EmailRepository {
    pool: AsyncDbPool,
}

impl EmailRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EmailStore for EmailRepository {
    async fn insert(&self, email: &Email) -> AppResult<()> {
        use crate::schema::emails::dsl::*;
        let mut conn = connection(&self.pool).await?;

        diesel::insert_into(emails)
            .values(email)
            .execute(&mut conn)
            .await
            .map_err(AppError::from)?;
        Ok(())
    }

    async fn find(&self, email_id: Uuid) -> AppResult<Option<Email>> {
        use crate::schema::emails::dsl::*;
        let mut conn = connection(&self.pool).await?;

        emails
            .find(email_id)
            .select(Email::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)
    }

    async fn fetch_pending(&self, limit: i64) -> AppResult<Vec<Email>> {
        use crate::schema::emails::dsl::*;
        let mut conn = connection(&self.pool).await?;

        emails
            .filter(status.eq(EmailStatus::New))
            .order((priority.desc(), created_at.asc()))
            .limit(limit)
            .select(Email::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn update(&self, email: &Email) -> AppResult<()> {
        use crate::schema::emails::dsl::*;
        let mut conn = connection(&self.pool).await?;

        let updated = diesel::update(emails.find(email.id))
            .set(email)
            .execute(&mut conn)
            .await
            .map_err(AppError::from)?;

        if updated == 0 {
            return Err(AppError::NotFound {
                entity: "email".to_string(),
                field: "id".to_string(),
                value: email.id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_created_before(
        &self,
        cutoff: DateTime<Utc>,
        max_rows: i64,
    ) -> AppResult<usize> {
        use crate::schema::emails::dsl::*;
        let mut conn = connection(&self.pool).await?;

        conn.transaction::<_, AppError, _>(|conn| {
            async move {
                let oldest: Vec<Uuid> = emails
                    .select(id)
                    .filter(created_at.lt(cutoff))
                    .order(created_at.asc())
                    .limit(max_rows)
                    .for_update()
                    .skip_locked()
                    .load(conn)
                    .await?;
                if oldest.is_empty() {
                    return Ok(0);
                }

                let deleted = diesel::delete(emails.filter(id.eq_any(&oldest)))
                    .execute(conn)
                    .await?;
                Ok(deleted)
            }
            .scope_boxed()
        })
        .await
    }
}
