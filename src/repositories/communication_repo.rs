//! Broadcast communication persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::db::{AsyncDbPool, connection};
use crate::error::{AppError, AppResult};
use crate::models::{Communication, CommunicationStatus, CommunicationType};
use crate::repositories::traits::CommunicationStore;

#[derive(Clone)]
pub struct CommunicationRepository {
    pool: AsyncDbPool,
}

impl CommunicationRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CommunicationStore for CommunicationRepository {
    async fn pending_email(&self, now: DateTime<Utc>) -> AppResult<Vec<Communication>> {
        use crate::schema::communications::dsl::*;
        let mut conn = connection(&self.pool).await?;

        communications
            .filter(communication_type.eq(CommunicationType::Email))
            .filter(status.eq_any([CommunicationStatus::New, CommunicationStatus::Processing]))
            .filter(effective_at.le(now))
            .filter(expires_at.gt(now))
            .order(effective_at.asc())
            .select(Communication::as_select())
            .load(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn set_status(
        &self,
        communication_id: Uuid,
        new_status: CommunicationStatus,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        use crate::schema::communications::dsl::*;
        let mut conn = connection(&self.pool).await?;

        let updated = diesel::update(communications.find(communication_id))
            .set((status.eq(new_status), updated_at.eq(now)))
            .execute(&mut conn)
            .await
            .map_err(AppError::from)?;

        if updated == 0 {
            return Err(AppError::NotFound {
                entity: "communication".to_string(),
                field: "id".to_string(),
                value: communication_id.to_string(),
            });
        }
        Ok(())
    }
}
