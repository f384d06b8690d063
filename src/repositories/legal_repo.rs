use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::db::{AsyncDbPool, connection};
use crate::error::{AppError, AppResult};
use crate::models::LegalAgreement;
use crate::repositories::traits::LegalAgreementStore;

#[derive(Clone)]
pub struct LegalAgreementRepository {
    pool: AsyncDbPool,
}

impl LegalAgreementRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LegalAgreementStore for LegalAgreementRepository {
    async fn latest_effective(
        &self,
        kind: &str,
        as_of: DateTime<Utc>,
    ) -> AppResult<Option<LegalAgreement>> {
        use crate::schema::legal_agreements::dsl::*;
        let mut conn = connection(&self.pool).await?;

        legal_agreements
            .filter(agreement_type.eq(kind))
            .filter(effective_date.le(as_of))
            .order(effective_date.desc())
            .select(LegalAgreement::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)
    }
}
