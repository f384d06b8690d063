use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

/// A published version of a legal agreement (e.g. terms of service).
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::legal_agreements)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct LegalAgreement {
    pub id: Uuid,
    pub agreement_type: String,
    pub effective_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
