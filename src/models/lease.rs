use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

/// A time-bounded exclusive claim on a job key.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::job_leases)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Lease {
    pub job_key: String,
    pub holder: Uuid,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}
