use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// A cached payload for one patient and domain.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::generic_cache)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CacheEntry {
    pub id: Uuid,
    pub hdid: String,
    pub domain: String,
    pub version: i32,
    pub payload: JsonValue,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}
