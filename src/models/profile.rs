use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

/// A portal user's profile, keyed by health directory id.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::user_profiles)]
#[diesel(primary_key(hdid))]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct UserProfile {
    pub hdid: String,
    pub email: Option<String>,
    pub identity_management_id: Option<Uuid>,
    pub year_of_birth: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    pub fn new(hdid: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            hdid: hdid.into(),
            email: None,
            identity_management_id: None,
            year_of_birth: None,
            created_at,
            last_login_at: None,
            closed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.closed_at.is_none()
    }

    /// A closed profile whose grace period ended before `cutoff`.
    pub fn is_due_for_deletion(&self, cutoff: DateTime<Utc>) -> bool {
        self.closed_at.is_some_and(|closed| closed < cutoff)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::beta_feature_access)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BetaFeatureAccess {
    pub hdid: String,
    pub feature: String,
    pub created_at: DateTime<Utc>,
}
