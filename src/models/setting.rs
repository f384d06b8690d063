use chrono::{DateTime, Utc};
use diesel::prelude::*;

/// Identifies one row of the application settings table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SettingKey {
    pub application: String,
    pub component: String,
    pub key: String,
}

impl SettingKey {
    pub const JOB_APPLICATION: &'static str = "JobScheduler";

    pub fn new(
        application: impl Into<String>,
        component: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            application: application.into(),
            component: component.into(),
            key: key.into(),
        }
    }

    /// Key under the job scheduler application.
    pub fn job(component: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(Self::JOB_APPLICATION, component, key)
    }
}

impl std::fmt::Display for SettingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.application, self.component, self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::application_settings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ApplicationSetting {
    pub application: String,
    pub component: String,
    pub setting_key: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationSetting {
    pub fn new(key: &SettingKey, value: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            application: key.application.clone(),
            component: key.component.clone(),
            setting_key: key.key.clone(),
            value: value.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> SettingKey {
        SettingKey::new(&self.application, &self.component, &self.setting_key)
    }
}
