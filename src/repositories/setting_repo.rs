//! Application settings: completion markers and high-water marks.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;

use crate::db::{AsyncDbPool, connection};
use crate::error::{AppError, AppResult};
use crate::models::{ApplicationSetting, SettingKey};
use crate::repositories::traits::SettingStore;

#[derive(Clone)]
pub struct SettingRepository {
    pool: AsyncDbPool,
}

impl SettingRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingStore for SettingRepository {
    async fn get(&self, key: &SettingKey) -> AppResult<Option<ApplicationSetting>> {
        use crate::schema::application_settings::dsl::*;
        let mut conn = connection(&self.pool).await?;

        application_settings
            .find((&key.application, &key.component, &key.key))
            .select(ApplicationSetting::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)
    }

    async fn insert_if_absent(&self, setting: &ApplicationSetting) -> AppResult<bool> {
        use crate::schema::application_settings::dsl::*;
        let mut conn = connection(&self.pool).await?;

        let inserted = diesel::insert_into(application_settings)
            .values(setting)
            .on_conflict_do_nothing()
            .execute(&mut conn)
            .await
            .map_err(AppError::from)?;

        Ok(inserted == 1)
    }

    async fn upsert(&self, setting: &ApplicationSetting) -> AppResult<()> {
        use crate::schema::application_settings::dsl::*;
        let mut conn = connection(&self.pool).await?;

        diesel::insert_into(application_settings)
            .values(setting)
            .on_conflict((application, component, setting_key))
            .do_update()
            .set((value.eq(excluded(value)), updated_at.eq(excluded(updated_at))))
            .execute(&mut conn)
            .await
            .map_err(AppError::from)?;

        Ok(())
    }
}
