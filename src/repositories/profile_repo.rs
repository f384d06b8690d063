//! User profile paging for profile-driven jobs.

use async_trait::async_trait;
use diesel::dsl::{exists, not};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::db::{AsyncDbPool, connection};
use crate::error::{AppError, AppResult};
use crate::models::UserProfile;
use crate::repositories::traits::{ProfileFilter, ProfileStore};
use crate::schema::{beta_feature_access, communication_emails, user_profiles};

#[derive(Clone)]
pub struct ProfileRepository {
    pool: AsyncDbPool,
}

impl ProfileRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for ProfileRepository {
    async fn page(
        &self,
        filter: &ProfileFilter,
        after: Option<&str>,
        limit: i64,
    ) -> AppResult<Vec<UserProfile>> {
        let mut conn = connection(&self.pool).await?;

        let mut query = user_profiles::table
            .select(UserProfile::as_select())
            .into_boxed();

        query = match filter {
            ProfileFilter::ClosedBefore(cutoff) => {
                query.filter(user_profiles::closed_at.lt(*cutoff))
            }
            ProfileFilter::MissingYearOfBirth => {
                query.filter(user_profiles::year_of_birth.is_null())
            }
            ProfileFilter::LackingFeature(feature) => query
                .filter(user_profiles::closed_at.is_null())
                .filter(not(exists(
                    beta_feature_access::table
                        .filter(beta_feature_access::hdid.eq(user_profiles::hdid))
                        .filter(beta_feature_access::feature.eq(feature.clone())),
                ))),
            ProfileFilter::ReachableCreatedBefore(cutoff) => query
                .filter(user_profiles::closed_at.is_null())
                .filter(user_profiles::email.is_not_null())
                .filter(user_profiles::created_at.lt(*cutoff)),
            ProfileFilter::AwaitingCommunication(communication) => query
                .filter(user_profiles::closed_at.is_null())
                .filter(user_profiles::email.is_not_null())
                .filter(not(exists(
                    communication_emails::table
                        .filter(communication_emails::hdid.eq(user_profiles::hdid))
                        .filter(communication_emails::communication_id.eq(*communication)),
                ))),
        };

        if let Some(after) = after {
            query = query.filter(user_profiles::hdid.gt(after.to_string()));
        }

        query
            .order(user_profiles::hdid.asc())
            .limit(limit)
            .load(&mut conn)
            .await
            .map_err(AppError::from)
    }
}
