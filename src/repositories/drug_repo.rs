//! Drug product reference data.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};

use crate::db::{AsyncDbPool, connection};
use crate::error::{AppError, AppResult};
use crate::models::{DrugProduct, FileDownload};
use crate::repositories::traits::DrugStore;
use crate::schema::{drug_products, file_downloads};

/// Rows per INSERT; keeps bind parameters under the PostgreSQL limit.
const INSERT_CHUNK: usize = 5_000;

#[derive(Clone)]
pub struct DrugRepository {
    pool: AsyncDbPool,
}

impl DrugRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DrugStore for DrugRepository {
    async fn download_exists(&self, program: &str, file_hash: &str) -> AppResult<bool> {
        let mut conn = connection(&self.pool).await?;

        diesel::select(diesel::dsl::exists(
            file_downloads::table
                .filter(file_downloads::program_code.eq(program))
                .filter(file_downloads::hash.eq(file_hash)),
        ))
        .get_result(&mut conn)
        .await
        .map_err(AppError::from)
    }

    async fn replace_program(
        &self,
        download: &FileDownload,
        products: &[DrugProduct],
    ) -> AppResult<usize> {
        let mut conn = connection(&self.pool).await?;
        let download = download.clone();
        let products = products.to_vec();

        conn.transaction::<_, AppError, _>(|conn| {
            async move {
                // Products of older downloads go with them (ON DELETE CASCADE)
                diesel::delete(
                    file_downloads::table
                        .filter(file_downloads::program_code.eq(&download.program_code)),
                )
                .execute(conn)
                .await?;

                diesel::insert_into(file_downloads::table)
                    .values(&download)
                    .execute(conn)
                    .await?;

                let mut inserted = 0;
                for chunk in products.chunks(INSERT_CHUNK) {
                    inserted += diesel::insert_into(drug_products::table)
                        .values(chunk)
                        .execute(conn)
                        .await?;
                }
                Ok(inserted)
            }
            .scope_boxed()
        })
        .await
    }
}
