//! Imports one federal drug product file.
//!
//! The download is hashed first; a file already imported for the same
//! program is skipped. Otherwise the program's products are replaced in a
//! single transaction together with the new download record.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::DrugSourceConfig;
use crate::error::AppResult;
use crate::jobs::types::{JobContext, JobSummary, JobTask};
use crate::models::FileDownload;
use crate::repositories::DrugStore;
use crate::services::FileFetcher;
use crate::services::drug_file::{extract, parse_products, sha256_hex};

pub struct DrugImportJob {
    source: DrugSourceConfig,
    lease_timeout: Duration,
    fetcher: Arc<dyn FileFetcher>,
    drugs: Arc<dyn DrugStore>,
}

impl DrugImportJob {
    pub fn new(
        source: DrugSourceConfig,
        lease_timeout: Duration,
        fetcher: Arc<dyn FileFetcher>,
        drugs: Arc<dyn DrugStore>,
    ) -> Self {
        Self {
            source,
            lease_timeout,
            fetcher,
            drugs,
        }
    }

    fn file_name(&self) -> String {
        self.source
            .url
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or(self.source.name.as_str())
            .to_string()
    }
}

impl fmt::Debug for DrugImportJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrugImportJob")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl JobTask for DrugImportJob {
    fn name(&self) -> &str {
        &self.source.name
    }

    fn lease_timeout(&self) -> Duration {
        self.lease_timeout
    }

    async fn execute(&self, ctx: &JobContext) -> AppResult<JobSummary> {
        let program = self.source.program.as_str();
        let bytes = self.fetcher.fetch(&self.source.url).await?;
        let hash = sha256_hex(&bytes);

        if self.drugs.download_exists(program, &hash).await? {
            tracing::info!(program, %hash, "File already imported, skipping");
            return Ok(JobSummary::default().with_note("file unchanged"));
        }
        if ctx.is_cancelled() {
            return Ok(JobSummary {
                cancelled: true,
                ..JobSummary::default()
            });
        }

        let content = extract(&bytes, self.source.entry.as_deref())?;
        let text = String::from_utf8_lossy(&content);
        let download = FileDownload {
            id: Uuid::new_v4(),
            program_code: program.to_string(),
            name: self.file_name(),
            hash,
            created_at: ctx.now(),
        };
        let parsed = parse_products(&text, download.id, program);

        let imported = self.drugs.replace_program(&download, &parsed.products).await?;
        tracing::info!(
            program,
            file = %download.name,
            imported,
            skipped = parsed.skipped.len(),
            "Drug products imported"
        );
        Ok(JobSummary::processed(imported).with_failed(parsed.skipped.len()))
    }
}
