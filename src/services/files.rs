//! Downloads source files for the import jobs.

use async_trait::async_trait;

use crate::error::{AppError, AppResult};
use crate::external::build_http_client;

const SERVICE: &str = "file-download";
/// Drug product archives are tens of megabytes
const DOWNLOAD_TIMEOUT_SECS: u64 = 300;

#[async_trait]
pub trait FileFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> AppResult<Vec<u8>>;
}

pub struct HttpFileFetcher {
    client: reqwest::Client,
}

impl HttpFileFetcher {
    pub fn new() -> AppResult<Self> {
        Ok(Self {
            client: build_http_client(SERVICE, DOWNLOAD_TIMEOUT_SECS)?,
        })
    }
}

#[async_trait]
impl FileFetcher for HttpFileFetcher {
    async fn fetch(&self, url: &str) -> AppResult<Vec<u8>> {
        let response = self.client.get(url).send().await.map_err(|e| AppError::External {
            service: SERVICE.to_string(),
            source: anyhow::Error::from(e).context(format!("GET {url}")),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::external(SERVICE, format!("GET {url} returned {status}")));
        }

        let bytes = response.bytes().await.map_err(|e| AppError::External {
            service: SERVICE.to_string(),
            source: anyhow::Error::from(e).context(format!("reading body of {url}")),
        })?;
        tracing::debug!(url, bytes = bytes.len(), "File downloaded");
        Ok(bytes.to_vec())
    }
}
