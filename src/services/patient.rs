//! Patient demographics lookup.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::config::PatientConfig;
use crate::error::{AppError, AppResult};
use crate::external::{build_http_client, join_url};

const SERVICE: &str = "patient";

#[async_trait]
pub trait PatientLookup: Send + Sync {
    /// Birth date for `hdid`; `None` when the registry has none on file.
    async fn birth_date(&self, hdid: &str) -> AppResult<Option<NaiveDate>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PatientResponse {
    resource_payload: Option<PatientPayload>,
}

#[derive(Debug, Deserialize)]
struct PatientPayload {
    birthdate: Option<String>,
}

fn parse_birth_date(raw: &str) -> Option<NaiveDate> {
    // full timestamps arrive as "1980-04-12T00:00:00"
    raw.get(..10)
        .and_then(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
}

pub struct PatientClient {
    client: reqwest::Client,
    base_url: String,
}

impl PatientClient {
    pub fn new(config: &PatientConfig) -> AppResult<Self> {
        Ok(Self {
            client: build_http_client(SERVICE, config.timeout_secs)?,
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl PatientLookup for PatientClient {
    async fn birth_date(&self, hdid: &str) -> AppResult<Option<NaiveDate>> {
        let url = join_url(&self.base_url, &format!("Patient/{hdid}"));
        let response = self.client.get(&url).send().await.map_err(|e| AppError::External {
            service: SERVICE.to_string(),
            source: anyhow::Error::from(e),
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AppError::external(SERVICE, format!("patient lookup returned {status}")));
        }

        let body: PatientResponse = response.json().await.map_err(|e| AppError::External {
            service: SERVICE.to_string(),
            source: anyhow::Error::from(e).context("malformed patient response"),
        })?;

        Ok(body
            .resource_payload
            .and_then(|payload| payload.birthdate)
            .as_deref()
            .and_then(parse_birth_date))
    }
}
