//! Notification API transport.
//!
//! Sends through `POST {base_url}/v2/notifications/email` with the API key
//! in the `Authorization` header. Non-2xx answers are rejections carrying
//! the HTTP status; requests that never got an answer carry none.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use super::transport::{Delivery, MailTransport, TransportError};
use crate::config::NotifyConfig;
use crate::error::AppResult;
use crate::external::{build_http_client, join_url};
use crate::models::Email;

#[derive(Debug, Serialize)]
struct EmailRequest<'a> {
    email_address: &'a str,
    template_id: &'a str,
    personalisation: JsonValue,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct EmailResponse {
    id: Option<String>,
}

pub struct NotifyTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    template_id: String,
}

impl NotifyTransport {
    pub fn new(config: &NotifyConfig) -> AppResult<Self> {
        Ok(Self {
            client: build_http_client("notify", config.timeout_secs)?,
            endpoint: join_url(&config.base_url, "v2/notifications/email"),
            api_key: config.api_key.clone(),
            template_id: config.template_id.clone(),
        })
    }

    /// The stored personalisation plus the rendered subject and body, so a
    /// generic pass-through template can display either.
    fn personalisation(email: &Email) -> JsonValue {
        let mut fields = match &email.personalization {
            Some(JsonValue::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        fields.insert("subject".to_string(), JsonValue::String(email.subject.clone()));
        fields.insert("body".to_string(), JsonValue::String(email.body.clone()));
        JsonValue::Object(fields)
    }
}

#[async_trait]
impl MailTransport for NotifyTransport {
    fn name(&self) -> &'static str {
        "notify"
    }

    async fn send(&self, email: &Email) -> Result<Delivery, TransportError> {
        let request = EmailRequest {
            email_address: &email.to_address,
            template_id: &self.template_id,
            personalisation: Self::personalisation(email),
            reference: email.id.to_string(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("ApiKey-v1 {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TransportError::Rejected {
                status_code: i32::from(status.as_u16()),
                message,
            });
        }

        // an unreadable body after a 2xx still means the message was accepted
        let reference = response
            .json::<EmailResponse>()
            .await
            .ok()
            .and_then(|body| body.id);

        Ok(Delivery {
            status_code: Some(i32::from(status.as_u16())),
            reference,
        })
    }
}
