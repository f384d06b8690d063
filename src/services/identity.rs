//! Identity-provider administration client.
//!
//! Authenticates with client credentials and caches the access token until
//! shortly before it expires.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::IdentityConfig;
use crate::error::{AppError, AppResult};
use crate::external::{build_http_client, join_url};

const SERVICE: &str = "identity";
/// Refresh this long before the provider says the token expires
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);
/// Longest a token is cached, whatever the provider reports
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

#[async_trait]
pub trait IdentityAdmin: Send + Sync {
    /// Deletes the user. A user that is already gone counts as deleted.
    async fn delete_user(&self, user_id: Uuid) -> AppResult<()>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    60
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

pub struct KeycloakAdmin {
    client: reqwest::Client,
    config: IdentityConfig,
    token: Mutex<Option<CachedToken>>,
}

impl KeycloakAdmin {
    pub fn new(config: IdentityConfig) -> AppResult<Self> {
        Ok(Self {
            client: build_http_client(SERVICE, config.timeout_secs)?,
            config,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> AppResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.value.clone());
        }

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        let response = self
            .client
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| external(anyhow::Error::from(e).context("token request failed")))?;

        if !response.status().is_success() {
            return Err(AppError::external(
                SERVICE,
                format!("token request returned {}", response.status()),
            ));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| external(anyhow::Error::from(e).context("malformed token response")))?;

        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: refresh_deadline(Instant::now(), token.expires_in),
        });
        tracing::debug!(expires_in = token.expires_in, "Identity provider token refreshed");
        Ok(token.access_token)
    }
}

fn refresh_deadline(now: Instant, expires_in: u64) -> Instant {
    let lifetime = Duration::from_secs(expires_in)
        .min(MAX_TOKEN_LIFETIME)
        .saturating_sub(TOKEN_EXPIRY_MARGIN);
    now + lifetime
}

fn external(source: anyhow::Error) -> AppError {
    AppError::External {
        service: SERVICE.to_string(),
        source,
    }
}

#[async_trait]
impl IdentityAdmin for KeycloakAdmin {
    async fn delete_user(&self, user_id: Uuid) -> AppResult<()> {
        let token = self.access_token().await?;
        let url = join_url(&self.config.admin_url, &format!("users/{user_id}"));

        let response = self
            .client
            .delete(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| external(anyhow::Error::from(e).context("delete user request failed")))?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            if status == reqwest::StatusCode::UNAUTHORIZED {
                *self.token.lock().await = None;
            }
            Err(AppError::external(
                SERVICE,
                format!("delete user {user_id} returned {status}"),
            ))
        }
    }
}
