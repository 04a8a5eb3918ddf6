//! HTTP client for the Mastodon API.
//!
//! Only the four calls the cross-poster needs are implemented. Every request
//! carries the bearer token and the configured User-Agent.

use super::{Account, MediaAttachment, NewStatus, SocialClient, Status};
use crate::error::PublishError;
use crate::models::ImagePayload;
use crate::utils::truncate_for_log;
use reqwest::multipart::{Form, Part};
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tracing::{debug, instrument, warn};
use url::Url;

pub struct MastodonClient {
    client: reqwest::Client,
    base: Url,
    access_token: String,
}

impl MastodonClient {
    pub fn new(base: Url, access_token: &str, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(StdDuration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            base,
            access_token: access_token.to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base.as_str().trim_end_matches('/'), path)
    }

    /// Turn a non-2xx response into [`PublishError::SocialStatus`].
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, PublishError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!(
            status = status.as_u16(),
            body_preview = %truncate_for_log(&body, 300),
            "Social API call failed"
        );
        Err(PublishError::SocialStatus {
            status: status.as_u16(),
            body,
        })
    }
}

impl fmt::Debug for MastodonClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MastodonClient")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

impl SocialClient for MastodonClient {
    #[instrument(level = "info", skip_all)]
    async fn verify_credentials(&self) -> Result<Account, PublishError> {
        let response = self
            .client
            .get(self.endpoint("api/v1/accounts/verify_credentials"))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    #[instrument(level = "info", skip(self))]
    async fn account_statuses(
        &self,
        account_id: &str,
        max_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Status>, PublishError> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(max_id) = max_id {
            query.push(("max_id", max_id.to_string()));
        }
        let response = self
            .client
            .get(self.endpoint(&format!("api/v1/accounts/{account_id}/statuses")))
            .bearer_auth(&self.access_token)
            .query(&query)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    #[instrument(level = "info", skip_all, fields(content_type = %image.content_type, bytes = image.bytes.len()))]
    async fn upload_media(&self, image: &ImagePayload) -> Result<MediaAttachment, PublishError> {
        let t0 = Instant::now();
        let part = Part::bytes(image.bytes.clone())
            .file_name("image")
            .mime_str(&image.content_type)?;
        let response = self
            .client
            .post(self.endpoint("api/v2/media"))
            .bearer_auth(&self.access_token)
            .multipart(Form::new().part("file", part))
            .send()
            .await?;
        let media: MediaAttachment = Self::check(response).await?.json().await?;
        debug!(media_id = %media.id, elapsed_ms = t0.elapsed().as_millis() as u64, "Uploaded media");
        Ok(media)
    }

    #[instrument(level = "info", skip_all, fields(language = %status.language, media = status.media_ids.len()))]
    async fn post_status(&self, status: &NewStatus) -> Result<Status, PublishError> {
        let response = self
            .client
            .post(self.endpoint("api/v1/statuses"))
            .bearer_auth(&self.access_token)
            .header("Idempotency-Key", status.idempotency_key.as_str())
            .json(status)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }
}
