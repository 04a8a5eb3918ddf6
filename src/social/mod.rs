//! Cross-posting new articles to a social account.
//!
//! Nothing is stored locally. Which articles were already announced is
//! reconstructed each run from the account's own recent posts: every
//! outbound link in their rendered content counts as posted.
//!
//! # Flow
//!
//! 1. [`SocialClient::verify_credentials`] resolves the account
//! 2. [`recent_statuses`] pages back through the account's posts up to a window
//! 3. [`posted_urls`] extracts the Posted-URL set
//! 4. [`unposted`] keeps the rest, oldest first
//! 5. [`announce`] posts up to `limit` of them, one failure at a time
//!
//! # Submodules
//!
//! - [`mastodon`]: the HTTP client for Mastodon-compatible servers

use crate::error::PublishError;
use crate::models::{Article, ImagePayload};
use crate::pipeline::{SortOrder, sort_articles};
use crate::utils::hashtag;
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

pub mod mastodon;

/// Largest page the statuses endpoint serves.
pub const MAX_PAGE: usize = 40;

static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid selector"));

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Account {
    pub id: String,
    #[serde(default)]
    pub acct: String,
}

/// A post as returned by the platform. `content` is rendered HTML.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Status {
    pub id: String,
    pub account: Account,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub reblog: Option<Box<Status>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaAttachment {
    pub id: String,
}

/// A post to be created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewStatus {
    pub status: String,
    pub language: String,
    pub visibility: String,
    pub media_ids: Vec<String>,
    /// Sent as the `Idempotency-Key` header, not in the body.
    #[serde(skip)]
    pub idempotency_key: String,
}

/// Trait for async access to one social account.
pub trait SocialClient {
    async fn verify_credentials(&self) -> Result<Account, PublishError>;

    /// One page of the account's posts, newest first, older than `max_id`.
    async fn account_statuses(
        &self,
        account_id: &str,
        max_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Status>, PublishError>;

    async fn upload_media(&self, image: &ImagePayload) -> Result<MediaAttachment, PublishError>;

    async fn post_status(&self, status: &NewStatus) -> Result<Status, PublishError>;
}

/// Settings for one cross-posting run.
#[derive(Debug, Clone)]
pub struct SocialSettings {
    /// Base URL of the server; links to it are never article links.
    pub server_url: Url,
    /// Hashtags appended to every post, without the `#`.
    pub location_tags: Vec<String>,
    /// How many of the account's own recent posts to inspect.
    pub posts_window: usize,
    /// Maximum posts per run.
    pub limit: usize,
}

/// Fetch up to `window` of the account's most recent posts.
#[instrument(level = "info", skip(client))]
pub async fn recent_statuses<C: SocialClient>(
    client: &C,
    account_id: &str,
    window: usize,
) -> Result<Vec<Status>, PublishError> {
    let mut statuses: Vec<Status> = Vec::new();
    while statuses.len() < window {
        let limit = (window - statuses.len()).min(MAX_PAGE);
        let max_id = statuses.last().map(|s| s.id.clone());
        let page = client
            .account_statuses(account_id, max_id.as_deref(), limit)
            .await?;
        debug!(count = page.len(), ?max_id, "Fetched statuses page");
        if page.is_empty() {
            break;
        }
        statuses.extend(page);
    }
    statuses.truncate(window);
    info!(count = statuses.len(), "Inspected recent statuses");
    Ok(statuses)
}

/// Article links referenced by the account's own posts.
///
/// Boosts, posts by other accounts, and links back to the server itself
/// (mentions, hashtags) are ignored.
pub fn posted_urls(statuses: &[Status], account_id: &str, server_url: &Url) -> HashSet<Url> {
    let server_host = server_url.host_str();
    statuses
        .iter()
        .filter(|status| status.account.id == account_id && status.reblog.is_none())
        .flat_map(|status| {
            let fragment = Html::parse_fragment(&status.content);
            let links: Vec<Url> = fragment
                .select(&ANCHOR)
                .filter_map(|a| a.value().attr("href"))
                .filter_map(|href| Url::parse(href).ok())
                .collect();
            links
        })
        .filter(|url| url.host_str() != server_host)
        .collect()
}

/// Articles whose URL is not in `posted`, oldest first.
pub fn unposted(articles: &[Article], posted: &HashSet<Url>) -> Vec<Article> {
    let fresh: Vec<Article> = articles
        .iter()
        .filter(|article| !posted.contains(&article.url))
        .cloned()
        .collect();
    sort_articles(&fresh, SortOrder::Ascending)
}

/// Post text: title, dash, URL, a blank line, then hashtags.
pub fn compose_status_text(article: &Article, location_tags: &[String]) -> String {
    let hashtags = article
        .tags
        .iter()
        .chain(location_tags)
        .map(|tag| hashtag(tag))
        .filter(|tag| tag.len() > 1)
        .unique()
        .join(" ");
    format!("{} — {}\n\n{}", article.title, article.url, hashtags)
}

/// Stable key so a retried post is not created twice.
pub fn idempotency_key(url: &Url) -> String {
    format!("{:x}", Sha256::digest(url.as_str().as_bytes()))
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AnnounceReport {
    pub posted: usize,
    pub failed: usize,
}

async fn announce_one<C: SocialClient>(
    client: &C,
    article: &Article,
    image: Option<&ImagePayload>,
    location_tags: &[String],
) -> Result<Status, PublishError> {
    let media_ids = match image {
        Some(image) => vec![client.upload_media(image).await?.id],
        None => vec![],
    };
    let status = NewStatus {
        status: compose_status_text(article, location_tags),
        language: article.lang.to_string(),
        visibility: "public".to_string(),
        media_ids,
        idempotency_key: idempotency_key(&article.url),
    };
    client.post_status(&status).await
}

/// Post up to `limit` candidates in order.
///
/// A failed post is logged and counts against the limit; the next candidate
/// is still attempted.
#[instrument(level = "info", skip_all, fields(candidates = candidates.len(), limit = limit))]
pub async fn announce<C: SocialClient>(
    client: &C,
    candidates: &[Article],
    images: &HashMap<Url, ImagePayload>,
    location_tags: &[String],
    limit: usize,
) -> AnnounceReport {
    let mut report = AnnounceReport::default();
    for article in candidates.iter().take(limit) {
        let image = article.image_url.as_ref().and_then(|url| images.get(url));
        match announce_one(client, article, image, location_tags).await {
            Ok(status) => {
                info!(url = %article.url, status_id = %status.id, "Posted article");
                report.posted += 1;
            }
            Err(e) => {
                error!(url = %article.url, error = %e, "Posting failed; continuing");
                report.failed += 1;
            }
        }
    }
    report
}

/// Reconcile against the account's history and post what is new.
///
/// Errors before posting starts (credentials, history) fail the whole step.
pub async fn cross_post<C: SocialClient>(
    client: &C,
    articles: &[Article],
    images: &HashMap<Url, ImagePayload>,
    settings: &SocialSettings,
) -> Result<AnnounceReport, PublishError> {
    let account = client.verify_credentials().await?;
    info!(account = %account.acct, "Connected to social account");

    let statuses = recent_statuses(client, &account.id, settings.posts_window).await?;
    let posted = posted_urls(&statuses, &account.id, &settings.server_url);
    let candidates = unposted(articles, &posted);
    info!(
        posted = posted.len(),
        candidates = candidates.len(),
        "Figured out which articles to post"
    );
    if candidates.is_empty() {
        warn!("Nothing new to post");
    }

    Ok(announce(client, &candidates, images, &settings.location_tags, settings.limit).await)
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory [`SocialClient`] for tests.

    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeSocial {
        pub account_id: String,
        pub history: Vec<Status>,
        /// Article URLs whose post attempt fails.
        pub failing: Vec<String>,
        pub uploads: Mutex<Vec<String>>,
        pub posts: Mutex<Vec<NewStatus>>,
        pub pages: Mutex<Vec<(Option<String>, usize)>>,
    }

    pub fn status(id: &str, account_id: &str, content: &str) -> Status {
        Status {
            id: id.to_string(),
            account: Account {
                id: account_id.to_string(),
                acct: "p3news".to_string(),
            },
            content: content.to_string(),
            reblog: None,
        }
    }

    impl SocialClient for FakeSocial {
        async fn verify_credentials(&self) -> Result<Account, PublishError> {
            Ok(Account {
                id: self.account_id.clone(),
                acct: "p3news".to_string(),
            })
        }

        async fn account_statuses(
            &self,
            _account_id: &str,
            max_id: Option<&str>,
            limit: usize,
        ) -> Result<Vec<Status>, PublishError> {
            self.pages
                .lock()
                .unwrap()
                .push((max_id.map(str::to_string), limit));
            let start = match max_id {
                Some(id) => self
                    .history
                    .iter()
                    .position(|s| s.id == id)
                    .map_or(self.history.len(), |i| i + 1),
                None => 0,
            };
            Ok(self.history.iter().skip(start).take(limit).cloned().collect())
        }

        async fn upload_media(&self, image: &ImagePayload) -> Result<MediaAttachment, PublishError> {
            let mut uploads = self.uploads.lock().unwrap();
            uploads.push(image.content_type.clone());
            Ok(MediaAttachment {
                id: format!("media-{}", uploads.len()),
            })
        }

        async fn post_status(&self, new: &NewStatus) -> Result<Status, PublishError> {
            if self.failing.iter().any(|url| new.status.contains(url.as_str())) {
                return Err(PublishError::SocialStatus {
                    status: 429,
                    body: "rate limited".to_string(),
                });
            }
            let mut posts = self.posts.lock().unwrap();
            posts.push(new.clone());
            Ok(status(&format!("new-{}", posts.len()), &self.account_id, &new.status))
        }
    }
}
