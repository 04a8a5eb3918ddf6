//! Aggregation, ordering, and image enrichment of scraped articles.
//!
//! Raw items from every collector are validated into [`Article`]s and
//! deduplicated by URL ([`aggregate`]), ordered by publication instant
//! ([`sort_articles`]), and their images are fetched once for the feed and
//! the social posts ([`fetch_images`]).

use crate::error::ValidationError;
use crate::http::{Fetch, FetchRequest, FetchedResponse, image_ttl};
use crate::models::{Article, ImagePayload, RawItem};
use itertools::Itertools;
use std::collections::HashMap;
use tracing::{info, instrument, warn};
use url::Url;

/// What to do with a raw item that fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationPolicy {
    /// Log it and drop the item.
    #[default]
    Skip,
    /// Fail the whole run.
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Oldest first; posting order.
    Ascending,
    /// Newest first; feed order.
    Descending,
}

/// Validate raw items and drop duplicate URLs, keeping the first one seen.
pub fn aggregate(raw: Vec<RawItem>, policy: ValidationPolicy) -> Result<Vec<Article>, ValidationError> {
    let total = raw.len();
    let mut valid = Vec::with_capacity(total);
    for item in raw {
        match Article::from_raw(item) {
            Ok(article) => valid.push(article),
            Err(e) if policy == ValidationPolicy::Abort => return Err(e),
            Err(e) => warn!(error = %e, "Invalid item; skipping"),
        }
    }
    let invalid = total - valid.len();

    let articles: Vec<Article> = valid
        .into_iter()
        .unique_by(|article| article.url.clone())
        .collect();
    info!(
        count = articles.len(),
        invalid,
        duplicates = total - invalid - articles.len(),
        "Aggregated articles"
    );
    Ok(articles)
}

/// Order articles by the absolute instant they were published.
///
/// The sort is stable, so articles with equal timestamps keep their input
/// order in both directions.
pub fn sort_articles(articles: &[Article], order: SortOrder) -> Vec<Article> {
    let mut sorted = articles.to_vec();
    match order {
        SortOrder::Ascending => sorted.sort_by(|a, b| a.published_at.cmp(&b.published_at)),
        SortOrder::Descending => sorted.sort_by(|a, b| b.published_at.cmp(&a.published_at)),
    }
    sorted
}

/// Derive an image payload from a fetched image response.
///
/// Requires a `Content-Type`. The length is the `Content-Length` header when
/// present and valid, otherwise the number of bytes received.
pub fn image_payload(response: &FetchedResponse) -> Option<ImagePayload> {
    let content_type = response.header("content-type")?.trim().to_string();
    if content_type.is_empty() {
        return None;
    }
    let length = response
        .header("content-length")
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(response.body.len() as u64);
    Some(ImagePayload {
        content_type,
        length,
        bytes: response.body.clone(),
    })
}

/// Fetch the image of every article that has one.
///
/// Failed or unusable images are logged and left out; those articles get no
/// enclosure and no media attachment.
#[instrument(level = "info", skip_all, fields(articles = articles.len()))]
pub async fn fetch_images<F: Fetch>(articles: &[Article], fetcher: &F) -> HashMap<Url, ImagePayload> {
    let mut images = HashMap::new();
    for image_url in articles.iter().filter_map(|a| a.image_url.as_ref()).unique() {
        let request = FetchRequest::get(image_url.as_str()).cache_for(image_ttl());
        match fetcher.fetch(&request).await {
            Ok(response) => match image_payload(&response) {
                Some(payload) => {
                    images.insert(image_url.clone(), payload);
                }
                None => warn!(url = %image_url, "Image response has no content type; skipping"),
            },
            Err(e) => warn!(url = %image_url, error = %e, "Image fetch failed; skipping"),
        }
    }
    info!(count = images.len(), "Fetched images");
    images
}
