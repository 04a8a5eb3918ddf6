//! Municipal announcements from [Munipolis](https://praha3.munipolis.cz).
//!
//! The public home page embeds an API token and a CSRF token. Both are
//! scraped out of it and used for one POST to the timeline API, which
//! returns the latest news and calendar events as JSON.

use super::{Collector, CrawlRequest, Handled, Stage};
use crate::error::ParseError;
use crate::http::{FetchRequest, FetchedResponse};
use crate::models::RawItem;
use crate::utils::{localize_prague, upcase};
use chrono::{DateTime, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

const HOME_URL: &str = "https://praha3.munipolis.cz/";
const TIMELINE_URL: &str = "https://api.munipolis.com/api/timeline";
const ORIGIN: &str = "https://praha3.munipolis.cz";
const CITY_ID: u32 = 3209;
const PER_PAGE: u32 = 50;
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:139.0) Gecko/20100101 Firefox/139.0";

static API_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r#""mrApiToken":"([^"]+)""#).expect("valid regex"));
static CSRF_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r#""csrfToken":"([^"]+)""#).expect("valid regex"));
static SALUTATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(vážení|milí)\s*sousedé\s*,\s*").expect("valid regex"));

#[derive(Debug, Clone, Copy)]
pub struct Munipolis;

#[derive(Debug, Deserialize)]
struct Timeline {
    data: Vec<Post>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Post {
    title: String,
    #[serde(default)]
    description: Option<String>,
    share_url: String,
    publish_at: String,
    #[serde(default)]
    image: Option<PostImage>,
}

#[derive(Debug, Deserialize)]
struct PostImage {
    data: PostImageData,
}

#[derive(Debug, Deserialize)]
struct PostImageData {
    path: String,
}

fn capture(re: &Regex, text: &str, what: &'static str) -> Result<String, ParseError> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or(ParseError::Missing(what))
}

fn timeline_request(home_page: &str) -> Result<CrawlRequest, ParseError> {
    let api_token = capture(&API_TOKEN, home_page, "mrApiToken")?;
    let csrf_token = capture(&CSRF_TOKEN, home_page, "csrfToken")?;
    let body = json!({
        "filter": {
            "types": ["news", "calendarEvent"],
            "cityId": [CITY_ID],
        },
        "include": ["mrCity", "files", "poll", "images", "lastComment"],
        "order": ["isPinned", "-publishAt"],
        "cursor": null,
        "perPage": PER_PAGE,
        "includeExpiredPosts": false,
    });

    let request = FetchRequest::post(TIMELINE_URL, body.to_string())
        .header("Authorization", format!("Bearer {api_token}"))
        .header("Accept", "application/json")
        .header("Content-Type", "application/json")
        .header("X-Requested-With", "XMLHttpRequest")
        .header("X-CSRF-TOKEN", csrf_token)
        .header("X-HTTP-METHOD-OVERRIDE", "GET")
        .header("pagination", "cursor")
        .header("Origin", ORIGIN)
        .header("Referer", HOME_URL)
        .header("User-Agent", BROWSER_USER_AGENT);
    Ok(CrawlRequest::new(request, Stage::Api))
}

/// First line of a post description, without the greeting.
fn lead_from_description(description: &str) -> Option<String> {
    let text = description.trim();
    if text.is_empty() {
        return None;
    }
    let text = SALUTATION.replace(text, "");
    let first_line = text.lines().next().unwrap_or_default().trim();
    if first_line.is_empty() {
        None
    } else {
        Some(upcase(first_line))
    }
}

/// `publishAt` is Prague wall-clock time whatever offset it carries.
fn publish_time(value: &str) -> Result<String, ParseError> {
    let naive = DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.naive_local())
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|e| ParseError::Timestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })?;
    Ok(localize_prague(naive)?.to_rfc3339())
}

fn post_item(post: Post) -> Result<RawItem, ParseError> {
    let mut item = RawItem::new();
    item.insert("published_at".into(), json!(publish_time(&post.publish_at)?));
    item.insert(
        "lead".into(),
        json!(post.description.as_deref().and_then(lead_from_description)),
    );
    item.insert("title".into(), json!(post.title));
    item.insert("url".into(), json!(post.share_url));
    item.insert("image_url".into(), json!(post.image.map(|i| i.data.path)));
    item.insert("tags".into(), json!([]));
    item.insert("lang".into(), json!("cs"));
    Ok(item)
}

impl Collector for Munipolis {
    fn name(&self) -> &'static str {
        "munipolis"
    }

    fn seeds(&self) -> Vec<CrawlRequest> {
        vec![CrawlRequest::new(FetchRequest::get(HOME_URL), Stage::Index)]
    }

    fn handle(
        &self,
        request: &CrawlRequest,
        response: &FetchedResponse,
    ) -> Result<Handled, ParseError> {
        match request.stage {
            Stage::Index => Ok(Handled {
                items: vec![],
                follow: vec![timeline_request(&response.text())?],
            }),
            Stage::Api | Stage::Detail => {
                let timeline: Timeline = serde_json::from_slice(&response.body)?;
                Ok(Handled {
                    items: timeline.data.into_iter().map(post_item).collect(),
                    follow: vec![],
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use crate::http::testing::{FakeFetch, ok};
    use crate::models::Article;
    use crate::scrapers::crawl;

    const HOME: &str = r#"<script>window.__CONFIG__ = {"mrApiToken":"tok-123","csrfToken":"csrf-456","locale":"cs"};</script>"#;

    const TIMELINE: &str = r#"{
  "data": [
    {
      "title": "Svoz bioodpadu",
      "description": "Vážení sousedé, svoz bioodpadu začíná v dubnu.\nDalší informace níže.",
      "shareUrl": "https://praha3.munipolis.cz/zpravy/svoz-bioodpadu",
      "publishAt": "2024-07-03 08:30:00",
      "image": {"data": {"path": "https://cdn.munipolis.com/img/bio.jpg"}}
    },
    {
      "title": "Koncert v parku",
      "description": "   ",
      "shareUrl": "https://praha3.munipolis.cz/akce/koncert",
      "publishAt": "2024-01-03T18:00:00",
      "image": null
    },
    {
      "title": "Rozbitý příspěvek",
      "description": "x",
      "shareUrl": "https://praha3.munipolis.cz/x",
      "publishAt": "zítra"
    }
  ]
}"#;

    #[test]
    fn test_home_page_yields_authenticated_timeline_post() {
        let seeds = Munipolis.seeds();
        let handled = Munipolis
            .handle(&seeds[0], &ok(HOME_URL, HOME.as_bytes(), &[]))
            .unwrap();

        assert_eq!(handled.follow.len(), 1);
        let api = &handled.follow[0];
        assert_eq!(api.stage, Stage::Api);
        assert_eq!(api.request.method, Method::Post);
        assert_eq!(api.request.url, TIMELINE_URL);
        assert!(
            api.request
                .headers
                .contains(&("Authorization".to_string(), "Bearer tok-123".to_string()))
        );
        assert!(
            api.request
                .headers
                .contains(&("X-CSRF-TOKEN".to_string(), "csrf-456".to_string()))
        );
        let body: serde_json::Value =
            serde_json::from_str(api.request.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["filter"]["cityId"], json!([3209]));
        assert_eq!(body["perPage"], json!(50));
        assert_eq!(body["cursor"], json!(null));
    }

    #[test]
    fn test_home_page_without_token_is_an_error() {
        let seeds = Munipolis.seeds();
        let err = Munipolis
            .handle(&seeds[0], &ok(HOME_URL, b"<html></html>", &[]))
            .unwrap_err();
        assert!(matches!(err, ParseError::Missing("mrApiToken")));
    }

    #[test]
    fn test_lead_from_description() {
        assert_eq!(
            lead_from_description("Milí sousedé,\npozvánka na trhy").as_deref(),
            Some("Pozvánka na trhy")
        );
        assert_eq!(
            lead_from_description("VÁŽENÍ SOUSEDÉ, opravujeme chodník.\nDíky.").as_deref(),
            Some("Opravujeme chodník.")
        );
        assert_eq!(lead_from_description("  "), None);
    }

    #[tokio::test]
    async fn test_crawl_maps_timeline_posts() {
        let fake = FakeFetch::new()
            .page(HOME_URL, HOME)
            .page(TIMELINE_URL, TIMELINE);

        let items = crawl(&Munipolis, &fake).await.unwrap();

        assert_eq!(items.len(), 2);
        let bio = Article::from_raw(items[0].clone()).unwrap();
        assert_eq!(bio.lead.as_deref(), Some("Svoz bioodpadu začíná v dubnu."));
        assert_eq!(bio.published_at.to_rfc3339(), "2024-07-03T08:30:00+02:00");
        assert_eq!(
            bio.image_url.unwrap().as_str(),
            "https://cdn.munipolis.com/img/bio.jpg"
        );
        assert!(bio.tags.is_empty());

        let concert = Article::from_raw(items[1].clone()).unwrap();
        assert_eq!(concert.lead, None);
        assert_eq!(concert.image_url, None);
        assert_eq!(concert.published_at.to_rfc3339(), "2024-01-03T18:00:00+01:00");
    }
}
