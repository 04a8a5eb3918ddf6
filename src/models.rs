//! Data models shared by every stage of the pipeline.
//!
//! - [`RawItem`]: the loosely-typed mapping a collector emits, persisted to the
//!   intermediate JSON file
//! - [`Article`]: the validated, immutable record the rest of the pipeline
//!   consumes
//! - [`ImagePayload`]: an article image as fetched, used for feed enclosures
//!   and media uploads

use crate::error::ValidationError;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// A raw item as produced by a collector.
///
/// Values are primitive JSON (strings, lists, null). Timestamps are ISO-8601
/// strings with an explicit offset.
pub type RawItem = serde_json::Map<String, serde_json::Value>;

/// Language of an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Cs,
    En,
}

impl Lang {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lang::Cs => "cs",
            Lang::En => "en",
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized news article.
///
/// `url` is the identity key across the whole pipeline. `published_at`
/// keeps the offset the source published with; ordering compares the
/// absolute instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Article {
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub lead: Option<String>,
    pub url: Url,
    #[serde(default)]
    pub image_url: Option<Url>,
    pub tags: Vec<String>,
    pub published_at: DateTime<FixedOffset>,
    pub lang: Lang,
}

impl Article {
    /// Validate a raw item against the article schema.
    ///
    /// Unknown keys, missing required fields, relative or non-http(s) URLs,
    /// naive timestamps and unrecognized languages are all rejected.
    pub fn from_raw(raw: RawItem) -> Result<Self, ValidationError> {
        let url = raw
            .get("url")
            .and_then(|v| v.as_str())
            .unwrap_or("<no url>")
            .to_string();
        let article: Article = serde_json::from_value(serde_json::Value::Object(raw))
            .map_err(|source| ValidationError::Schema {
                url: url.clone(),
                source,
            })?;
        if article.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle { url });
        }
        if !is_web(&article.url) {
            return Err(ValidationError::NotWeb { url, field: "url" });
        }
        if article.image_url.as_ref().is_some_and(|image| !is_web(image)) {
            return Err(ValidationError::NotWeb {
                url,
                field: "image_url",
            });
        }
        Ok(article)
    }
}

fn is_web(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// An article image as fetched over HTTP.
///
/// `content_type` and `length` come from the image response, never from
/// guesswork.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePayload {
    pub content_type: String,
    pub length: u64,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawItem {
        value.as_object().cloned().unwrap()
    }

    fn valid() -> serde_json::Value {
        json!({
            "title": "Nové lavičky v parku",
            "lead": "Radnice osadila dvacet nových laviček.",
            "url": "https://www.praha3.cz/aktualne-z-trojky/zpravy/lavicky/",
            "image_url": "https://www.praha3.cz/getFile/id:1/lavicky.jpg",
            "tags": ["Životní prostředí"],
            "published_at": "2024-01-03T00:00:00+01:00",
            "lang": "cs",
        })
    }

    #[test]
    fn test_from_raw_accepts_valid_item() {
        let article = Article::from_raw(raw(valid())).unwrap();
        assert_eq!(article.title, "Nové lavičky v parku");
        assert_eq!(article.author, None);
        assert_eq!(article.lang, Lang::Cs);
        assert_eq!(article.published_at.offset().local_minus_utc(), 3600);
    }

    #[test]
    fn test_from_raw_rejects_unknown_lang() {
        let mut item = valid();
        item["lang"] = json!("de");
        let err = Article::from_raw(raw(item)).unwrap_err();
        assert!(matches!(err, ValidationError::Schema { .. }));
    }

    #[test]
    fn test_from_raw_rejects_missing_required_field() {
        let mut item = valid();
        item.as_object_mut().unwrap().remove("tags");
        assert!(Article::from_raw(raw(item)).is_err());
    }

    #[test]
    fn test_from_raw_rejects_naive_timestamp() {
        let mut item = valid();
        item["published_at"] = json!("2024-01-03T10:00:00");
        assert!(Article::from_raw(raw(item)).is_err());
    }

    #[test]
    fn test_from_raw_rejects_relative_url() {
        let mut item = valid();
        item["url"] = json!("/aktualne-z-trojky/zpravy/lavicky/");
        assert!(Article::from_raw(raw(item)).is_err());
    }

    #[test]
    fn test_from_raw_rejects_non_web_urls() {
        let mut item = valid();
        item["url"] = json!("mailto:radnice@praha3.cz");
        let err = Article::from_raw(raw(item)).unwrap_err();
        assert!(matches!(err, ValidationError::NotWeb { field: "url", .. }));

        let mut item = valid();
        item["image_url"] = json!("data:image/png;base64,AAAA");
        let err = Article::from_raw(raw(item)).unwrap_err();
        assert!(matches!(err, ValidationError::NotWeb { field: "image_url", .. }));

        let mut item = valid();
        item["url"] = json!("http://www.praha3.cz/zpravy/lavicky/");
        assert!(Article::from_raw(raw(item)).is_ok());
    }

    #[test]
    fn test_from_raw_rejects_unknown_field() {
        let mut item = valid();
        item["category"] = json!("news");
        assert!(Article::from_raw(raw(item)).is_err());
    }

    #[test]
    fn test_from_raw_rejects_blank_title() {
        let mut item = valid();
        item["title"] = json!("   ");
        let err = Article::from_raw(raw(item)).unwrap_err();
        assert!(matches!(err, ValidationError::EmptyTitle { .. }));
    }

    #[test]
    fn test_null_optionals_are_absent() {
        let mut item = valid();
        item["image_url"] = json!(null);
        item["lead"] = json!(null);
        let article = Article::from_raw(raw(item)).unwrap();
        assert!(article.image_url.is_none());
        assert!(article.lead.is_none());
    }

    #[test]
    fn test_lang_display() {
        assert_eq!(Lang::Cs.to_string(), "cs");
        assert_eq!(Lang::En.as_str(), "en");
    }
}
