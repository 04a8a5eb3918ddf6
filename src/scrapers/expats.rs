//! English-language news about Prague 3 from [expats.cz](https://www.expats.cz).
//!
//! Two tag listings are crawled for article links; everything else comes
//! from the article page.

use super::{Collector, CrawlRequest, Handled, Stage};
use crate::error::ParseError;
use crate::http::{FetchRequest, FetchedResponse, page_ttl};
use crate::models::RawItem;
use crate::utils::{element_text, localize_prague};
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::json;
use url::Url;

const INDEX_URLS: [&str; 2] = [
    "https://www.expats.cz/czech-news/tag/prague-3",
    "https://www.expats.cz/czech-news/tag/zizkov",
];

static ARTICLE_LINK: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".top.title h3 a, .content article h3 a").expect("valid selector")
});
static CREATED: Lazy<Selector> = Lazy::new(|| Selector::parse(".about .created").expect("valid selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse(".title h1").expect("valid selector"));
static AUTHOR: Lazy<Selector> = Lazy::new(|| Selector::parse(".about .written-by a").expect("valid selector"));
static LEAD: Lazy<Selector> = Lazy::new(|| Selector::parse(".title h3").expect("valid selector"));
static IMAGE: Lazy<Selector> = Lazy::new(|| Selector::parse(".featured-image img").expect("valid selector"));
static CATEGORY: Lazy<Selector> = Lazy::new(|| Selector::parse(".categories a").expect("valid selector"));

#[derive(Debug, Clone, Copy)]
pub struct Expats;

fn parse_index(response: &FetchedResponse) -> Result<Handled, ParseError> {
    let base = Url::parse(&response.url)?;
    let document = Html::parse_document(&response.text());
    let mut handled = Handled::default();
    for link in document.select(&ARTICLE_LINK) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        match base.join(href) {
            Ok(url) => handled.follow.push(CrawlRequest::new(
                FetchRequest::get(url.as_str()).cache_for(page_ttl()),
                Stage::Detail,
            )),
            Err(e) => handled.items.push(Err(e.into())),
        }
    }
    Ok(handled)
}

fn parse_article(request: &CrawlRequest, response: &FetchedResponse) -> Result<RawItem, ParseError> {
    let document = Html::parse_document(&response.text());
    let text_of = |selector: &Selector, what: &'static str| {
        document
            .select(selector)
            .next()
            .map(element_text)
            .ok_or(ParseError::Missing(what))
    };

    let created = text_of(&CREATED, "publication date")?;
    let naive = NaiveDateTime::parse_from_str(&created, "Published on %d.%m.%Y %H:%M:%S").map_err(|e| {
        ParseError::Timestamp {
            value: created.clone(),
            reason: e.to_string(),
        }
    })?;
    let published_at = localize_prague(naive)?;
    let image_src = document
        .select(&IMAGE)
        .next()
        .and_then(|img| img.value().attr("src"))
        .ok_or(ParseError::Missing("featured image"))?;
    let image_url = Url::parse(&request.request.url)?.join(image_src)?;

    let mut item = RawItem::new();
    item.insert("title".into(), json!(text_of(&TITLE, "title")?));
    item.insert("author".into(), json!(text_of(&AUTHOR, "author")?));
    item.insert("lead".into(), json!(text_of(&LEAD, "lead")?));
    item.insert("image_url".into(), json!(image_url.to_string()));
    item.insert("url".into(), json!(request.request.url));
    item.insert(
        "tags".into(),
        json!(document.select(&CATEGORY).map(element_text).collect::<Vec<_>>()),
    );
    item.insert("published_at".into(), json!(published_at.to_rfc3339()));
    item.insert("lang".into(), json!("en"));
    Ok(item)
}

impl Collector for Expats {
    fn name(&self) -> &'static str {
        "expats"
    }

    fn seeds(&self) -> Vec<CrawlRequest> {
        INDEX_URLS
            .iter()
            .map(|url| CrawlRequest::new(FetchRequest::get(*url).cache_for(page_ttl()), Stage::Index))
            .collect()
    }

    fn handle(
        &self,
        request: &CrawlRequest,
        response: &FetchedResponse,
    ) -> Result<Handled, ParseError> {
        match request.stage {
            Stage::Index => parse_index(response),
            Stage::Detail | Stage::Api => Ok(Handled {
                items: vec![parse_article(request, response)],
                follow: vec![],
            }),
        }
    }
}
