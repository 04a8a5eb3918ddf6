//! Community news from [Nová Trojka](https://www.nova-trojka.cz), via its RSS feed.
//!
//! The feed gives title, link, date, and full content (the lead is its first
//! paragraph). The article page is fetched only for its `og:image`.

use super::{Collector, CrawlRequest, Handled, Stage, merge_seed, og_image};
use crate::error::ParseError;
use crate::http::{FetchRequest, FetchedResponse, page_ttl};
use crate::models::RawItem;
use crate::utils::element_text;
use feed_rs::model::Entry;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::json;

pub const FEED_URL: &str = "https://www.nova-trojka.cz/index.php/feed/";

const TAGS: [&str; 2] = ["Nová Trojka", "rodina"];

static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").expect("valid selector"));

#[derive(Debug, Clone, Copy)]
pub struct NovaTrojka;

fn parse_entry(entry: &Entry) -> Result<CrawlRequest, ParseError> {
    let title = entry
        .title
        .as_ref()
        .map(|t| t.content.trim().to_string())
        .ok_or(ParseError::Missing("entry title"))?;
    let link = entry
        .links
        .first()
        .map(|l| l.href.clone())
        .ok_or(ParseError::Missing("entry link"))?;
    let published_at = entry.published.ok_or(ParseError::Missing("entry date"))?;
    let content = entry
        .content
        .as_ref()
        .and_then(|c| c.body.as_deref())
        .ok_or(ParseError::Missing("entry content"))?;
    let lead = Html::parse_fragment(content)
        .select(&PARAGRAPH)
        .next()
        .map(element_text)
        .ok_or(ParseError::Missing("first paragraph"))?;

    let mut seed = RawItem::new();
    seed.insert("title".into(), json!(title));
    seed.insert("lead".into(), json!(lead));
    seed.insert("url".into(), json!(link));
    seed.insert("tags".into(), json!(TAGS));
    seed.insert("published_at".into(), json!(published_at.fixed_offset().to_rfc3339()));
    seed.insert("lang".into(), json!("cs"));

    Ok(CrawlRequest::new(FetchRequest::get(link).cache_for(page_ttl()), Stage::Detail).with_seed(seed))
}

impl Collector for NovaTrojka {
    fn name(&self) -> &'static str {
        "novatrojka"
    }

    fn seeds(&self) -> Vec<CrawlRequest> {
        vec![CrawlRequest::new(
            FetchRequest::get(FEED_URL).cache_for(page_ttl()),
            Stage::Index,
        )]
    }

    fn handle(
        &self,
        request: &CrawlRequest,
        response: &FetchedResponse,
    ) -> Result<Handled, ParseError> {
        match request.stage {
            Stage::Index => {
                let feed = feed_rs::parser::parse(response.body.as_slice())?;
                let mut handled = Handled::default();
                for entry in &feed.entries {
                    match parse_entry(entry) {
                        Ok(follow) => handled.follow.push(follow),
                        Err(e) => handled.items.push(Err(e)),
                    }
                }
                Ok(handled)
            }
            Stage::Detail | Stage::Api => {
                let document = Html::parse_document(&response.text());
                let mut detail = RawItem::new();
                detail.insert("image_url".into(), json!(og_image(&document)));
                Ok(Handled {
                    items: vec![Ok(merge_seed(&request.seed, detail))],
                    follow: vec![],
                })
            }
        }
    }
}
