//! Public transport news from [Zdopravy.cz](https://zdopravy.cz).
//!
//! The feed covers all of Czechia; only entries tagged `Praha 3` are kept.

use super::{Collector, CrawlRequest, Handled, Stage};
use crate::error::ParseError;
use crate::http::{FetchRequest, FetchedResponse, page_ttl};
use crate::models::RawItem;
use crate::utils::html_to_text;
use feed_rs::model::Entry;
use serde_json::json;

pub const FEED_URL: &str = "https://zdopravy.cz/feed/";

const DISTRICT_TAG: &str = "Praha 3";

/// Site-navigation category attached to most entries.
const IGNORED_TAG: &str = "seznam";

#[derive(Debug, Clone, Copy)]
pub struct Zdopravy;

fn entry_tags(entry: &Entry) -> Vec<String> {
    entry
        .categories
        .iter()
        .map(|c| c.label.clone().unwrap_or_else(|| c.term.clone()))
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty() && tag != IGNORED_TAG)
        .collect()
}

fn parse_entry(entry: &Entry, tags: Vec<String>) -> Result<RawItem, ParseError> {
    let title = entry
        .title
        .as_ref()
        .map(|t| t.content.trim().to_string())
        .ok_or(ParseError::Missing("entry title"))?;
    let link = entry
        .links
        .first()
        .map(|l| l.href.trim().to_string())
        .ok_or(ParseError::Missing("entry link"))?;
    let published_at = entry
        .published
        .or(entry.updated)
        .ok_or(ParseError::Missing("entry date"))?;
    let lead = entry
        .summary
        .as_ref()
        .map(|s| html_to_text(&s.content))
        .filter(|lead| !lead.is_empty());

    let mut item = RawItem::new();
    item.insert("title".into(), json!(title));
    item.insert("lead".into(), json!(lead));
    item.insert("url".into(), json!(link));
    item.insert("tags".into(), json!(tags));
    item.insert("published_at".into(), json!(published_at.to_rfc3339()));
    item.insert("lang".into(), json!("cs"));
    Ok(item)
}

impl Collector for Zdopravy {
    fn name(&self) -> &'static str {
        "zdopravy"
    }

    fn seeds(&self) -> Vec<CrawlRequest> {
        vec![CrawlRequest::new(
            FetchRequest::get(FEED_URL).cache_for(page_ttl()),
            Stage::Index,
        )]
    }

    fn handle(
        &self,
        _request: &CrawlRequest,
        response: &FetchedResponse,
    ) -> Result<Handled, ParseError> {
        let feed = feed_rs::parser::parse(response.body.as_slice())?;
        let items = feed
            .entries
            .iter()
            .filter_map(|entry| {
                let tags = entry_tags(entry);
                tags.iter()
                    .any(|tag| tag == DISTRICT_TAG)
                    .then(|| parse_entry(entry, tags))
            })
            .collect();
        Ok(Handled {
            items,
            follow: vec![],
        })
    }
}
