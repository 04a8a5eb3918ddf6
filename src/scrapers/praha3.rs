//! District government news from [praha3.cz](https://www.praha3.cz).
//!
//! The paged news index gives title, lead, date, and tags for each item.
//! Each item's detail page adds the author and the `og:image`. Dates are
//! day-precision (`3. 1. 2024`, or `dnes` for today) and are taken as local
//! midnight in Prague.

use super::{Collector, CrawlRequest, Handled, Stage, merge_seed, og_image};
use crate::error::ParseError;
use crate::http::{FetchRequest, FetchedResponse, page_ttl};
use crate::models::RawItem;
use crate::utils::{element_text, prague_midnight};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde_json::json;
use url::Url;

const PAGE_URL_TEMPLATE: &str = "https://www.praha3.cz/aktualne-z-trojky/zpravy/page:{n}/";

static ITEM: Lazy<Selector> = Lazy::new(|| Selector::parse(".news-list-item").expect("valid selector"));
static DATE: Lazy<Selector> = Lazy::new(|| Selector::parse(".date").expect("valid selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("h3").expect("valid selector"));
static LEAD: Lazy<Selector> = Lazy::new(|| Selector::parse("p").expect("valid selector"));
static TAG: Lazy<Selector> = Lazy::new(|| Selector::parse(".item-tags .tag").expect("valid selector"));
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse(".item-link").expect("valid selector"));
static ASIDE_PARAGRAPH: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".news-detail-aside p").expect("valid selector"));

#[derive(Debug, Clone)]
pub struct Praha3 {
    pages: u32,
    today: NaiveDate,
}

impl Praha3 {
    pub fn new(pages: u32, today: NaiveDate) -> Self {
        Self { pages, today }
    }

    fn parse_index(&self, response: &FetchedResponse) -> Result<Handled, ParseError> {
        let base = Url::parse(&response.url)?;
        let document = Html::parse_document(&response.text());
        let mut handled = Handled::default();
        for item in document.select(&ITEM) {
            match self.parse_item(item, &base) {
                Ok(request) => handled.follow.push(request),
                Err(e) => handled.items.push(Err(e)),
            }
        }
        Ok(handled)
    }

    fn parse_item(&self, item: ElementRef<'_>, base: &Url) -> Result<CrawlRequest, ParseError> {
        let text_of = |selector: &Selector, what: &'static str| {
            item.select(selector)
                .next()
                .map(element_text)
                .ok_or(ParseError::Missing(what))
        };
        let date_text = text_of(&DATE, "date")?;
        let published_at = prague_midnight(parse_date(&date_text, self.today)?)?;
        let href = item
            .select(&LINK)
            .next()
            .and_then(|link| link.value().attr("href"))
            .ok_or(ParseError::Missing("item link"))?;
        let url = base.join(href)?;

        let mut seed = RawItem::new();
        seed.insert("title".into(), json!(text_of(&TITLE, "title")?));
        seed.insert("lead".into(), json!(text_of(&LEAD, "lead")?));
        seed.insert("published_at".into(), json!(published_at.to_rfc3339()));
        seed.insert(
            "tags".into(),
            json!(item.select(&TAG).map(element_text).collect::<Vec<_>>()),
        );

        Ok(CrawlRequest::new(FetchRequest::get(url.as_str()).cache_for(page_ttl()), Stage::Detail)
            .with_seed(seed))
    }

    fn parse_detail(request: &CrawlRequest, response: &FetchedResponse) -> Result<RawItem, ParseError> {
        let document = Html::parse_document(&response.text());
        let paragraphs: Vec<String> = document.select(&ASIDE_PARAGRAPH).map(element_text).collect();
        let author = paragraphs
            .len()
            .checked_sub(2)
            .map(|i| paragraphs[i].clone())
            .filter(|author| !author.is_empty());
        let image_url = og_image(&document)
            .map(|src| Url::parse(&response.url).and_then(|base| base.join(&src)))
            .transpose()?;

        let mut detail = RawItem::new();
        detail.insert("author".into(), json!(author));
        detail.insert("image_url".into(), json!(image_url.map(|u| u.to_string())));
        detail.insert("url".into(), json!(request.request.url));
        detail.insert("lang".into(), json!("cs"));
        Ok(merge_seed(&request.seed, detail))
    }
}

/// Parse an index date label: `D. M. YYYY`, or `dnes` for today.
fn parse_date(text: &str, today: NaiveDate) -> Result<NaiveDate, ParseError> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("dnes") {
        return Ok(today);
    }
    NaiveDate::parse_from_str(text, "%d. %m. %Y").map_err(|e| ParseError::Timestamp {
        value: text.to_string(),
        reason: e.to_string(),
    })
}

impl Collector for Praha3 {
    fn name(&self) -> &'static str {
        "praha3"
    }

    fn seeds(&self) -> Vec<CrawlRequest> {
        (1..=self.pages)
            .map(|n| {
                let url = PAGE_URL_TEMPLATE.replace("{n}", &n.to_string());
                CrawlRequest::new(FetchRequest::get(url).cache_for(page_ttl()), Stage::Index)
            })
            .collect()
    }

    fn handle(
        &self,
        request: &CrawlRequest,
        response: &FetchedResponse,
    ) -> Result<Handled, ParseError> {
        match request.stage {
            Stage::Index => self.parse_index(response),
            Stage::Detail | Stage::Api => Ok(Handled {
                items: vec![Self::parse_detail(request, response)],
                follow: vec![],
            }),
        }
    }
}
