//! Collectors for the local news sources and the crawl loop that drives them.
//!
//! Each collector is a small state machine over named [`Stage`]s. It hands
//! out seed requests, and for every fetched response it returns the raw items
//! it found plus any follow-up requests (e.g. index page -> article detail).
//! [`crawl`] owns the queue, the fetching, and the error policy.
//!
//! # Supported Sources
//!
//! | Source | Module | Method | Notes |
//! |--------|--------|--------|-------|
//! | praha3.cz | [`praha3`] | HTML scraping | Paged index + detail pages |
//! | nova-trojka.cz | [`novatrojka`] | RSS + HTML | Detail page for the image |
//! | expats.cz | [`expats`] | HTML scraping | English; two tag pages |
//! | praha3.munipolis.cz | [`munipolis`] | JSON API | Token scraped from the home page |
//! | bezpecnost.praha.eu | [`bezpecnost`] | JSON API | Public safety events |
//! | zdopravy.cz | [`zdopravy`] | RSS | Only items tagged Praha 3 |
//!
//! # Error Policy
//!
//! - The first `Index` request that cannot be fetched or parsed is fatal for
//!   the collector ([`CollectorError`]); the run carries on without that
//!   source.
//! - Any later failing request (further index pages, `Api`, `Detail`), or a
//!   single malformed item, is logged and skipped.

use crate::error::{CollectorError, ParseError};
use crate::http::{Fetch, FetchRequest, FetchedResponse, Method};
use crate::models::RawItem;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, error, info, instrument, warn};

pub mod bezpecnost;
pub mod expats;
pub mod munipolis;
pub mod novatrojka;
pub mod praha3;
pub mod zdopravy;

/// Every collector, in the default run order.
pub const ALL_COLLECTORS: [&str; 6] = [
    "bezpecnost",
    "expats",
    "munipolis",
    "novatrojka",
    "praha3",
    "zdopravy",
];

/// Processing stage a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Entry page or feed; failure of the first one stops the collector.
    Index,
    /// Secondary API call discovered from an index page.
    Api,
    /// Single article page.
    Detail,
}

/// A queued request together with the stage that will handle it.
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    pub request: FetchRequest,
    pub stage: Stage,
    /// Fields already known from the page that discovered this request.
    pub seed: RawItem,
}

impl CrawlRequest {
    pub fn new(request: FetchRequest, stage: Stage) -> Self {
        Self {
            request,
            stage,
            seed: RawItem::new(),
        }
    }

    pub fn with_seed(mut self, seed: RawItem) -> Self {
        self.seed = seed;
        self
    }
}

/// What a collector extracted from one response.
#[derive(Debug, Default)]
pub struct Handled {
    pub items: Vec<Result<RawItem, ParseError>>,
    pub follow: Vec<CrawlRequest>,
}

/// One news source.
pub trait Collector {
    fn name(&self) -> &'static str;

    /// Requests the crawl starts from.
    fn seeds(&self) -> Vec<CrawlRequest>;

    /// Extract items and follow-up requests from a response.
    fn handle(
        &self,
        request: &CrawlRequest,
        response: &FetchedResponse,
    ) -> Result<Handled, ParseError>;
}

/// Parameters the collectors need from the command line.
#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    /// Number of index pages for the paged district site.
    pub pages: u32,
    /// Date used for "today" labels.
    pub today: NaiveDate,
    /// Inclusive start of the window for date-ranged APIs.
    pub date_from: NaiveDate,
    /// End of the window for date-ranged APIs.
    pub date_to: NaiveDate,
}

/// Look up a collector by its command-line name.
pub fn collector(name: &str, options: &ScrapeOptions) -> Option<Box<dyn Collector>> {
    let collector: Box<dyn Collector> = match name {
        "bezpecnost" => Box::new(bezpecnost::Bezpecnost::new(options.date_from, options.date_to)),
        "expats" => Box::new(expats::Expats),
        "munipolis" => Box::new(munipolis::Munipolis),
        "novatrojka" => Box::new(novatrojka::NovaTrojka),
        "praha3" => Box::new(praha3::Praha3::new(options.pages, options.today)),
        "zdopravy" => Box::new(zdopravy::Zdopravy),
        _ => return None,
    };
    Some(collector)
}

/// Run one collector to completion.
///
/// GET URLs are fetched at most once per crawl.
#[instrument(level = "info", skip_all, fields(collector = collector.name()))]
pub async fn crawl<C, F>(collector: &C, fetcher: &F) -> Result<Vec<RawItem>, CollectorError>
where
    C: Collector + ?Sized,
    F: Fetch,
{
    let mut queue: VecDeque<CrawlRequest> = collector.seeds().into();
    let mut visited: HashSet<String> = HashSet::new();
    let mut items = Vec::new();
    let mut skipped = 0usize;
    let mut started = false;

    while let Some(next) = queue.pop_front() {
        if next.request.method == Method::Get && !visited.insert(next.request.url.clone()) {
            debug!(url = %next.request.url, "Already visited");
            continue;
        }

        let response = match fetcher.fetch(&next.request).await {
            Ok(response) => response,
            Err(source) if next.stage == Stage::Index && !started => {
                return Err(CollectorError::Fetch {
                    collector: collector.name(),
                    url: next.request.url.clone(),
                    source,
                });
            }
            Err(e) => {
                warn!(url = %next.request.url, stage = ?next.stage, error = %e, "Fetch failed; skipping");
                skipped += 1;
                continue;
            }
        };

        let handled = match collector.handle(&next, &response) {
            Ok(handled) => handled,
            Err(source) if next.stage == Stage::Index && !started => {
                return Err(CollectorError::Parse {
                    collector: collector.name(),
                    url: next.request.url.clone(),
                    source,
                });
            }
            Err(e) => {
                warn!(url = %next.request.url, stage = ?next.stage, error = %e, "Parse failed; skipping");
                skipped += 1;
                continue;
            }
        };

        started = true;
        for item in handled.items {
            match item {
                Ok(item) => items.push(item),
                Err(e) => {
                    warn!(url = %next.request.url, error = %e, "Item did not parse; skipping");
                    skipped += 1;
                }
            }
        }
        queue.extend(handled.follow);
    }

    info!(count = items.len(), skipped, "Scraped items");
    Ok(items)
}

/// Run the named collectors one after another and concatenate their items.
///
/// Unknown names and fatal collector errors are logged and contribute zero
/// items.
pub async fn run_collectors<F: Fetch>(
    names: &[String],
    options: &ScrapeOptions,
    fetcher: &F,
) -> Vec<RawItem> {
    let mut items = Vec::new();
    for name in names {
        let Some(collector) = collector(name, options) else {
            error!(collector = %name, "Unknown collector");
            continue;
        };
        match crawl(collector.as_ref(), fetcher).await {
            Ok(found) => {
                info!(collector = %name, count = found.len(), "Collector finished");
                items.extend(found);
            }
            Err(e) => error!(collector = %name, error = %e, "Collector failed; no items from this source"),
        }
    }
    info!(count = items.len(), "Scraped items in total");
    items
}

static OG_IMAGE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:image"]"#).expect("valid selector"));

/// The `og:image` URL of an HTML page, if present.
pub(crate) fn og_image(document: &Html) -> Option<String> {
    document
        .select(&OG_IMAGE)
        .next()
        .and_then(|meta| meta.value().attr("content"))
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
}

/// Merge detail-page fields into the seed carried from the index page.
///
/// Fields already present in the seed win.
pub(crate) fn merge_seed(seed: &RawItem, detail: RawItem) -> RawItem {
    let mut merged = detail;
    for (key, value) in seed {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
