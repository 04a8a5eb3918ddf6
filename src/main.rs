//! # p3news
//!
//! Local news for Prague 3, gathered from municipal and community sources,
//! published as one Atom feed and cross-posted to Mastodon.
//!
//! ## Features
//!
//! - Collects articles from the district office, Nová Trojka, Expats.cz,
//!   Munipolis, the city crisis portal, and Zdopravy.cz
//! - Validates every item against one strict article schema
//! - Writes an Atom feed with categories and image enclosures
//! - Posts articles not yet announced on the account, oldest first
//!
//! ## Usage
//!
//! ```sh
//! p3news scrape -o articles.json
//! p3news build -i articles.json -o feed.xml
//! ```
//!
//! ## Architecture
//!
//! 1. **Scraping**: each collector crawls its source into raw items
//! 2. **Aggregation**: raw items are validated and deduplicated by URL
//! 3. **Feed**: articles are sorted newest first and serialized to Atom
//! 4. **Cross-posting**: the account's history decides what is new; new
//!    articles are posted oldest first, up to a limit

use chrono::Utc;
use chrono_tz::Europe::Prague;
use clap::Parser;
use std::error::Error;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};
use url::Url;

mod cache;
mod cli;
mod config;
mod error;
mod http;
mod models;
mod outputs;
mod pipeline;
mod scrapers;
mod social;
mod utils;

use cache::ResponseCache;
use cli::{BuildArgs, Cli, Command, ScrapeArgs};
use config::Config;
use outputs::{atom, json};
use pipeline::{SortOrder, ValidationPolicy};
use scrapers::ScrapeOptions;
use social::SocialSettings;
use social::mastodon::MastodonClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();

    // --- Tracing init ---
    let default_level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "p3news starting up");
    debug!(config = ?args.config, debug = args.debug, "Parsed CLI arguments");

    let config = config::load_config(args.config.as_deref())?;

    match args.command {
        Command::Scrape(scrape) => run_scrape(scrape).await?,
        Command::Build(build) => run_build(build, &config).await?,
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

#[instrument(level = "info", skip_all)]
async fn run_scrape(args: ScrapeArgs) -> Result<(), Box<dyn Error>> {
    let today = args
        .today
        .unwrap_or_else(|| Utc::now().with_timezone(&Prague).date_naive());
    let options = ScrapeOptions {
        pages: args.pages,
        today,
        date_from: today - chrono::Duration::days(i64::from(args.days_back)),
        date_to: today + chrono::Duration::days(i64::from(args.days_ahead)),
    };
    info!(
        scrapers = ?args.scrapers,
        %today,
        date_from = %options.date_from,
        date_to = %options.date_to,
        "Scraping"
    );

    let cache = ResponseCache::open(&args.fetch.cache_dir).await?;
    let fetcher = http::build_fetcher(&args.fetch.options(), cache)?;
    let items = scrapers::run_collectors(&args.scrapers, &options, &fetcher).await;

    json::write_items(&items, &args.output).await?;
    Ok(())
}

#[instrument(level = "info", skip_all)]
async fn run_build(args: BuildArgs, config: &Config) -> Result<(), Box<dyn Error>> {
    let raw = json::read_items(&args.input).await?;
    let policy = if args.strict {
        ValidationPolicy::Abort
    } else {
        ValidationPolicy::Skip
    };
    let articles = pipeline::aggregate(raw, policy)?;
    let articles = pipeline::sort_articles(&articles, SortOrder::Descending);

    let cache = ResponseCache::open(&args.fetch.cache_dir).await?;
    let fetcher = http::build_fetcher(&args.fetch.options(), cache)?;
    let images = pipeline::fetch_images(&articles, &fetcher).await;

    // The feed is the primary output; failing to write it fails the run.
    let feed = atom::render_atom(&config.feed, &articles, &images, Utc::now())?;
    atom::write_feed(&args.output, &feed).await?;
    info!(entries = articles.len(), path = %args.output.display(), "Feed written");

    let Some(access_token) = args.access_token.as_deref() else {
        warn!("No Mastodon access token; skipping cross-posting");
        return Ok(());
    };
    let settings = SocialSettings {
        server_url: Url::parse(args.server_url.as_deref().unwrap_or(&config.social.server_url))?,
        location_tags: config.social.location_tags.clone(),
        posts_window: args.posts_window.unwrap_or(config.social.posts_window),
        limit: args.limit,
    };
    let client = MastodonClient::new(settings.server_url.clone(), access_token, &args.fetch.user_agent)?;
    let report = social::cross_post(&client, &articles, &images, &settings).await?;
    info!(posted = report.posted, failed = report.failed, "Cross-posting finished");
    Ok(())
}
