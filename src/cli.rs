//! Command-line interface definitions for p3news.
//!
//! Two subcommands split the run so the feed can be rebuilt without touching
//! the scraped sites: `scrape` writes the raw items, `build` turns them into
//! the feed and cross-posts.
//!
//! # Examples
//!
//! ```sh
//! # Scrape every source into articles.json (add --insecure if praha3.cz
//! # fails TLS verification)
//! p3news scrape
//!
//! # Only the district site, three index pages
//! p3news scrape -s praha3 -p 3
//!
//! # Build the feed and post up to two new articles
//! MASTODON_ACCESS_TOKEN=... p3news build -o site/feed.xml -l 2
//! ```

use crate::http::FetchOptions;
use crate::scrapers::ALL_COLLECTORS;
use chrono::NaiveDate;
use clap::builder::PossibleValuesParser;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration as StdDuration;

const DEFAULT_USER_AGENT: &str = "P3news (+https://github.com/honzajavorek/p3news/)";

/// Command-line arguments for p3news.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Optional path to a YAML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run collectors and write their raw items to a JSON file
    Scrape(ScrapeArgs),
    /// Build the Atom feed from scraped items and cross-post new ones
    Build(BuildArgs),
}

/// Settings for live HTTP requests.
#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// Seconds to wait between live requests
    #[arg(short, long, default_value_t = 1.0)]
    pub wait: f64,

    /// Attempts per request, including the first
    #[arg(long, default_value_t = 3)]
    pub attempts: usize,

    /// Base backoff in seconds between attempts
    #[arg(long, default_value_t = 1.0)]
    pub backoff: f64,

    /// Directory of the response cache
    #[arg(long, default_value = ".cache")]
    pub cache_dir: PathBuf,

    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Accept invalid TLS certificates (praha3.cz may need this when its
    /// certificate chain is incomplete)
    #[arg(long)]
    pub insecure: bool,
}

impl FetchArgs {
    pub fn options(&self) -> FetchOptions {
        FetchOptions {
            user_agent: self.user_agent.clone(),
            wait: seconds(self.wait),
            attempts: self.attempts,
            backoff: seconds(self.backoff),
            accept_invalid_certs: self.insecure,
        }
    }
}

fn seconds(value: f64) -> StdDuration {
    StdDuration::try_from_secs_f64(value).unwrap_or(StdDuration::ZERO)
}

#[derive(Args, Debug)]
pub struct ScrapeArgs {
    /// Collectors to run
    #[arg(
        short,
        long,
        num_args = 1..,
        value_parser = PossibleValuesParser::new(ALL_COLLECTORS),
        default_values = ALL_COLLECTORS
    )]
    pub scrapers: Vec<String>,

    /// Output file for the raw items
    #[arg(short, long, default_value = "articles.json")]
    pub output: PathBuf,

    /// Index pages to read from the district site
    #[arg(short, long, default_value_t = 5)]
    pub pages: u32,

    /// Days before today covered by date-ranged sources
    #[arg(long, default_value_t = 30)]
    pub days_back: u32,

    /// Days after today covered by date-ranged sources
    #[arg(long, default_value_t = 5)]
    pub days_ahead: u32,

    /// Date to use as "today" (YYYY-MM-DD)
    #[arg(long)]
    pub today: Option<NaiveDate>,

    #[command(flatten)]
    pub fetch: FetchArgs,
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Raw items written by `scrape`
    #[arg(short, long, default_value = "articles.json")]
    pub input: PathBuf,

    /// Output file for the Atom feed
    #[arg(short, long, default_value = "feed.xml")]
    pub output: PathBuf,

    /// Maximum number of articles to post
    #[arg(short, long, default_value_t = 1)]
    pub limit: usize,

    /// Mastodon server URL (defaults to the config file value)
    #[arg(long)]
    pub server_url: Option<String>,

    /// Mastodon access token; posting is skipped without one
    #[arg(long, env = "MASTODON_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Recent own posts to check for already posted links
    #[arg(long)]
    pub posts_window: Option<usize>,

    /// Abort on the first invalid item instead of skipping it
    #[arg(long)]
    pub strict: bool,

    #[command(flatten)]
    pub fetch: FetchArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrape_defaults() {
        let cli = Cli::parse_from(["p3news", "scrape"]);

        assert!(!cli.debug);
        let Command::Scrape(args) = cli.command else {
            panic!("expected scrape");
        };
        assert_eq!(args.scrapers, ALL_COLLECTORS.to_vec());
        assert_eq!(args.output, PathBuf::from("articles.json"));
        assert_eq!(args.pages, 5);
        assert_eq!(args.days_back, 30);
        assert_eq!(args.fetch.attempts, 3);
        assert_eq!(args.fetch.options().wait, StdDuration::from_secs(1));
        assert_eq!(args.fetch.cache_dir, PathBuf::from(".cache"));
        assert!(args.today.is_none());
    }

    #[test]
    fn test_scrape_short_flags() {
        let cli = Cli::parse_from([
            "p3news", "-d", "scrape", "-s", "praha3", "-s", "zdopravy", "-p", "2", "-o",
            "/tmp/items.json", "-w", "0.5", "--today", "2024-01-03",
        ]);

        assert!(cli.debug);
        let Command::Scrape(args) = cli.command else {
            panic!("expected scrape");
        };
        assert_eq!(args.scrapers, vec!["praha3", "zdopravy"]);
        assert_eq!(args.pages, 2);
        assert_eq!(args.output, PathBuf::from("/tmp/items.json"));
        assert_eq!(args.fetch.options().wait, StdDuration::from_millis(500));
        assert_eq!(args.today, NaiveDate::from_ymd_opt(2024, 1, 3));
    }

    #[test]
    fn test_unknown_scraper_is_rejected() {
        assert!(Cli::try_parse_from(["p3news", "scrape", "-s", "idnes"]).is_err());
    }

    #[test]
    fn test_build_flags() {
        let cli = Cli::parse_from([
            "p3news", "build", "-i", "items.json", "-o", "site/feed.xml", "-l", "3",
            "--access-token", "secret", "--posts-window", "200", "--strict", "--config",
            "p3news.yaml",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("p3news.yaml")));
        let Command::Build(args) = cli.command else {
            panic!("expected build");
        };
        assert_eq!(args.input, PathBuf::from("items.json"));
        assert_eq!(args.output, PathBuf::from("site/feed.xml"));
        assert_eq!(args.limit, 3);
        assert_eq!(args.access_token.as_deref(), Some("secret"));
        assert_eq!(args.posts_window, Some(200));
        assert!(args.strict);
        assert!(args.server_url.is_none());
    }

    #[test]
    fn test_insecure_is_off_and_help_names_district_site() {
        use clap::CommandFactory;

        let cli = Cli::parse_from(["p3news", "scrape"]);
        let Command::Scrape(args) = cli.command else {
            panic!("expected scrape");
        };
        assert!(!args.fetch.options().accept_invalid_certs);

        let command = Cli::command();
        let scrape = command.find_subcommand("scrape").unwrap();
        let insecure = scrape
            .get_arguments()
            .find(|arg| arg.get_id() == "insecure")
            .unwrap();
        let help = insecure.get_help().unwrap().to_string();
        assert!(help.contains("praha3.cz"));
    }

    #[test]
    fn test_negative_wait_means_no_wait() {
        assert_eq!(seconds(-1.0), StdDuration::ZERO);
    }
}
