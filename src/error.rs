//! Error types for each stage of the pipeline.
//!
//! Every failure class has its own enum so callers can apply the right policy:
//! transport failures are retried and then surface per fetch, parse and
//! validation failures drop a single item, collector failures zero out one
//! source, and publish failures either abort the run (feed) or skip one post
//! (social).

use thiserror::Error;

/// A network or HTTP failure for a single request.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} responded with status {status}")]
    HttpStatus { url: String, status: u16 },
}

/// A source page, feed, or JSON document did not have the expected shape.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("invalid timestamp {value:?}: {reason}")]
    Timestamp { value: String, reason: String },
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid feed: {0}")]
    Feed(#[from] feed_rs::parser::ParseFeedError),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// A raw item did not satisfy the article schema.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("schema mismatch for {url}: {source}")]
    Schema {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("empty title for {url}")]
    EmptyTitle { url: String },
    #[error("{field} of {url} is not an http(s) URL")]
    NotWeb { url: String, field: &'static str },
}

/// A collector could not get its crawl off the ground.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("{collector}: index page {url} could not be fetched: {source}")]
    Fetch {
        collector: &'static str,
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("{collector}: index page {url} could not be parsed: {source}")]
    Parse {
        collector: &'static str,
        url: String,
        #[source]
        source: ParseError,
    },
}

/// Feed serialization or social posting failed.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("feed serialization failed: {0}")]
    Xml(String),
    #[error("writing feed failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("social request failed: {0}")]
    Social(#[from] reqwest::Error),
    #[error("social platform responded with status {status}: {body}")]
    SocialStatus { status: u16, body: String },
}

/// The configuration file could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}
