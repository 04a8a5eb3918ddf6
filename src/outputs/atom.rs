//! Atom feed serialization.
//!
//! Every article becomes one `<entry>`. The output depends only on the
//! articles, their images, and the metadata, except for the feed-level
//! `<updated>` element which carries the generation time. Entry `<updated>`
//! equals `<published>` so rebuilding an unchanged list is byte-stable.
//!
//! ```text
//! <entry xml:lang="cs">
//!   <id>{url}</id>
//!   <title>{title}</title>
//!   <updated>{published_at}</updated>
//!   <published>{published_at}</published>
//!   <author><name>{author}</name></author>      (when known)
//!   <link href="{url}" rel="alternate"/>
//!   <summary>{lead}</summary>                    (when known)
//!   <category term="{slug}" label="{tag}"/>      (one per tag)
//!   <link href="{image_url}" rel="enclosure" type=".." length=".."/>
//! </entry>
//! ```

use crate::error::PublishError;
use crate::models::{Article, ImagePayload};
use crate::utils::{ensure_parent_dir, slugify};
use chrono::{DateTime, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

/// Feed-level metadata.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeedMetadata {
    /// Stable feed identifier; never change it once published.
    pub id: String,
    pub title: String,
    pub author_name: String,
    pub author_email: Option<String>,
    pub link: String,
    pub language: String,
}

impl Default for FeedMetadata {
    fn default() -> Self {
        Self {
            id: "bvRcCoa!d_UeE4WBeZLcG6qnB*!9xP".to_string(),
            title: "P3news".to_string(),
            author_name: "Honza Javorek".to_string(),
            author_email: Some("mail@honzajavorek.cz".to_string()),
            link: "https://github.com/honzajavorek/p3news".to_string(),
            language: "cs".to_string(),
        }
    }
}

type XmlWriter = Writer<Vec<u8>>;

fn xml_error(e: impl fmt::Display) -> PublishError {
    PublishError::Xml(e.to_string())
}

// Drop control characters XML 1.0 cannot carry.
fn sanitize_text(input: &str) -> String {
    input
        .chars()
        .filter(|&c| matches!(c, '\t' | '\n' | '\r') || c >= ' ')
        .collect()
}

fn start(w: &mut XmlWriter, element: BytesStart<'_>) -> Result<(), PublishError> {
    w.write_event(Event::Start(element)).map_err(xml_error)
}

fn end(w: &mut XmlWriter, name: &str) -> Result<(), PublishError> {
    w.write_event(Event::End(BytesEnd::new(name))).map_err(xml_error)
}

fn empty(w: &mut XmlWriter, element: BytesStart<'_>) -> Result<(), PublishError> {
    w.write_event(Event::Empty(element)).map_err(xml_error)
}

fn text_element(w: &mut XmlWriter, name: &str, text: &str) -> Result<(), PublishError> {
    start(w, BytesStart::new(name))?;
    let text = sanitize_text(text);
    w.write_event(Event::Text(BytesText::new(&text)))
        .map_err(xml_error)?;
    end(w, name)
}

fn link(w: &mut XmlWriter, href: &str, rel: &str) -> Result<(), PublishError> {
    let mut element = BytesStart::new("link");
    element.push_attribute(("href", href));
    element.push_attribute(("rel", rel));
    empty(w, element)
}

fn author(w: &mut XmlWriter, name: &str, email: Option<&str>) -> Result<(), PublishError> {
    start(w, BytesStart::new("author"))?;
    text_element(w, "name", name)?;
    if let Some(email) = email {
        text_element(w, "email", email)?;
    }
    end(w, "author")
}

fn write_entry(w: &mut XmlWriter, article: &Article, image: Option<&ImagePayload>) -> Result<(), PublishError> {
    let mut entry = BytesStart::new("entry");
    entry.push_attribute(("xml:lang", article.lang.as_str()));
    start(w, entry)?;

    let published = article.published_at.to_rfc3339();
    text_element(w, "id", article.url.as_str())?;
    text_element(w, "title", &article.title)?;
    text_element(w, "updated", &published)?;
    text_element(w, "published", &published)?;
    if let Some(name) = &article.author {
        author(w, name, None)?;
    }
    link(w, article.url.as_str(), "alternate")?;
    if let Some(lead) = &article.lead {
        text_element(w, "summary", lead)?;
    }
    for tag in &article.tags {
        let mut category = BytesStart::new("category");
        category.push_attribute(("term", slugify(tag, "-").as_str()));
        category.push_attribute(("label", sanitize_text(tag).as_str()));
        empty(w, category)?;
    }
    if let (Some(image_url), Some(image)) = (&article.image_url, image) {
        let length = image.length.to_string();
        let mut enclosure = BytesStart::new("link");
        enclosure.push_attribute(("href", image_url.as_str()));
        enclosure.push_attribute(("rel", "enclosure"));
        enclosure.push_attribute(("type", image.content_type.as_str()));
        enclosure.push_attribute(("length", length.as_str()));
        empty(w, enclosure)?;
    }

    end(w, "entry")
}

/// Serialize articles, in the given order, into an Atom document.
///
/// An enclosure is written only for articles whose image was fetched; its
/// type and length come from that fetch.
pub fn render_atom(
    meta: &FeedMetadata,
    articles: &[Article],
    images: &HashMap<Url, ImagePayload>,
    generated_at: DateTime<Utc>,
) -> Result<Vec<u8>, PublishError> {
    let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(xml_error)?;

    let mut feed = BytesStart::new("feed");
    feed.push_attribute(("xmlns", ATOM_NS));
    feed.push_attribute(("xml:lang", meta.language.as_str()));
    start(&mut w, feed)?;

    text_element(&mut w, "id", &meta.id)?;
    text_element(&mut w, "title", &meta.title)?;
    text_element(&mut w, "updated", &generated_at.to_rfc3339())?;
    author(&mut w, &meta.author_name, meta.author_email.as_deref())?;
    link(&mut w, &meta.link, "alternate")?;
    let mut generator = BytesStart::new("generator");
    generator.push_attribute(("version", env!("CARGO_PKG_VERSION")));
    start(&mut w, generator)?;
    w.write_event(Event::Text(BytesText::new(env!("CARGO_PKG_NAME"))))
        .map_err(xml_error)?;
    end(&mut w, "generator")?;

    for article in articles {
        let image = article.image_url.as_ref().and_then(|url| images.get(url));
        write_entry(&mut w, article, image)?;
    }

    end(&mut w, "feed")?;
    let mut bytes = w.into_inner();
    bytes.push(b'\n');
    Ok(bytes)
}

/// Write a rendered feed to disk, creating parent directories as needed.
#[instrument(level = "info", skip_all, fields(path = %path.display(), bytes = feed.len()))]
pub async fn write_feed(path: &Path, feed: &[u8]) -> Result<(), PublishError> {
    ensure_parent_dir(path).await?;
    fs::write(path, feed).await?;
    info!("Wrote feed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawItem;
    use serde_json::json;

    fn article(value: serde_json::Value) -> Article {
        let raw: RawItem = value.as_object().cloned().unwrap();
        Article::from_raw(raw).unwrap()
    }

    fn fixture() -> (Vec<Article>, HashMap<Url, ImagePayload>) {
        let articles = vec![
            article(json!({
                "title": "Nové lavičky v Parukářce",
                "author": "Jan Novák",
                "lead": "Radnice osadila dvacet <nových> laviček & košů.",
                "url": "https://www.praha3.cz/aktualne-z-trojky/zpravy/lavicky/",
                "image_url": "https://www.praha3.cz/getFile/id:2/lavicky.jpg",
                "tags": ["Životní prostředí", "Parky"],
                "published_at": "2024-01-03T00:00:00+01:00",
                "lang": "cs",
            })),
            article(json!({
                "title": "Žižkov Tower reopens",
                "url": "https://www.expats.cz/news/zizkov-tower-reopens",
                "image_url": "https://www.expats.cz/images/tower.jpg",
                "tags": [],
                "published_at": "2024-01-02T10:00:00+00:00",
                "lang": "en",
            })),
        ];
        let mut images = HashMap::new();
        images.insert(
            Url::parse("https://www.praha3.cz/getFile/id:2/lavicky.jpg").unwrap(),
            ImagePayload {
                content_type: "image/jpeg".to_string(),
                length: 48213,
                bytes: vec![0xff, 0xd8],
            },
        );
        (articles, images)
    }

    fn generated_at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_render_is_stable_except_generation_time() {
        let (articles, images) = fixture();
        let meta = FeedMetadata::default();
        let first = render_atom(&meta, &articles, &images, generated_at("2024-01-05T08:00:00Z")).unwrap();
        let again = render_atom(&meta, &articles, &images, generated_at("2024-01-05T08:00:00Z")).unwrap();
        let later = render_atom(&meta, &articles, &images, generated_at("2024-01-06T08:00:00Z")).unwrap();

        assert_eq!(first, again);
        let first = String::from_utf8(first).unwrap();
        let later = String::from_utf8(later).unwrap();
        let differing: Vec<_> = first
            .lines()
            .zip(later.lines())
            .filter(|(a, b)| a != b)
            .collect();
        assert_eq!(differing.len(), 1);
        assert!(differing[0].0.contains("<updated>2024-01-05T08:00:00+00:00</updated>"));
    }

    #[test]
    fn test_entries_parse_back_as_atom() {
        let (articles, images) = fixture();
        let bytes = render_atom(
            &FeedMetadata::default(),
            &articles,
            &images,
            generated_at("2024-01-05T08:00:00Z"),
        )
        .unwrap();

        let feed = feed_rs::parser::parse(bytes.as_slice()).unwrap();
        assert_eq!(feed.title.unwrap().content, "P3news");
        assert_eq!(feed.entries.len(), 2);

        let first = &feed.entries[0];
        assert_eq!(first.id, "https://www.praha3.cz/aktualne-z-trojky/zpravy/lavicky/");
        assert_eq!(
            first.summary.as_ref().unwrap().content,
            "Radnice osadila dvacet <nových> laviček & košů."
        );
        let terms: Vec<_> = first.categories.iter().map(|c| c.term.as_str()).collect();
        assert_eq!(terms, vec!["zivotni-prostredi", "parky"]);
        assert_eq!(first.categories[0].label.as_deref(), Some("Životní prostředí"));

        let enclosure = first
            .links
            .iter()
            .find(|l| l.rel.as_deref() == Some("enclosure"))
            .unwrap();
        assert_eq!(enclosure.href, "https://www.praha3.cz/getFile/id:2/lavicky.jpg");
        assert_eq!(enclosure.length, Some(48213));
        assert_eq!(enclosure.media_type.as_deref(), Some("image/jpeg"));
    }

    #[test]
    fn test_enclosure_requires_fetched_image() {
        let (articles, images) = fixture();
        let xml = String::from_utf8(
            render_atom(
                &FeedMetadata::default(),
                &articles[1..],
                &images,
                generated_at("2024-01-05T08:00:00Z"),
            )
            .unwrap(),
        )
        .unwrap();
        assert!(!xml.contains("rel=\"enclosure\""));
        assert!(xml.contains("<entry xml:lang=\"en\">"));
        assert!(xml.contains("<published>2024-01-02T10:00:00+00:00</published>"));
    }

    #[test]
    fn test_control_characters_are_dropped() {
        assert_eq!(sanitize_text("a\u{0}b\u{1b}c\nd"), "abc\nd");
    }

    #[tokio::test]
    async fn test_write_feed_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site/feed.xml");
        write_feed(&path, b"<feed/>").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"<feed/>");
    }
}
