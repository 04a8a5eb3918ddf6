//! Public safety events from the city crisis portal
//! ([bezpecnost.praha.eu](https://bezpecnost.praha.eu)).
//!
//! One JSON request covers a date window; events outside Prague 3 are
//! dropped.

use super::{Collector, CrawlRequest, Handled, Stage};
use crate::error::ParseError;
use crate::http::{FetchRequest, FetchedResponse, page_ttl};
use crate::models::RawItem;
use crate::utils::{html_to_text, normalize_timestamp};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

const EVENTS_URL: &str = "https://bezpecnost.praha.eu/Intens.CrisisPortalInfrastructureApp/events";
const EVENT_PAGE_BASE: &str = "https://bezpecnost.praha.eu/udalosti/";
const DISTRICT: &str = "Praha 3";

#[derive(Debug, Clone)]
pub struct Bezpecnost {
    date_from: NaiveDate,
    date_to: NaiveDate,
}

impl Bezpecnost {
    pub fn new(date_from: NaiveDate, date_to: NaiveDate) -> Self {
        Self { date_from, date_to }
    }

    fn events_url(&self) -> String {
        format!(
            "{EVENTS_URL}?from={}T00:00:00.000Z&to={}T00:00:00.000Z&groupType=OSKS_ACTUALITY&showHistory=true",
            self.date_from.format("%Y-%m-%d"),
            self.date_to.format("%Y-%m-%d"),
        )
    }
}

#[derive(Debug, Deserialize)]
struct Events {
    events: Vec<Event>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Event {
    title: String,
    #[serde(default)]
    description: Option<String>,
    relative_url: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    administrative_district: Option<String>,
    publication: Publication,
}

#[derive(Debug, Deserialize)]
struct Publication {
    date: String,
}

fn event_item(event: Event) -> Result<RawItem, ParseError> {
    let published_at = normalize_timestamp(&event.publication.date)?;
    let lead = event
        .description
        .as_deref()
        .map(html_to_text)
        .filter(|lead| !lead.is_empty());

    let mut item = RawItem::new();
    item.insert("title".into(), json!(event.title));
    item.insert("lead".into(), json!(lead));
    item.insert(
        "url".into(),
        json!(format!("{EVENT_PAGE_BASE}{}", event.relative_url)),
    );
    item.insert("tags".into(), json!([event.kind]));
    item.insert("published_at".into(), json!(published_at.to_rfc3339()));
    item.insert("lang".into(), json!("cs"));
    Ok(item)
}

impl Collector for Bezpecnost {
    fn name(&self) -> &'static str {
        "bezpecnost"
    }

    fn seeds(&self) -> Vec<CrawlRequest> {
        let request = FetchRequest::get(self.events_url())
            .header("Accept", "application/json, text/plain, */*")
            .cache_for(page_ttl());
        vec![CrawlRequest::new(request, Stage::Index)]
    }

    fn handle(
        &self,
        _request: &CrawlRequest,
        response: &FetchedResponse,
    ) -> Result<Handled, ParseError> {
        let events: Events = serde_json::from_slice(&response.body)?;
        let items = events
            .events
            .into_iter()
            .filter(|event| event.administrative_district.as_deref() == Some(DISTRICT))
            .map(event_item)
            .collect();
        Ok(Handled {
            items,
            follow: vec![],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::ok;
    use crate::models::Article;

    const EVENTS: &str = r#"{
  "events": [
    {
      "title": "Uzavírka Husitské",
      "description": "<p>Z důvodu <strong>opravy</strong> plynovodu</p><p>do 15. 1.</p>",
      "relativeUrl": "uzavirka-husitske-123",
      "type": "Doprava",
      "administrativeDistrict": "Praha 3",
      "publication": {"date": "2024-01-03T10:00:00"}
    },
    {
      "title": "Požár v Holešovicích",
      "description": "<p>x</p>",
      "relativeUrl": "pozar-456",
      "type": "Požár",
      "administrativeDistrict": "Praha 7",
      "publication": {"date": "2024-01-03T11:00:00"}
    },
    {
      "title": "Celoměstská výstraha",
      "relativeUrl": "vystraha-789",
      "type": "Počasí",
      "publication": {"date": "2024-01-03T12:00:00Z"}
    }
  ]
}"#;

    fn collector() -> Bezpecnost {
        Bezpecnost::new(
            NaiveDate::from_ymd_opt(2023, 12, 4).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
        )
    }

    #[test]
    fn test_seed_covers_date_window() {
        let seeds = collector().seeds();
        assert_eq!(seeds.len(), 1);
        let request = &seeds[0].request;
        assert_eq!(
            request.url,
            "https://bezpecnost.praha.eu/Intens.CrisisPortalInfrastructureApp/events?from=2023-12-04T00:00:00.000Z&to=2024-01-08T00:00:00.000Z&groupType=OSKS_ACTUALITY&showHistory=true"
        );
        assert_eq!(
            request.headers,
            vec![(
                "Accept".to_string(),
                "application/json, text/plain, */*".to_string()
            )]
        );
    }

    #[test]
    fn test_only_district_events_are_kept() {
        let collector = collector();
        let seeds = collector.seeds();
        let handled = collector
            .handle(&seeds[0], &ok(&seeds[0].request.url, EVENTS.as_bytes(), &[]))
            .unwrap();

        assert_eq!(handled.items.len(), 1);
        let item = handled.items.into_iter().next().unwrap().unwrap();
        let article = Article::from_raw(item).unwrap();
        assert_eq!(article.title, "Uzavírka Husitské");
        assert_eq!(article.lead.as_deref(), Some("Z důvodu opravy plynovodu do 15. 1."));
        assert_eq!(
            article.url.as_str(),
            "https://bezpecnost.praha.eu/udalosti/uzavirka-husitske-123"
        );
        assert_eq!(article.tags, vec!["Doprava"]);
        assert_eq!(article.published_at.to_rfc3339(), "2024-01-03T10:00:00+01:00");
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        let collector = collector();
        let seeds = collector.seeds();
        assert!(
            collector
                .handle(&seeds[0], &ok(&seeds[0].request.url, b"{\"items\": []}", &[]))
                .is_err()
        );
    }
}
