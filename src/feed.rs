// Source feed - fetch and decode the published watchlist
// One trait seam, one concrete source: the OFAC SDN XML download.

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Published location of the SDN list.
pub const DEFAULT_FEED_URL: &str = "https://www.treasury.gov/ofac/downloads/sdn.xml";

/// Upstream fetch timeout. If it fires, the run fails like any other
/// fetch error and the refresh guard is released by the coordinator.
const FETCH_TIMEOUT: Duration = Duration::from_secs(120);

/// One entry as delivered by the current fetch, not yet reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub uid: i64,
    pub first_name: String,
    pub last_name: String,
    /// Source category (`sdnType`); only individuals are mirrored.
    pub category: String,
}

impl CandidateRecord {
    pub fn is_individual(&self) -> bool {
        self.category == "Individual"
    }
}

// ============================================================================
// FEED ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum FeedError {
    /// The upstream fetch failed (transport error, timeout, non-success status).
    #[error("watchlist source unavailable: {0}")]
    Unavailable(String),

    /// The fetched payload could not be decoded into candidate records.
    #[error("malformed watchlist payload: {0}")]
    Malformed(String),
}

// ============================================================================
// SOURCE FEED
// ============================================================================

/// Produces a sequence of candidate records on each refresh request.
pub trait SourceFeed: Send + Sync {
    fn fetch(&self) -> Result<Vec<CandidateRecord>, FeedError>;
}

/// The OFAC SDN XML download.
pub struct SdnXmlFeed {
    url: String,
}

impl SdnXmlFeed {
    pub fn new(url: impl Into<String>) -> Self {
        SdnXmlFeed { url: url.into() }
    }
}

impl Default for SdnXmlFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_URL)
    }
}

impl SourceFeed for SdnXmlFeed {
    fn fetch(&self) -> Result<Vec<CandidateRecord>, FeedError> {
        debug!("fetching watchlist from {}", self.url);

        let client = reqwest::blocking::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| FeedError::Unavailable(e.to_string()))?;

        let response = client
            .get(&self.url)
            .send()
            .map_err(|e| FeedError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FeedError::Unavailable(format!(
                "unexpected status {} from {}",
                response.status(),
                self.url
            )));
        }

        let body = response
            .text()
            .map_err(|e| FeedError::Unavailable(e.to_string()))?;

        parse_sdn_xml(&body)
    }
}

// ============================================================================
// SDN XML DECODING
// ============================================================================

/// Decode an `<sdnList>` document into candidate records.
///
/// Only `uid`, `firstName`, `lastName` and `sdnType` elements that sit
/// directly under an `<sdnEntry>` are captured; the same element names occur
/// again inside nested `<akaList>` blocks and must not bleed into the entry.
/// A missing name component defaults to empty (organizations and single-name
/// individuals carry no `firstName`), but an entry without a numeric `uid`
/// makes the whole payload malformed.
pub fn parse_sdn_xml(xml: &str) -> Result<Vec<CandidateRecord>, FeedError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut candidates = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut uid: Option<i64> = None;
    let mut first_name = String::new();
    let mut last_name = String::new();
    let mut category = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == "sdnEntry" {
                    uid = None;
                    first_name.clear();
                    last_name.clear();
                    category.clear();
                }
                path.push(name);
            }
            Ok(Event::Text(ref t)) => {
                // capture only direct children of sdnEntry
                let n = path.len();
                if n >= 2 && path[n - 2] == "sdnEntry" {
                    let decoded = t
                        .decode()
                        .map_err(|e| FeedError::Malformed(e.to_string()))?;
                    let text = quick_xml::escape::unescape(&decoded)
                        .map_err(|e| FeedError::Malformed(e.to_string()))?;
                    match path[n - 1].as_str() {
                        "uid" => {
                            uid = Some(text.parse().map_err(|_| {
                                FeedError::Malformed(format!("invalid uid '{}'", text))
                            })?);
                        }
                        "firstName" => first_name = text.into_owned(),
                        "lastName" => last_name = text.into_owned(),
                        "sdnType" => category = text.into_owned(),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                if e.name().as_ref() == b"sdnEntry" {
                    let uid = uid.take().ok_or_else(|| {
                        FeedError::Malformed("sdnEntry without a uid".to_string())
                    })?;
                    candidates.push(CandidateRecord {
                        uid,
                        first_name: std::mem::take(&mut first_name),
                        last_name: std::mem::take(&mut last_name),
                        category: std::mem::take(&mut category),
                    });
                }
                path.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(FeedError::Malformed(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    debug!("decoded {} candidate records", candidates.len());
    Ok(candidates)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<sdnList>
  <publshInformation>
    <Publish_Date>08/01/2026</Publish_Date>
    <Record_Count>2</Record_Count>
  </publshInformation>
  <sdnEntry>
    <uid>540</uid>
    <firstName>John</firstName>
    <lastName>Smith</lastName>
    <sdnType>Individual</sdnType>
    <akaList>
      <aka>
        <uid>9901</uid>
        <type>a.k.a.</type>
        <firstName>Jack</firstName>
        <lastName>Smythe</lastName>
      </aka>
    </akaList>
  </sdnEntry>
  <sdnEntry>
    <uid>777</uid>
    <lastName>ACME TRADING CO.</lastName>
    <sdnType>Entity</sdnType>
  </sdnEntry>
</sdnList>"#;

    #[test]
    fn test_parse_sample_list() {
        let candidates = parse_sdn_xml(SAMPLE_XML).unwrap();
        assert_eq!(candidates.len(), 2);

        assert_eq!(
            candidates[0],
            CandidateRecord {
                uid: 540,
                first_name: "John".to_string(),
                last_name: "Smith".to_string(),
                category: "Individual".to_string(),
            }
        );
        assert!(candidates[0].is_individual());

        // entity entry has no firstName element
        assert_eq!(candidates[1].uid, 777);
        assert_eq!(candidates[1].first_name, "");
        assert_eq!(candidates[1].last_name, "ACME TRADING CO.");
        assert!(!candidates[1].is_individual());
    }

    #[test]
    fn test_parse_ignores_aka_names() {
        // the nested aka block carries its own uid/firstName/lastName;
        // none of them may overwrite the entry's own fields
        let candidates = parse_sdn_xml(SAMPLE_XML).unwrap();
        assert_eq!(candidates[0].uid, 540);
        assert_eq!(candidates[0].first_name, "John");
        assert_eq!(candidates[0].last_name, "Smith");
    }

    #[test]
    fn test_parse_rejects_non_numeric_uid() {
        let xml = "<sdnList><sdnEntry><uid>abc</uid></sdnEntry></sdnList>";
        assert!(matches!(
            parse_sdn_xml(xml),
            Err(FeedError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_rejects_entry_without_uid() {
        let xml = "<sdnList><sdnEntry><lastName>Smith</lastName></sdnEntry></sdnList>";
        assert!(matches!(
            parse_sdn_xml(xml),
            Err(FeedError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_empty_list() {
        let candidates = parse_sdn_xml("<sdnList></sdnList>").unwrap();
        assert!(candidates.is_empty());
    }
}
