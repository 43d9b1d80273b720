//! Shared primitives for the perception and grounding crates.
//!
//! Everything here is scan-scoped or request-scoped: nothing in this crate survives a
//! navigation, and nothing is persisted.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Correlation token for one outer extract/observe call. Cache entries and audit records are
/// tagged with it so they can be dropped together when the call fails.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PageId(pub String);

impl PageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for PageId {
    fn default() -> Self {
        Self::new()
    }
}

/// Backend DOM node identifier as reported by the accessibility and DOM domains.
pub type BackendNodeId = i64;

/// Index of a candidate element produced by the in-page scanner.
///
/// Scanners emit integer indices, but JSON object keys arrive as strings and models echo
/// identifiers back either way, so the index is kept in its canonical string form.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct CandidateIndex(String);

impl CandidateIndex {
    pub fn new(raw: impl AsRef<str>) -> Self {
        let trimmed = raw.as_ref().trim();
        let canonical = match trimmed.parse::<u64>() {
            Ok(number) => number.to_string(),
            Err(_) => trimmed.to_string(),
        };
        Self(canonical)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_number(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl From<u64> for CandidateIndex {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for CandidateIndex {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for CandidateIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for CandidateIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CandidateIndex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IndexVisitor;

        impl<'de> Visitor<'de> for IndexVisitor {
            type Value = CandidateIndex;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an integer or string candidate index")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(CandidateIndex::from(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(CandidateIndex::new(v.to_string()))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                if v.fract() == 0.0 && v >= 0.0 {
                    Ok(CandidateIndex::from(v as u64))
                } else {
                    Ok(CandidateIndex::new(v.to_string()))
                }
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(CandidateIndex::new(v))
            }
        }

        deserializer.deserialize_any(IndexVisitor)
    }
}

/// Candidate index -> ranked xpath expressions resolving to the same live node.
pub type SelectorMap = BTreeMap<CandidateIndex, Vec<String>>;

/// Output of one full scan of the page (or of the subtree under a root xpath).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScanResult {
    pub serialized_text: String,
    pub candidates: SelectorMap,
}

impl ScanResult {
    pub fn is_empty(&self) -> bool {
        self.serialized_text.trim().is_empty() && self.candidates.is_empty()
    }

    /// Highest ranked xpath for a candidate.
    pub fn primary_xpath(&self, index: &CandidateIndex) -> Option<&str> {
        self.candidates
            .get(index)
            .and_then(|paths| paths.iter().find(|path| !path.is_empty()))
            .map(String::as_str)
    }
}

/// Output of the chunk-aware scan: the next unseen viewport-sized chunk.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChunkScan {
    pub serialized_text: String,
    pub candidates: SelectorMap,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

/// Concrete location of an element in the live page.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Locator {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_node_id: Option<BackendNodeId>,
}

impl Locator {
    pub fn from_xpath(xpath: impl Into<String>) -> Self {
        Self {
            xpath: Some(xpath.into()),
            backend_node_id: None,
        }
    }

    pub fn with_backend(mut self, backend_node_id: Option<BackendNodeId>) -> Self {
        self.backend_node_id = backend_node_id;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.xpath.as_deref().map_or(true, str::is_empty) && self.backend_node_id.is_none()
    }

    /// Playwright-style selector string, e.g. `xpath=/html/body/button`.
    pub fn selector(&self) -> Option<String> {
        self.xpath
            .as_deref()
            .filter(|xpath| !xpath.is_empty())
            .map(|xpath| format!("xpath={xpath}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn candidate_index_accepts_numbers_and_strings() {
        let from_number: CandidateIndex = serde_json::from_value(json!(12)).unwrap();
        let from_string: CandidateIndex = serde_json::from_value(json!("12")).unwrap();
        let padded: CandidateIndex = serde_json::from_value(json!(" 012 ")).unwrap();
        assert_eq!(from_number, from_string);
        assert_eq!(from_number, padded);
        assert_eq!(from_number.as_number(), Some(12));
    }

    #[test]
    fn candidate_index_keeps_opaque_keys() {
        let key = CandidateIndex::new("frame-1:7");
        assert_eq!(key.as_str(), "frame-1:7");
        assert!(key.as_number().is_none());
    }

    #[test]
    fn selector_map_round_trips_with_string_keys() {
        let payload = json!({ "3": ["/html/body/a", "//a[@id='x']"], "10": [] });
        let map: SelectorMap = serde_json::from_value(payload).unwrap();
        assert_eq!(map.len(), 2);
        let scan = ScanResult {
            serialized_text: "3:<a>x</a>".into(),
            candidates: map,
        };
        assert_eq!(scan.primary_xpath(&3u64.into()), Some("/html/body/a"));
        assert_eq!(scan.primary_xpath(&10u64.into()), None);
    }

    #[test]
    fn locator_selector_prefixes_xpath() {
        let locator = Locator::from_xpath("/html/body/div[2]").with_backend(Some(42));
        assert_eq!(locator.selector().as_deref(), Some("xpath=/html/body/div[2]"));
        assert!(!locator.is_empty());
        assert!(Locator::default().is_empty());
    }
}
