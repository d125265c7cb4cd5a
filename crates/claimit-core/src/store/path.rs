//! Collection and document paths
//!
//! Paths alternate collection and document segments, starting with a
//! collection: `found_items` is a collection, `found_items/abc` a document,
//! `found_items/abc/claims` a subcollection of that document.

use super::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

fn split(raw: &str) -> StoreResult<Vec<String>> {
    let trimmed = raw.trim_matches('/');
    if trimmed.is_empty() {
        return Err(StoreError::InvalidPath(raw.to_string()));
    }

    let segments: Vec<String> = trimmed.split('/').map(str::to_string).collect();
    if segments.iter().any(|s| s.is_empty() || s.trim() != s) {
        return Err(StoreError::InvalidPath(raw.to_string()));
    }

    Ok(segments)
}

/// Path to a collection (odd number of segments)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollectionPath(Vec<String>);

impl CollectionPath {
    pub fn parse(raw: &str) -> StoreResult<Self> {
        let segments = split(raw)?;
        if segments.len() % 2 == 0 {
            return Err(StoreError::InvalidPath(raw.to_string()));
        }
        Ok(Self(segments))
    }

    /// Top-level collection. `name` must be a single segment.
    pub fn root(name: &str) -> Self {
        Self(vec![name.to_string()])
    }

    /// Collection name, the key used by collection-group queries
    pub fn name(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or_default()
    }

    /// Document `id` inside this collection. `id` must be a single segment.
    pub fn doc(&self, id: &str) -> DocPath {
        let mut segments = self.0.clone();
        segments.push(id.to_string());
        DocPath(segments)
    }

    /// Fresh document path with a generated identifier
    pub fn new_doc(&self) -> DocPath {
        self.doc(&Uuid::new_v4().simple().to_string())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

/// Path to a document (even number of segments)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocPath(Vec<String>);

impl DocPath {
    pub fn parse(raw: &str) -> StoreResult<Self> {
        let segments = split(raw)?;
        if segments.len() % 2 != 0 {
            return Err(StoreError::InvalidPath(raw.to_string()));
        }
        Ok(Self(segments))
    }

    pub fn id(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or_default()
    }

    /// Collection holding this document
    pub fn collection(&self) -> CollectionPath {
        CollectionPath(self.0[..self.0.len() - 1].to_vec())
    }

    pub fn subcollection(&self, name: &str) -> CollectionPath {
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        CollectionPath(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

impl TryFrom<String> for CollectionPath {
    type Error = StoreError;

    fn try_from(value: String) -> StoreResult<Self> {
        Self::parse(&value)
    }
}

impl TryFrom<String> for DocPath {
    type Error = StoreError;

    fn try_from(value: String) -> StoreResult<Self> {
        Self::parse(&value)
    }
}

impl From<CollectionPath> for String {
    fn from(path: CollectionPath) -> Self {
        path.to_string()
    }
}

impl From<DocPath> for String {
    fn from(path: DocPath) -> Self {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_alternating_segments() {
        let items = CollectionPath::parse("found_items").unwrap();
        let item = DocPath::parse("found_items/i1").unwrap();
        let claims = CollectionPath::parse("/found_items/i1/claims/").unwrap();

        assert_eq!(items.name(), "found_items");
        assert_eq!(item.id(), "i1");
        assert_eq!(item.collection(), items);
        assert_eq!(item.subcollection("claims"), claims);
        assert_eq!(claims.doc("c1").to_string(), "found_items/i1/claims/c1");
    }

    #[test]
    fn test_parse_rejects_wrong_parity_and_empty_segments() {
        assert!(CollectionPath::parse("found_items/i1").is_err());
        assert!(DocPath::parse("found_items").is_err());
        assert!(DocPath::parse("found_items//i1").is_err());
        assert!(DocPath::parse("").is_err());
    }

    #[test]
    fn test_new_doc_is_unique() {
        let items = CollectionPath::root("found_items");
        let a = items.new_doc();
        let b = items.new_doc();
        assert_ne!(a, b);
        assert_eq!(a.collection(), items);
    }

    #[test]
    fn test_serde_uses_string_form() {
        let path = DocPath::parse("found_items/i1/claims/c1").unwrap();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"found_items/i1/claims/c1\"");

        let back: DocPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
        assert!(serde_json::from_str::<DocPath>("\"found_items\"").is_err());
    }
}
