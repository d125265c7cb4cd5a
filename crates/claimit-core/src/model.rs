//! Found items and the claims filed against them

use crate::store::{CollectionPath, DocPath, Document, StoreResult};
use crate::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Top-level collection of reported items
pub const FOUND_ITEMS: &str = "found_items";
/// Subcollection of claims under each item
pub const CLAIMS: &str = "claims";
/// Status written on every reported item
pub const REPORTED: &str = "reported";

pub fn found_items() -> CollectionPath {
    CollectionPath::root(FOUND_ITEMS)
}

pub fn item_path(item_id: &str) -> DocPath {
    found_items().doc(item_id)
}

pub fn claims_of(item_id: &str) -> CollectionPath {
    item_path(item_id).subcollection(CLAIMS)
}

pub fn claim_path(item_id: &str, claim_id: &str) -> DocPath {
    claims_of(item_id).doc(claim_id)
}

/// Item categories offered by the report form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Electronics,
    Keys,
    Wallets,
    Clothing,
    Books,
    Bags,
    Other,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Electronics,
        Category::Keys,
        Category::Wallets,
        Category::Clothing,
        Category::Books,
        Category::Bags,
        Category::Other,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Category::Electronics => "Electronics",
            Category::Keys => "Keys",
            Category::Wallets => "Wallets",
            Category::Clothing => "Clothing",
            Category::Books => "Books",
            Category::Bags => "Bags",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown category '{}'", s))
    }
}

/// Review status of a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimStatus {
    Pending,
    Approved,
    Rejected,
}

impl ClaimStatus {
    pub const ALL: [ClaimStatus; 3] = [
        ClaimStatus::Pending,
        ClaimStatus::Approved,
        ClaimStatus::Rejected,
    ];

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ClaimStatus::Pending)
    }

    /// Pending claims move once to a terminal status and never again
    pub fn transition_to(self, next: ClaimStatus) -> CoreResult<ClaimStatus> {
        match (self, next) {
            (ClaimStatus::Pending, ClaimStatus::Approved | ClaimStatus::Rejected) => Ok(next),
            (from, to) => Err(CoreError::InvalidTransition { from, to }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClaimStatus::Pending => "Pending",
            ClaimStatus::Approved => "Approved",
            ClaimStatus::Rejected => "Rejected",
        }
    }

    /// Verb used in messages ("Could not approve the claim.")
    pub fn verb(&self) -> &'static str {
        match self {
            ClaimStatus::Pending => "reopen",
            ClaimStatus::Approved => "approve",
            ClaimStatus::Rejected => "reject",
        }
    }

    pub fn lowercase(&self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Approved => "approved",
            ClaimStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ClaimStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClaimStatus::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown claim status '{}'", s))
    }
}

/// Timestamps are stored as RFC 3339 text with millisecond precision so that
/// text ordering matches time ordering.
mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

fn reported() -> String {
    REPORTED.to_string()
}

/// A physical object someone reported as found
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoundItem {
    #[serde(skip)]
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: Category,
    pub location_found: String,
    /// Data URI, empty when reported without a picture
    #[serde(rename = "imageURL", default)]
    pub image_url: String,
    pub user_id: String,
    #[serde(with = "timestamp")]
    pub date_found: DateTime<Utc>,
    #[serde(default = "reported")]
    pub status: String,
    /// Users who filed a claim on this item
    #[serde(default)]
    pub claims: BTreeSet<String>,
}

impl FoundItem {
    pub fn from_document(doc: &Document) -> StoreResult<Self> {
        let mut item: FoundItem = doc.decode()?;
        item.id = doc.id().to_string();
        Ok(item)
    }

    pub fn path(&self) -> DocPath {
        item_path(&self.id)
    }

    pub fn has_claimant(&self, user_id: &str) -> bool {
        self.claims.contains(user_id)
    }
}

/// One user's assertion of ownership over a found item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    #[serde(skip)]
    pub id: String,
    pub claim_reason: String,
    pub contact_information: String,
    pub found_item_id: String,
    pub user_id: String,
    pub status: ClaimStatus,
    /// Item name copied when the claim was filed
    pub item_name: String,
    #[serde(default)]
    pub item_image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_reason: Option<String>,
}

impl Claim {
    /// New pending claim on `item`, copying the item fields shown in review
    pub fn pending(item: &FoundItem, user_id: &str, reason: &str, contact: &str) -> Self {
        Self {
            id: String::new(),
            claim_reason: reason.to_string(),
            contact_information: contact.to_string(),
            found_item_id: item.id.clone(),
            user_id: user_id.to_string(),
            status: ClaimStatus::Pending,
            item_name: item.name.clone(),
            item_image: item.image_url.clone(),
            admin_reason: None,
        }
    }

    pub fn from_document(doc: &Document) -> StoreResult<Self> {
        let mut claim: Claim = doc.decode()?;
        claim.id = doc.id().to_string();
        Ok(claim)
    }

    pub fn path(&self) -> DocPath {
        claim_path(&self.found_item_id, &self.id)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn sample_item() -> FoundItem {
        FoundItem {
            id: "i1".to_string(),
            name: "Black wallet".to_string(),
            description: "Leather wallet with a zip".to_string(),
            category: Category::Wallets,
            location_found: "Library".to_string(),
            image_url: String::new(),
            user_id: "finder".to_string(),
            date_found: DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            status: REPORTED.to_string(),
            claims: BTreeSet::new(),
        }
    }

    #[test]
    fn test_status_transitions() {
        assert_eq!(
            ClaimStatus::Pending.transition_to(ClaimStatus::Approved).unwrap(),
            ClaimStatus::Approved
        );
        assert!(ClaimStatus::Pending.transition_to(ClaimStatus::Pending).is_err());
        assert!(ClaimStatus::Approved.transition_to(ClaimStatus::Rejected).is_err());
        assert!(ClaimStatus::Rejected.transition_to(ClaimStatus::Approved).is_err());
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("keys".parse::<Category>().unwrap(), Category::Keys);
        assert_eq!(" Bags ".parse::<Category>().unwrap(), Category::Bags);
        assert!("Umbrellas".parse::<Category>().is_err());
    }

    #[test]
    fn test_item_wire_shape() {
        let item = sample_item();
        let value = serde_json::to_value(&item).unwrap();

        assert_eq!(value["locationFound"], "Library");
        assert_eq!(value["imageURL"], "");
        assert_eq!(value["dateFound"], "2024-05-01T10:00:00.000Z");
        assert_eq!(value["status"], "reported");
        assert_eq!(value["claims"], json!([]));
        assert!(value.get("id").is_none());
    }

    #[test]
    fn test_item_without_claims_field_decodes() {
        let Value::Object(data) = json!({
            "name": "Keys",
            "description": "Three keys on a red ring",
            "category": "Keys",
            "locationFound": "Gym",
            "imageURL": "",
            "userId": "finder",
            "dateFound": "2024-05-01T10:00:00.123Z",
            "status": "reported"
        }) else {
            unreachable!()
        };
        let doc = Document::new(item_path("k1"), data);

        let item = FoundItem::from_document(&doc).unwrap();
        assert_eq!(item.id, "k1");
        assert!(item.claims.is_empty());
        assert!(!item.has_claimant("u1"));
    }

    #[test]
    fn test_pending_claim_copies_item_fields() {
        let item = sample_item();
        let claim = Claim::pending(&item, "u1", "It has my library card", "u1@example.com");

        assert_eq!(claim.status, ClaimStatus::Pending);
        assert_eq!(claim.found_item_id, "i1");
        assert_eq!(claim.item_name, "Black wallet");
        assert!(claim.admin_reason.is_none());

        let value = serde_json::to_value(&claim).unwrap();
        assert_eq!(value["status"], "Pending");
        assert_eq!(value["claimReason"], "It has my library card");
        assert!(value.get("adminReason").is_none());
    }
}
