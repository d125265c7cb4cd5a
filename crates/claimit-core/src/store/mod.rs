//! Document Store Gateway
//!
//! A schema-less document database: JSON object documents grouped into
//! collections, subcollections nested under documents, collection-group
//! queries across every subcollection sharing a name, and atomic write
//! batches. Deleting a document leaves its subcollections in place.

pub mod memory;
pub mod path;

pub use memory::{MemoryStore, StoreCalls};
pub use path::{CollectionPath, DocPath};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Not signed in")]
    Unauthenticated,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Precondition failed: {0}")]
    FailedPrecondition(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A stored document and where it lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub path: DocPath,
    pub data: Map<String, Value>,
}

impl Document {
    pub fn new(path: DocPath, data: Map<String, Value>) -> Self {
        Self { path, data }
    }

    pub fn id(&self) -> &str {
        self.path.id()
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    /// Decode the document body into a typed record
    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        Ok(serde_json::from_value(Value::Object(self.data.clone()))?)
    }
}

/// Convert a serializable record into a document body
pub fn to_body<T: Serialize>(record: &T) -> StoreResult<Map<String, Value>> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::InvalidDocument(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

/// Where a query reads from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "camelCase")]
pub enum Source {
    /// One collection
    Collection(CollectionPath),
    /// Every collection with this name, under any parent
    Group(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Field equality filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub equals: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub source: Source,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub order_by: Option<OrderBy>,
}

impl Query {
    pub fn collection(path: CollectionPath) -> Self {
        Self {
            source: Source::Collection(path),
            filters: Vec::new(),
            order_by: None,
        }
    }

    pub fn group(name: &str) -> Self {
        Self {
            source: Source::Group(name.to_string()),
            filters: Vec::new(),
            order_by: None,
        }
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            equals: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }

    /// Whether a document at `path` belongs to this query's source
    pub fn covers(&self, path: &DocPath) -> bool {
        match &self.source {
            Source::Collection(collection) => &path.collection() == collection,
            Source::Group(name) => path.collection().name() == name,
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.covers(&doc.path)
            && self
                .filters
                .iter()
                .all(|f| doc.field(&f.field) == Some(&f.equals))
    }

    /// Apply the requested ordering. Stable, so ties keep store order.
    pub fn sort(&self, docs: &mut [Document]) {
        let Some(order) = &self.order_by else {
            return;
        };

        docs.sort_by(|a, b| {
            let ordering = compare_values(a.field(&order.field), b.field(&order.field));
            match order.direction {
                Direction::Ascending => ordering,
                Direction::Descending => ordering.reverse(),
            }
        });
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// A single field change applied by an update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum FieldUpdate {
    Set { field: String, value: Value },
    /// Append values not already present to an array field
    ArrayUnion { field: String, values: Vec<Value> },
}

impl FieldUpdate {
    pub fn set(field: &str, value: impl Into<Value>) -> Self {
        Self::Set {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn array_union(field: &str, value: impl Into<Value>) -> Self {
        Self::ArrayUnion {
            field: field.to_string(),
            values: vec![value.into()],
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Self::Set { field, .. } | Self::ArrayUnion { field, .. } => field,
        }
    }
}

/// Apply updates to a document body in order
pub fn apply_updates(data: &mut Map<String, Value>, updates: &[FieldUpdate]) -> StoreResult<()> {
    for update in updates {
        match update {
            FieldUpdate::Set { field, value } => {
                data.insert(field.clone(), value.clone());
            }
            FieldUpdate::ArrayUnion { field, values } => {
                let entry = data
                    .entry(field.clone())
                    .or_insert_with(|| Value::Array(Vec::new()));
                if entry.is_null() {
                    *entry = Value::Array(Vec::new());
                }
                let Value::Array(existing) = entry else {
                    return Err(StoreError::InvalidDocument(format!(
                        "field '{}' is not an array",
                        field
                    )));
                };
                for value in values {
                    if !existing.contains(value) {
                        existing.push(value.clone());
                    }
                }
            }
        }
    }
    Ok(())
}

/// One write inside a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum WriteOp {
    /// Create or overwrite
    Set {
        path: DocPath,
        data: Map<String, Value>,
    },
    /// Apply updates to an existing document
    Update {
        path: DocPath,
        updates: Vec<FieldUpdate>,
    },
    /// Delete if present
    Delete { path: DocPath },
}

impl WriteOp {
    pub fn path(&self) -> &DocPath {
        match self {
            Self::Set { path, .. } | Self::Update { path, .. } | Self::Delete { path } => path,
        }
    }
}

/// What must hold for a document before a batch may write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Condition {
    Exists,
    FieldEquals { field: String, equals: Value },
}

/// A condition on one document, checked inside the batch's transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Precondition {
    pub path: DocPath,
    pub condition: Condition,
}

impl Precondition {
    /// Check against the document as the backend currently holds it
    pub fn check(&self, data: Option<&Map<String, Value>>) -> StoreResult<()> {
        let holds = match (&self.condition, data) {
            (_, None) => false,
            (Condition::Exists, Some(_)) => true,
            (Condition::FieldEquals { field, equals }, Some(data)) => data.get(field) == Some(equals),
        };
        if holds {
            return Ok(());
        }
        Err(StoreError::FailedPrecondition(match &self.condition {
            Condition::Exists => format!("{} no longer exists", self.path),
            Condition::FieldEquals { field, equals } => {
                format!("{} no longer has {} = {}", self.path, field, equals)
            }
        }))
    }
}

/// Writes committed all together or not at all
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteBatch {
    pub ops: Vec<WriteOp>,
    /// Checked before any op applies; one failing aborts the batch
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expect: Vec<Precondition>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: DocPath, data: Map<String, Value>) -> Self {
        self.ops.push(WriteOp::Set { path, data });
        self
    }

    pub fn update(mut self, path: DocPath, updates: Vec<FieldUpdate>) -> Self {
        self.ops.push(WriteOp::Update { path, updates });
        self
    }

    pub fn delete(mut self, path: DocPath) -> Self {
        self.ops.push(WriteOp::Delete { path });
        self
    }

    /// Require the document to exist when the batch commits
    pub fn expect_exists(mut self, path: DocPath) -> Self {
        self.push_precondition(path, Condition::Exists);
        self
    }

    /// Require a field of the document to hold `value` when the batch commits
    pub fn expect_field(mut self, path: DocPath, field: &str, value: impl Into<Value>) -> Self {
        self.push_precondition(
            path,
            Condition::FieldEquals {
                field: field.to_string(),
                equals: value.into(),
            },
        );
        self
    }

    pub fn push_precondition(&mut self, path: DocPath, condition: Condition) {
        let precondition = Precondition { path, condition };
        if !self.expect.contains(&precondition) {
            self.expect.push(precondition);
        }
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Paths removed by this batch
    pub fn deleted_paths(&self) -> Vec<&DocPath> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                WriteOp::Delete { path } => Some(path),
                _ => None,
            })
            .collect()
    }
}

/// Backend holding the documents
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend name for logs
    fn backend_tag(&self) -> &'static str;

    /// Fetch one document, `None` when absent
    async fn get(&self, path: &DocPath) -> StoreResult<Option<Document>>;

    /// Run a query over a collection or collection group
    async fn list(&self, query: &Query) -> StoreResult<Vec<Document>>;

    /// Add a document under a generated identifier
    async fn add(&self, collection: &CollectionPath, data: Map<String, Value>)
        -> StoreResult<DocPath>;

    /// Update an existing document; fails with `NotFound` when absent
    async fn update(&self, path: &DocPath, updates: &[FieldUpdate]) -> StoreResult<()>;

    /// Delete a document; deleting an absent document succeeds
    async fn delete(&self, path: &DocPath) -> StoreResult<()>;

    /// Commit every write of the batch atomically
    async fn commit(&self, batch: WriteBatch) -> StoreResult<()>;
}
