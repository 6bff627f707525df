//! The DocStore trait that backends implement, and the document model.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::DocStoreError;

/// A single typed field value inside a document.
///
/// Arrays carry set semantics: element order is irrelevant and duplicates
/// cannot exist, which is what makes [`FieldOp`] application commutative.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Timestamp(DateTime<Utc>),
    Array(BTreeSet<String>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&BTreeSet<String>> {
        match self {
            FieldValue::Array(a) => Some(a),
            _ => None,
        }
    }
}

/// A schemaless document: an id unique within its collection, plus named fields.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: FieldValue) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(FieldValue::as_text)
    }

    pub fn timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        self.fields.get(name).and_then(FieldValue::as_timestamp)
    }

    /// Array field as a set; missing field reads as the empty set.
    pub fn array(&self, name: &str) -> BTreeSet<String> {
        self.fields
            .get(name)
            .and_then(FieldValue::as_array)
            .cloned()
            .unwrap_or_default()
    }

    /// Applies a field op in place. Used by backends that materialize
    /// documents directly; set ops are idempotent and commute.
    pub fn apply(&mut self, op: &FieldOp) {
        match op {
            FieldOp::ArrayUnion { field, value } => {
                match self
                    .fields
                    .entry(field.clone())
                    .or_insert_with(|| FieldValue::Array(BTreeSet::new()))
                {
                    FieldValue::Array(set) => {
                        set.insert(value.clone());
                    }
                    other => *other = FieldValue::Array(BTreeSet::from([value.clone()])),
                }
            }
            FieldOp::ArrayRemove { field, value } => {
                if let Some(FieldValue::Array(set)) = self.fields.get_mut(field) {
                    set.remove(value);
                }
            }
            FieldOp::Set { field, value } => {
                self.fields.insert(field.clone(), value.clone());
            }
        }
    }
}

/// A mutation of a single field of a single document.
///
/// The array ops are the workhorses: they are idempotent and commute with each
/// other, so concurrent batches touching the same document converge regardless
/// of apply order (last-writer-wins only at the element level).
#[derive(Clone, Debug, PartialEq)]
pub enum FieldOp {
    ArrayUnion { field: String, value: String },
    ArrayRemove { field: String, value: String },
    Set { field: String, value: FieldValue },
}

impl FieldOp {
    pub fn array_union(field: &str, value: impl Into<String>) -> Self {
        FieldOp::ArrayUnion {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn array_remove(field: &str, value: impl Into<String>) -> Self {
        FieldOp::ArrayRemove {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn set_text(field: &str, value: impl Into<String>) -> Self {
        FieldOp::Set {
            field: field.to_string(),
            value: FieldValue::Text(value.into()),
        }
    }
}

/// One entry of an atomic batch.
///
/// `Update` addresses an existing document and fails the whole batch with
/// `NotFound` when it is absent; `Create` fails the batch with
/// `AlreadyExists` when the id is taken.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOp {
    Create {
        collection: String,
        doc: Document,
    },
    Update {
        collection: String,
        doc_id: String,
        op: FieldOp,
    },
    Delete {
        collection: String,
        doc_id: String,
    },
}

impl WriteOp {
    pub fn create(collection: &str, doc: Document) -> Self {
        WriteOp::Create {
            collection: collection.to_string(),
            doc,
        }
    }

    pub fn update(collection: &str, doc_id: impl Into<String>, op: FieldOp) -> Self {
        WriteOp::Update {
            collection: collection.to_string(),
            doc_id: doc_id.into(),
            op,
        }
    }

    pub fn delete(collection: &str, doc_id: impl Into<String>) -> Self {
        WriteOp::Delete {
            collection: collection.to_string(),
            doc_id: doc_id.into(),
        }
    }
}

/// The storage trait the membership engine depends on.
///
/// A failing op anywhere in [`apply_batch`](DocStore::apply_batch) leaves
/// every touched document unchanged.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait DocStore: Send + Sync {
    /// Create a document; fails with `AlreadyExists` if the id is taken.
    async fn create(&self, collection: &str, doc: &Document) -> Result<(), DocStoreError>;

    /// Fetch a document by id.
    async fn get(&self, collection: &str, id: &str) -> Result<Document, DocStoreError>;

    /// Delete a document by id; `NotFound` if absent.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), DocStoreError>;

    /// Apply a batch of writes atomically: all committed or none. A document
    /// created or deleted by a batch must not be addressed again by other ops
    /// in the same batch.
    async fn apply_batch(&self, ops: &[WriteOp]) -> Result<(), DocStoreError>;

    /// All documents in `collection` whose array field contains `value`.
    async fn find_array_contains(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>, DocStoreError>;

    /// All documents in `collection` whose text field equals `value`.
    async fn find_field_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>, DocStoreError>;
}
