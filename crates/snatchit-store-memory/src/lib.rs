//! In-memory document store backend.
//!
//! Suitable for tests and single-process deployments. The whole keyspace sits
//! behind one async mutex, which is what gives batches their all-or-nothing
//! guarantee here: a batch validates every target document before applying any
//! op, while holding the lock.

use std::collections::HashMap;

use tokio::sync::Mutex;

use snatchit_docstore::{DocStore, DocStoreError, Document, FieldValue, WriteOp};

#[derive(Default)]
pub struct MemoryDocStore {
    docs: Mutex<HashMap<(String, String), Document>>,
}

impl MemoryDocStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl DocStore for MemoryDocStore {
    async fn create(&self, collection: &str, doc: &Document) -> Result<(), DocStoreError> {
        let mut docs = self.docs.lock().await;
        let key = (collection.to_string(), doc.id.clone());
        if docs.contains_key(&key) {
            return Err(DocStoreError::AlreadyExists);
        }
        docs.insert(key, doc.clone());
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Document, DocStoreError> {
        let docs = self.docs.lock().await;
        docs.get(&(collection.to_string(), id.to_string()))
            .cloned()
            .ok_or(DocStoreError::NotFound)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), DocStoreError> {
        let mut docs = self.docs.lock().await;
        docs.remove(&(collection.to_string(), id.to_string()))
            .map(|_| ())
            .ok_or(DocStoreError::NotFound)
    }

    async fn apply_batch(&self, ops: &[WriteOp]) -> Result<(), DocStoreError> {
        let mut docs = self.docs.lock().await;

        // Validate before mutating so a failing batch changes nothing.
        for op in ops {
            match op {
                WriteOp::Create { collection, doc } => {
                    if docs.contains_key(&(collection.clone(), doc.id.clone())) {
                        return Err(DocStoreError::AlreadyExists);
                    }
                }
                WriteOp::Update {
                    collection, doc_id, ..
                }
                | WriteOp::Delete { collection, doc_id } => {
                    if !docs.contains_key(&(collection.clone(), doc_id.clone())) {
                        return Err(DocStoreError::NotFound);
                    }
                }
            }
        }
        for op in ops {
            match op {
                WriteOp::Create { collection, doc } => {
                    docs.insert((collection.clone(), doc.id.clone()), doc.clone());
                }
                WriteOp::Update {
                    collection,
                    doc_id,
                    op,
                } => {
                    if let Some(doc) = docs.get_mut(&(collection.clone(), doc_id.clone())) {
                        doc.apply(op);
                    }
                }
                WriteOp::Delete { collection, doc_id } => {
                    docs.remove(&(collection.clone(), doc_id.clone()));
                }
            }
        }
        Ok(())
    }

    async fn find_array_contains(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>, DocStoreError> {
        let docs = self.docs.lock().await;
        Ok(docs
            .iter()
            .filter(|((coll, _), _)| coll == collection)
            .filter(|(_, doc)| doc.array(field).contains(value))
            .map(|(_, doc)| doc.clone())
            .collect())
    }

    async fn find_field_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>, DocStoreError> {
        let docs = self.docs.lock().await;
        Ok(docs
            .iter()
            .filter(|((coll, _), _)| coll == collection)
            .filter(|(_, doc)| matches!(doc.fields.get(field), Some(FieldValue::Text(t)) if t == value))
            .map(|(_, doc)| doc.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snatchit_docstore::FieldOp;
    use std::collections::BTreeSet;

    fn user_doc(id: &str, email: &str) -> Document {
        Document::new(id).with_field("email", FieldValue::Text(email.to_string()))
    }

    #[tokio::test]
    async fn create_get_delete_roundtrip() {
        let s = MemoryDocStore::new();
        let doc = user_doc("u1", "u1@x.com");

        s.create("users", &doc).await.unwrap();
        let got = s.get("users", "u1").await.unwrap();
        assert_eq!(got, doc);

        s.delete("users", "u1").await.unwrap();
        assert!(matches!(
            s.get("users", "u1").await,
            Err(DocStoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn duplicate_create_maps_to_alreadyexists() {
        let s = MemoryDocStore::new();
        let doc = user_doc("u1", "u1@x.com");
        s.create("users", &doc).await.unwrap();
        let err = s.create("users", &doc).await.unwrap_err();
        assert!(matches!(err, DocStoreError::AlreadyExists));
    }

    #[tokio::test]
    async fn batch_applies_all_ops() {
        let s = MemoryDocStore::new();
        s.create("gangs", &Document::new("g1")).await.unwrap();
        s.create("users", &user_doc("u1", "u1@x.com")).await.unwrap();

        s.apply_batch(&[
            WriteOp::update("gangs", "g1", FieldOp::array_union("pendingInvites", "u1")),
            WriteOp::update("users", "u1", FieldOp::array_union("gangInvites", "g1")),
        ])
        .await
        .unwrap();

        assert!(s.get("gangs", "g1").await.unwrap().array("pendingInvites").contains("u1"));
        assert!(s.get("users", "u1").await.unwrap().array("gangInvites").contains("g1"));
    }

    #[tokio::test]
    async fn batch_with_missing_doc_changes_nothing() {
        let s = MemoryDocStore::new();
        s.create("gangs", &Document::new("g1")).await.unwrap();

        let err = s
            .apply_batch(&[
                WriteOp::update("gangs", "g1", FieldOp::array_union("members", "u1")),
                WriteOp::update("users", "missing", FieldOp::array_union("gangs", "g1")),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, DocStoreError::NotFound));

        // First op must not have been applied.
        assert!(s.get("gangs", "g1").await.unwrap().array("members").is_empty());
    }

    #[tokio::test]
    async fn batch_mixes_create_update_delete() {
        let s = MemoryDocStore::new();
        s.create("users", &user_doc("u1", "u1@x.com")).await.unwrap();
        s.create("gangs", &Document::new("old")).await.unwrap();

        s.apply_batch(&[
            WriteOp::create("gangs", Document::new("g1")),
            WriteOp::update("users", "u1", FieldOp::array_union("gangs", "g1")),
            WriteOp::delete("gangs", "old"),
        ])
        .await
        .unwrap();

        assert!(s.get("gangs", "g1").await.is_ok());
        assert!(s.get("users", "u1").await.unwrap().array("gangs").contains("g1"));
        assert!(matches!(s.get("gangs", "old").await, Err(DocStoreError::NotFound)));
    }

    #[tokio::test]
    async fn batch_create_of_taken_id_changes_nothing() {
        let s = MemoryDocStore::new();
        s.create("gangs", &Document::new("g1")).await.unwrap();
        s.create("users", &user_doc("u1", "u1@x.com")).await.unwrap();

        let err = s
            .apply_batch(&[
                WriteOp::update("users", "u1", FieldOp::array_union("gangs", "g1")),
                WriteOp::create("gangs", Document::new("g1")),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, DocStoreError::AlreadyExists));
        assert!(s.get("users", "u1").await.unwrap().array("gangs").is_empty());
    }

    #[tokio::test]
    async fn repeated_union_is_idempotent() {
        let s = MemoryDocStore::new();
        s.create("gangs", &Document::new("g1")).await.unwrap();

        let op = [WriteOp::update("gangs", "g1", FieldOp::array_union("members", "u1"))];
        s.apply_batch(&op).await.unwrap();
        s.apply_batch(&op).await.unwrap();

        assert_eq!(
            s.get("gangs", "g1").await.unwrap().array("members"),
            BTreeSet::from(["u1".to_string()])
        );
    }

    #[tokio::test]
    async fn find_array_contains_scopes_by_collection_and_value() {
        let s = MemoryDocStore::new();
        s.create("gangs", &Document::new("g1")).await.unwrap();
        s.create("gangs", &Document::new("g2")).await.unwrap();
        s.create("users", &user_doc("u1", "u1@x.com")).await.unwrap();

        s.apply_batch(&[
            WriteOp::update("gangs", "g1", FieldOp::array_union("members", "u1")),
            WriteOp::update("gangs", "g2", FieldOp::array_union("members", "u2")),
            WriteOp::update("users", "u1", FieldOp::array_union("gangs", "g1")),
        ])
        .await
        .unwrap();

        let hits = s.find_array_contains("gangs", "members", "u1").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "g1");
    }

    #[tokio::test]
    async fn find_field_eq_matches_exact_text() {
        let s = MemoryDocStore::new();
        s.create("users", &user_doc("u1", "u1@x.com")).await.unwrap();
        s.create("users", &user_doc("u2", "u2@x.com")).await.unwrap();

        let hits = s.find_field_eq("users", "email", "u2@x.com").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "u2");

        let none = s.find_field_eq("users", "email", "nobody@x.com").await.unwrap();
        assert!(none.is_empty());
    }
}
