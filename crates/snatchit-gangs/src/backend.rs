//! Store backend selection from configuration.

use std::sync::Arc;

use async_trait::async_trait;

use snatchit_config::{BackendConfig, StoreKind};
use snatchit_docstore::{DocStore, DocStoreError, Document, WriteOp};
use snatchit_store_memory::MemoryDocStore;
use snatchit_store_sqlite::SqliteDocStore;

/// The configured document store, dispatching to one of the backend crates.
#[derive(Clone)]
pub enum DocStoreBackend {
    Memory(Arc<MemoryDocStore>),
    Sqlite(Arc<SqliteDocStore>),
}

impl DocStoreBackend {
    pub async fn from_config(config: &BackendConfig) -> Result<Self, DocStoreError> {
        match config.store {
            StoreKind::Memory => Ok(Self::Memory(Arc::new(MemoryDocStore::new()))),
            StoreKind::Sqlite => {
                let store = match &config.database_url {
                    Some(url) => SqliteDocStore::open(url).await?,
                    None => SqliteDocStore::open_default().await?,
                };
                Ok(Self::Sqlite(Arc::new(store)))
            }
        }
    }

    fn as_store(&self) -> &dyn DocStore {
        match self {
            Self::Memory(s) => s.as_ref(),
            Self::Sqlite(s) => s.as_ref(),
        }
    }
}

#[async_trait]
impl DocStore for DocStoreBackend {
    async fn create(&self, collection: &str, doc: &Document) -> Result<(), DocStoreError> {
        self.as_store().create(collection, doc).await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Document, DocStoreError> {
        self.as_store().get(collection, id).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), DocStoreError> {
        self.as_store().delete(collection, id).await
    }

    async fn apply_batch(&self, ops: &[WriteOp]) -> Result<(), DocStoreError> {
        self.as_store().apply_batch(ops).await
    }

    async fn find_array_contains(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>, DocStoreError> {
        self.as_store().find_array_contains(collection, field, value).await
    }

    async fn find_field_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>, DocStoreError> {
        self.as_store().find_field_eq(collection, field, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_from_config() {
        let config = BackendConfig {
            store: StoreKind::Memory,
            database_url: None,
            event_channel_capacity: 100,
        };
        let backend = DocStoreBackend::from_config(&config).await.unwrap();
        assert!(matches!(backend, DocStoreBackend::Memory(_)));

        backend.create("users", &Document::new("u1")).await.unwrap();
        assert_eq!(backend.get("users", "u1").await.unwrap().id, "u1");
    }

    #[tokio::test]
    async fn sqlite_backend_honors_database_url() {
        let config = BackendConfig {
            store: StoreKind::Sqlite,
            database_url: Some("sqlite::memory:".into()),
            event_channel_capacity: 100,
        };
        let backend = DocStoreBackend::from_config(&config).await.unwrap();
        assert!(matches!(backend, DocStoreBackend::Sqlite(_)));

        backend.create("users", &Document::new("u1")).await.unwrap();
        assert_eq!(backend.get("users", "u1").await.unwrap().id, "u1");
    }
}
