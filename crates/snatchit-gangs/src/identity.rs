//! Identity provider seam.
//!
//! Authentication itself lives elsewhere; the membership core only needs to
//! turn an email into a stable user id and to know who is signed in.

use std::sync::Arc;

use async_trait::async_trait;

use snatchit_docstore::{user_fields, DocStore, DocStoreError, UserId, USERS};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve an email address to a user id, if any user has it.
    async fn resolve_email(&self, email: &str) -> Result<Option<UserId>, DocStoreError>;

    /// Id of the signed-in user, if any.
    fn current_user_id(&self) -> Option<UserId>;
}

/// Identity provider backed by the `users` collection: email resolution is a
/// field-equality query against user documents.
pub struct StoreIdentity {
    store: Arc<dyn DocStore>,
    current: Option<UserId>,
}

impl StoreIdentity {
    pub fn new(store: Arc<dyn DocStore>, current: Option<UserId>) -> Self {
        Self { store, current }
    }
}

#[async_trait]
impl IdentityProvider for StoreIdentity {
    async fn resolve_email(&self, email: &str) -> Result<Option<UserId>, DocStoreError> {
        let hits = self
            .store
            .find_field_eq(USERS, user_fields::EMAIL, email)
            .await?;
        Ok(hits.first().map(|doc| UserId(doc.id.clone())))
    }

    fn current_user_id(&self) -> Option<UserId> {
        self.current.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snatchit_docstore::{Document, FieldValue};
    use snatchit_store_memory::MemoryDocStore;

    async fn seeded_store() -> Arc<MemoryDocStore> {
        let store = Arc::new(MemoryDocStore::new());
        store
            .create(
                USERS,
                &Document::new("uid-1")
                    .with_field(user_fields::EMAIL, FieldValue::Text("a@x.com".into())),
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn resolves_known_email() {
        let identity = StoreIdentity::new(seeded_store().await, None);
        let id = identity.resolve_email("a@x.com").await.unwrap();
        assert_eq!(id, Some(UserId::from("uid-1")));
    }

    #[tokio::test]
    async fn unknown_email_resolves_to_none() {
        let identity = StoreIdentity::new(seeded_store().await, None);
        assert_eq!(identity.resolve_email("b@x.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn reports_signed_in_user() {
        let store = seeded_store().await;
        let identity = StoreIdentity::new(store.clone(), Some(UserId::from("uid-1")));
        assert_eq!(identity.current_user_id(), Some(UserId::from("uid-1")));

        let anonymous = StoreIdentity::new(store, None);
        assert!(anonymous.current_user_id().is_none());
    }
}
