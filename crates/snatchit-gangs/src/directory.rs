//! Read-through cache of user display profiles for roster rendering.

use std::sync::Arc;

use dashmap::DashMap;

use snatchit_docstore::{DocStore, DocStoreError, Gang, UserId, UserProfile, USERS};

/// One roster row: a resolved profile plus whether the user runs the gang.
#[derive(Clone, Debug, PartialEq)]
pub struct CrewProfile {
    pub profile: UserProfile,
    pub is_boss: bool,
}

/// Maps user ids to display nickname and avatar.
///
/// On miss it reads the user document once and keeps the result for the rest
/// of the session; nicknames change rarely enough that staleness is fine.
/// Never authoritative and never consulted for membership decisions.
pub struct DirectoryCache {
    store: Arc<dyn DocStore>,
    cache: DashMap<UserId, UserProfile>,
}

impl DirectoryCache {
    pub fn new(store: Arc<dyn DocStore>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
        }
    }

    pub async fn profile(&self, user: &UserId) -> Result<UserProfile, DocStoreError> {
        if let Some(hit) = self.cache.get(user) {
            return Ok(hit.clone());
        }
        let doc = self.store.get(USERS, user.as_str()).await?;
        let profile = UserProfile::from_document(&doc);
        tracing::debug!(user = %user, "directory cache fill");
        self.cache.insert(user.clone(), profile.clone());
        Ok(profile)
    }

    /// Resolve the whole crew of a gang, bosses listed first. Users whose
    /// document cannot be read are skipped; the roster is best-effort.
    pub async fn roster(&self, gang: &Gang) -> Result<Vec<CrewProfile>, DocStoreError> {
        let mut out = Vec::with_capacity(gang.members.len());
        let ordered = gang
            .bosses
            .iter()
            .chain(gang.members.difference(&gang.bosses));
        for user in ordered {
            match self.profile(user).await {
                Ok(profile) => out.push(CrewProfile {
                    profile,
                    is_boss: gang.is_boss(user),
                }),
                Err(DocStoreError::NotFound) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }
}
