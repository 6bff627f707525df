//! Gang document schema: the shared budget group with its membership sets.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DocStoreError, Document, FieldValue};

use super::{GangId, UserId};

/// Field names of the `gangs` collection.
pub mod gang_fields {
    pub const NAME: &str = "name";
    pub const DESCRIPTION: &str = "description";
    pub const AVATAR: &str = "avatar";
    pub const MEMBERS: &str = "members";
    pub const BOSSES: &str = "bosses";
    pub const PENDING_INVITES: &str = "pendingInvites";
    pub const CREATED_AT: &str = "createdAt";
}

/// A gang: member and boss rosters plus the outstanding invitations.
///
/// Only user ids are stored; nicknames and avatars are resolved on demand
/// from the `users` collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gang {
    pub id: GangId,
    pub name: String,
    pub description: Option<String>,
    pub avatar: Option<String>,
    pub members: BTreeSet<UserId>,
    pub bosses: BTreeSet<UserId>,
    pub pending_invites: BTreeSet<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Gang {
    pub fn is_boss(&self, user: &UserId) -> bool {
        self.bosses.contains(user)
    }

    pub fn is_member(&self, user: &UserId) -> bool {
        self.members.contains(user)
    }

    pub fn has_pending_invite(&self, user: &UserId) -> bool {
        self.pending_invites.contains(user)
    }

    /// True when removing `user` would leave the gang without any boss.
    pub fn is_last_boss(&self, user: &UserId) -> bool {
        self.bosses.len() == 1 && self.bosses.contains(user)
    }

    /// Everyone holding a back-reference to this gang on their user document.
    pub fn back_referenced_users(&self) -> BTreeSet<UserId> {
        self.members.union(&self.pending_invites).cloned().collect()
    }

    pub fn to_document(&self) -> Document {
        let mut doc = Document::new(self.id.to_string())
            .with_field(gang_fields::NAME, FieldValue::Text(self.name.clone()))
            .with_field(
                gang_fields::MEMBERS,
                FieldValue::Array(self.members.iter().map(|u| u.0.clone()).collect()),
            )
            .with_field(
                gang_fields::BOSSES,
                FieldValue::Array(self.bosses.iter().map(|u| u.0.clone()).collect()),
            )
            .with_field(
                gang_fields::PENDING_INVITES,
                FieldValue::Array(self.pending_invites.iter().map(|u| u.0.clone()).collect()),
            )
            .with_field(
                gang_fields::CREATED_AT,
                FieldValue::Timestamp(self.created_at),
            );
        if let Some(desc) = &self.description {
            doc = doc.with_field(gang_fields::DESCRIPTION, FieldValue::Text(desc.clone()));
        }
        if let Some(avatar) = &self.avatar {
            doc = doc.with_field(gang_fields::AVATAR, FieldValue::Text(avatar.clone()));
        }
        doc
    }

    pub fn from_document(doc: &Document) -> Result<Self, DocStoreError> {
        let id = doc
            .id
            .parse::<GangId>()
            .map_err(|e| DocStoreError::Backend(format!("bad gang id {:?}: {}", doc.id, e)))?;
        let name = doc
            .text(gang_fields::NAME)
            .ok_or_else(|| DocStoreError::Backend(format!("gang {} has no name", doc.id)))?
            .to_string();
        let created_at = doc
            .timestamp(gang_fields::CREATED_AT)
            .ok_or_else(|| DocStoreError::Backend(format!("gang {} has no createdAt", doc.id)))?;
        Ok(Self {
            id,
            name,
            description: doc.text(gang_fields::DESCRIPTION).map(str::to_string),
            avatar: doc.text(gang_fields::AVATAR).map(str::to_string),
            members: doc
                .array(gang_fields::MEMBERS)
                .into_iter()
                .map(UserId)
                .collect(),
            bosses: doc
                .array(gang_fields::BOSSES)
                .into_iter()
                .map(UserId)
                .collect(),
            pending_invites: doc
                .array(gang_fields::PENDING_INVITES)
                .into_iter()
                .map(UserId)
                .collect(),
            created_at,
        })
    }
}

/// Display metadata supplied when founding a gang.
#[derive(Clone, Debug, Default)]
pub struct GangMetadata {
    pub name: String,
    pub description: Option<String>,
    pub avatar: Option<String>,
}
