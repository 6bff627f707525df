//! User document schema: profile fields plus the denormalized membership index.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{DocStoreError, Document};

use super::{GangId, UserId};

/// Field names of the `users` collection.
pub mod user_fields {
    pub const EMAIL: &str = "email";
    pub const NICKNAME: &str = "nickname";
    pub const AVATAR: &str = "avatar";
    pub const GANGS: &str = "gangs";
    pub const GANG_INVITES: &str = "gangInvites";
}

/// Display profile of a user, as stored on their document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    pub nickname: String,
    pub avatar: Option<String>,
}

impl UserProfile {
    pub fn from_document(doc: &Document) -> Self {
        // Missing nickname renders as "Unknown" rather than failing the read.
        Self {
            id: UserId(doc.id.clone()),
            email: doc.text(user_fields::EMAIL).unwrap_or_default().to_string(),
            nickname: doc
                .text(user_fields::NICKNAME)
                .unwrap_or("Unknown")
                .to_string(),
            avatar: doc.text(user_fields::AVATAR).map(str::to_string),
        }
    }
}

/// Denormalized mirror of gang membership, stored on the user document for
/// fast "my gangs" / "my invites" reads. Kept consistent with the gang-side
/// sets by the membership engine's atomic batches.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MembershipIndex {
    pub gangs: BTreeSet<GangId>,
    pub gang_invites: BTreeSet<GangId>,
}

impl MembershipIndex {
    pub fn from_document(doc: &Document) -> Result<Self, DocStoreError> {
        Ok(Self {
            gangs: parse_gang_ids(doc, user_fields::GANGS)?,
            gang_invites: parse_gang_ids(doc, user_fields::GANG_INVITES)?,
        })
    }
}

fn parse_gang_ids(doc: &Document, field: &str) -> Result<BTreeSet<GangId>, DocStoreError> {
    doc.array(field)
        .iter()
        .map(|raw| {
            raw.parse::<GangId>().map_err(|e| {
                DocStoreError::Backend(format!("user {}: bad gang id {:?}: {}", doc.id, raw, e))
            })
        })
        .collect()
}
