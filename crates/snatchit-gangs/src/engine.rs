//! The membership state machine.
//!
//! Every mutation is validated against the current gang snapshot and then
//! issued as exactly one atomic multi-document batch. The engine never does a
//! read-modify-write across two documents outside a batch; that discipline is
//! what keeps the gang-side sets and the user-side back-references in sync.

use std::sync::Arc;

use snatchit_docstore::{
    gang_fields, user_fields, DocStore, DocStoreError, FieldOp, Gang, GangId, UserId, WriteOp,
    GANGS, USERS,
};

use crate::error::MembershipError;
use crate::identity::IdentityProvider;
use crate::repository::GangRepository;

/// How often a transiently failing batch is attempted before giving up.
/// Retrying the identical batch is safe: every op in it is idempotent.
const BATCH_ATTEMPTS: u32 = 3;

pub struct MembershipEngine {
    store: Arc<dyn DocStore>,
    repo: Arc<GangRepository>,
    identity: Arc<dyn IdentityProvider>,
}

impl MembershipEngine {
    pub fn new(
        store: Arc<dyn DocStore>,
        repo: Arc<GangRepository>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            store,
            repo,
            identity,
        }
    }

    /// Invite a user by id or email (anything containing `@` is treated as an
    /// email). Boss only. Returns the resolved id of the invitee.
    ///
    /// Re-inviting an already-pending user succeeds without writing anything;
    /// concurrent double-invites are expected under multiple bosses.
    pub async fn invite(
        &self,
        gang_id: &GangId,
        actor: &UserId,
        target: &str,
    ) -> Result<UserId, MembershipError> {
        let gang = self.repo.get(gang_id).await?;
        if !gang.is_boss(actor) {
            return Err(MembershipError::NotAuthorized("only a boss may recruit"));
        }
        let user = self.resolve_target(target).await?;
        if gang.is_member(&user) {
            return Err(MembershipError::AlreadyMemberOrInvited);
        }
        if gang.has_pending_invite(&user) {
            return Ok(user);
        }

        let gid = gang_id.to_string();
        self.apply_with_retry(&[
            WriteOp::update(
                GANGS,
                gid.clone(),
                FieldOp::array_union(gang_fields::PENDING_INVITES, user.as_str()),
            ),
            WriteOp::update(
                USERS,
                user.as_str(),
                FieldOp::array_union(user_fields::GANG_INVITES, gid),
            ),
        ])
        .await?;
        tracing::info!(gang = %gang_id, actor = %actor, user = %user, "invite sent");
        self.repo.publish_snapshot(gang_id).await;
        Ok(user)
    }

    /// Accept an outstanding invite: the user moves from `pendingInvites` to
    /// `members` on the gang and from `gangInvites` to `gangs` on their own
    /// document, all in one batch.
    pub async fn accept_invite(
        &self,
        gang_id: &GangId,
        user: &UserId,
    ) -> Result<(), MembershipError> {
        let gang = self.repo.get(gang_id).await?;
        if !gang.has_pending_invite(user) {
            // Already accepted, or revoked by a concurrent boss.
            return Err(MembershipError::InviteNotFound);
        }

        let gid = gang_id.to_string();
        self.apply_with_retry(&[
            WriteOp::update(
                GANGS,
                gid.clone(),
                FieldOp::array_union(gang_fields::MEMBERS, user.as_str()),
            ),
            WriteOp::update(
                GANGS,
                gid.clone(),
                FieldOp::array_remove(gang_fields::PENDING_INVITES, user.as_str()),
            ),
            WriteOp::update(
                USERS,
                user.as_str(),
                FieldOp::array_union(user_fields::GANGS, gid.clone()),
            ),
            WriteOp::update(
                USERS,
                user.as_str(),
                FieldOp::array_remove(user_fields::GANG_INVITES, gid),
            ),
        ])
        .await?;
        tracing::info!(gang = %gang_id, user = %user, "invite accepted");
        self.repo.publish_snapshot(gang_id).await;
        Ok(())
    }

    /// Turn down an invite. Idempotent: declining an invite that no longer
    /// exists succeeds silently, and a dangling invite to an already busted-up
    /// gang is cleaned from the user document.
    pub async fn decline_invite(
        &self,
        gang_id: &GangId,
        user: &UserId,
    ) -> Result<(), MembershipError> {
        let gid = gang_id.to_string();
        let user_side = WriteOp::update(
            USERS,
            user.as_str(),
            FieldOp::array_remove(user_fields::GANG_INVITES, gid.clone()),
        );

        match self.repo.get(gang_id).await {
            Ok(_) => {
                self.apply_with_retry(&[
                    WriteOp::update(
                        GANGS,
                        gid,
                        FieldOp::array_remove(gang_fields::PENDING_INVITES, user.as_str()),
                    ),
                    user_side,
                ])
                .await?;
                tracing::info!(gang = %gang_id, user = %user, "invite declined");
                self.repo.publish_snapshot(gang_id).await;
            }
            Err(MembershipError::GangNotFound) => {
                self.apply_with_retry(&[user_side]).await?;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Remove a member; boss only. Kicking someone who already left is a
    /// benign no-op (concurrent double-kick is expected).
    pub async fn kick(
        &self,
        gang_id: &GangId,
        actor: &UserId,
        target: &UserId,
    ) -> Result<(), MembershipError> {
        let gang = self.repo.get(gang_id).await?;
        if !gang.is_boss(actor) {
            return Err(MembershipError::NotAuthorized("only a boss may kick"));
        }
        self.remove_member(gang_id, target, &gang).await
    }

    /// Leave the gang; a self-service kick with the same last-boss guard.
    pub async fn leave(&self, gang_id: &GangId, user: &UserId) -> Result<(), MembershipError> {
        let gang = self.repo.get(gang_id).await?;
        self.remove_member(gang_id, user, &gang).await
    }

    /// Withdraw an outstanding invite; boss only. Idempotent like decline.
    pub async fn revoke_invite(
        &self,
        gang_id: &GangId,
        actor: &UserId,
        target: &UserId,
    ) -> Result<(), MembershipError> {
        let gang = self.repo.get(gang_id).await?;
        if !gang.is_boss(actor) {
            return Err(MembershipError::NotAuthorized(
                "only a boss may revoke an invite",
            ));
        }

        let gid = gang_id.to_string();
        self.apply_with_retry(&[
            WriteOp::update(
                GANGS,
                gid.clone(),
                FieldOp::array_remove(gang_fields::PENDING_INVITES, target.as_str()),
            ),
            WriteOp::update(
                USERS,
                target.as_str(),
                FieldOp::array_remove(user_fields::GANG_INVITES, gid),
            ),
        ])
        .await?;
        tracing::info!(gang = %gang_id, actor = %actor, user = %target, "invite revoked");
        self.repo.publish_snapshot(gang_id).await;
        Ok(())
    }

    async fn remove_member(
        &self,
        gang_id: &GangId,
        target: &UserId,
        gang: &Gang,
    ) -> Result<(), MembershipError> {
        if !gang.is_member(target) {
            return Ok(());
        }
        if gang.is_last_boss(target) {
            return Err(MembershipError::CannotRemoveLastBoss);
        }

        let gid = gang_id.to_string();
        self.apply_with_retry(&[
            WriteOp::update(
                GANGS,
                gid.clone(),
                FieldOp::array_remove(gang_fields::MEMBERS, target.as_str()),
            ),
            WriteOp::update(
                GANGS,
                gid.clone(),
                FieldOp::array_remove(gang_fields::BOSSES, target.as_str()),
            ),
            WriteOp::update(
                USERS,
                target.as_str(),
                FieldOp::array_remove(user_fields::GANGS, gid),
            ),
        ])
        .await?;
        tracing::info!(gang = %gang_id, user = %target, "member removed");
        self.repo.publish_snapshot(gang_id).await;
        Ok(())
    }

    /// Resolve the invite target captured at lookup time; a concurrent email
    /// change after the lookup is acceptable (last-resolved-wins).
    async fn resolve_target(&self, target: &str) -> Result<UserId, MembershipError> {
        if target.contains('@') {
            return self
                .identity
                .resolve_email(target)
                .await?
                .ok_or(MembershipError::UserNotFound);
        }
        let id = UserId::from(target);
        match self.store.get(USERS, id.as_str()).await {
            Ok(_) => Ok(id),
            Err(DocStoreError::NotFound) => Err(MembershipError::UserNotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn apply_with_retry(&self, ops: &[WriteOp]) -> Result<(), MembershipError> {
        let mut attempt = 1;
        loop {
            match self.store.apply_batch(ops).await {
                Err(DocStoreError::Unavailable(msg)) if attempt < BATCH_ATTEMPTS => {
                    tracing::warn!(attempt, error = %msg, "store unavailable, retrying batch");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
                Ok(()) => return Ok(()),
            }
        }
    }
}
