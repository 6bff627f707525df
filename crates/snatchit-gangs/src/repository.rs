//! Durable storage and live-subscription surface for gang documents.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tokio_stream::StreamExt;

use snatchit_docstore::{
    gang_fields, user_fields, DocStore, DocStoreError, FieldOp, Gang, GangId, GangMetadata,
    UserId, WriteOp, GANGS, USERS,
};
use snatchit_events::{EventBus, GangEvent, GangEventKind, GangStream};

use crate::error::MembershipError;

/// Outcome of the back-reference cascade of [`GangRepository::bust_up`].
///
/// The gang deletion itself has already committed; `stale` names the users
/// whose `gangs`/`gangInvites` entries could not be cleaned and are left for
/// lazy reconciliation.
#[derive(Debug, Default)]
pub struct CascadeReport {
    pub stale: Vec<UserId>,
}

impl CascadeReport {
    pub fn is_clean(&self) -> bool {
        self.stale.is_empty()
    }
}

/// Owns the durable representation of gangs and publishes committed changes
/// to the event bus. All multi-document writes go through atomic batches.
pub struct GangRepository {
    store: Arc<dyn DocStore>,
    events: Arc<dyn EventBus>,
}

impl GangRepository {
    pub fn new(store: Arc<dyn DocStore>, events: Arc<dyn EventBus>) -> Self {
        Self { store, events }
    }

    /// Found a gang: the founder becomes the sole boss and member. The gang
    /// document and the founder's back-reference commit in one batch.
    pub async fn create(
        &self,
        founder: &UserId,
        metadata: GangMetadata,
    ) -> Result<Gang, MembershipError> {
        let gang = Gang {
            id: GangId::new(),
            name: metadata.name,
            description: metadata.description,
            avatar: metadata.avatar,
            members: BTreeSet::from([founder.clone()]),
            bosses: BTreeSet::from([founder.clone()]),
            pending_invites: BTreeSet::new(),
            created_at: Utc::now(),
        };
        self.store
            .apply_batch(&[
                WriteOp::create(GANGS, gang.to_document()),
                WriteOp::update(
                    USERS,
                    founder.as_str(),
                    FieldOp::array_union(user_fields::GANGS, gang.id.to_string()),
                ),
            ])
            .await
            .map_err(|e| match e {
                DocStoreError::NotFound => MembershipError::UserNotFound,
                other => other.into(),
            })?;
        tracing::info!(gang = %gang.id, founder = %founder, "gang created");
        self.publish(GangEventKind::Created, &gang.id, Some(gang.clone())).await;
        Ok(gang)
    }

    pub async fn get(&self, gang_id: &GangId) -> Result<Gang, MembershipError> {
        let doc = self
            .store
            .get(GANGS, &gang_id.to_string())
            .await
            .map_err(|e| match e {
                DocStoreError::NotFound => MembershipError::GangNotFound,
                other => other.into(),
            })?;
        Ok(Gang::from_document(&doc)?)
    }

    /// Live feed of a gang: the current snapshot first, then one event per
    /// committed mutation until the stream is dropped. Snapshots are
    /// eventually consistent, not authoritative reads at an instant.
    pub async fn subscribe(&self, gang_id: &GangId) -> Result<GangStream, MembershipError> {
        let current = self.get(gang_id).await?;
        let live = self.events.subscribe(gang_id).await?;
        let initial = GangEvent {
            kind: GangEventKind::Updated,
            gang_id: *gang_id,
            snapshot: Some(current),
            timestamp: Utc::now().timestamp(),
        };
        Ok(Box::pin(tokio_stream::once(initial).chain(live)))
    }

    /// Gangs the user belongs to ("my gangs").
    pub async fn find_by_member(&self, user: &UserId) -> Result<Vec<Gang>, MembershipError> {
        self.find_where(gang_fields::MEMBERS, user).await
    }

    /// Gangs holding an outstanding invite for the user ("my invites").
    pub async fn find_by_pending_invite(
        &self,
        user: &UserId,
    ) -> Result<Vec<Gang>, MembershipError> {
        self.find_where(gang_fields::PENDING_INVITES, user).await
    }

    async fn find_where(
        &self,
        field: &str,
        user: &UserId,
    ) -> Result<Vec<Gang>, MembershipError> {
        let docs = self
            .store
            .find_array_contains(GANGS, field, user.as_str())
            .await?;
        docs.iter()
            .map(|doc| Gang::from_document(doc).map_err(Into::into))
            .collect()
    }

    /// Change display metadata; any boss may do this. An empty name keeps the
    /// current one, and absent description/avatar are left untouched.
    pub async fn update_details(
        &self,
        gang_id: &GangId,
        actor: &UserId,
        changes: GangMetadata,
    ) -> Result<Gang, MembershipError> {
        let gang = self.get(gang_id).await?;
        if !gang.is_boss(actor) {
            return Err(MembershipError::NotAuthorized(
                "only a boss may edit gang details",
            ));
        }

        let gid = gang_id.to_string();
        let mut ops = Vec::new();
        if !changes.name.is_empty() {
            ops.push(WriteOp::update(
                GANGS,
                gid.clone(),
                FieldOp::set_text(gang_fields::NAME, changes.name),
            ));
        }
        if let Some(description) = changes.description {
            ops.push(WriteOp::update(
                GANGS,
                gid.clone(),
                FieldOp::set_text(gang_fields::DESCRIPTION, description),
            ));
        }
        if let Some(avatar) = changes.avatar {
            ops.push(WriteOp::update(
                GANGS,
                gid,
                FieldOp::set_text(gang_fields::AVATAR, avatar),
            ));
        }
        if !ops.is_empty() {
            self.store.apply_batch(&ops).await.map_err(|e| match e {
                DocStoreError::NotFound => MembershipError::GangNotFound,
                other => other.into(),
            })?;
            tracing::info!(gang = %gang_id, actor = %actor, "gang details updated");
        }

        let updated = self.get(gang_id).await?;
        self.publish(GangEventKind::Updated, gang_id, Some(updated.clone())).await;
        Ok(updated)
    }

    /// Bust up (delete) the gang; boss only. The deletion commits first, then
    /// every member's and invitee's back-reference is stripped best-effort.
    pub async fn bust_up(
        &self,
        gang_id: &GangId,
        actor: &UserId,
    ) -> Result<CascadeReport, MembershipError> {
        let gang = self.get(gang_id).await?;
        if !gang.is_boss(actor) {
            return Err(MembershipError::NotAuthorized(
                "only a boss may bust up a gang",
            ));
        }

        self.store
            .delete(GANGS, &gang_id.to_string())
            .await
            .map_err(|e| match e {
                DocStoreError::NotFound => MembershipError::GangNotFound,
                other => other.into(),
            })?;
        tracing::info!(gang = %gang_id, actor = %actor, "gang busted up");

        let gid = gang_id.to_string();
        let mut report = CascadeReport::default();
        for user in gang.back_referenced_users() {
            let ops = [
                WriteOp::update(
                    USERS,
                    user.as_str(),
                    FieldOp::array_remove(user_fields::GANGS, gid.clone()),
                ),
                WriteOp::update(
                    USERS,
                    user.as_str(),
                    FieldOp::array_remove(user_fields::GANG_INVITES, gid.clone()),
                ),
            ];
            match self.store.apply_batch(&ops).await {
                Ok(()) => {}
                // A missing user document carries no back-reference to clean.
                Err(DocStoreError::NotFound) => {}
                Err(e) => {
                    tracing::warn!(
                        gang = %gang_id,
                        user = %user,
                        error = %e,
                        "cascade cleanup failed, back-reference left stale"
                    );
                    report.stale.push(user);
                }
            }
        }

        self.publish(GangEventKind::BustedUp, gang_id, None).await;
        Ok(report)
    }

    /// Re-read the gang and broadcast its post-mutation snapshot.
    pub(crate) async fn publish_snapshot(&self, gang_id: &GangId) {
        match self.get(gang_id).await {
            Ok(gang) => self.publish(GangEventKind::Updated, gang_id, Some(gang)).await,
            Err(e) => {
                tracing::warn!(gang = %gang_id, error = %e, "snapshot publish skipped");
            }
        }
    }

    /// Delivery is best-effort: a publish failure never fails the mutation
    /// that already committed; watchers resync from the repository.
    async fn publish(&self, kind: GangEventKind, gang_id: &GangId, snapshot: Option<Gang>) {
        let event = GangEvent {
            kind,
            gang_id: *gang_id,
            snapshot,
            timestamp: Utc::now().timestamp(),
        };
        if let Err(e) = self.events.publish(gang_id, event).await {
            tracing::warn!(gang = %gang_id, error = %e, "event publish failed");
        }
    }
}
