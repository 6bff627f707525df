use snatchit_docstore::DocStoreError;
use snatchit_events::EventBusError;
use thiserror::Error;

/// Failures of membership and invitation operations.
///
/// Authorization and invariant violations are returned to the caller and
/// never retried; `StoreUnavailable` is the transient class, safe to retry
/// with the identical batch.
#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("gang not found")]
    GangNotFound,
    #[error("not authorized: {0}")]
    NotAuthorized(&'static str),
    #[error("user not found")]
    UserNotFound,
    #[error("user is already a member or has a pending invite")]
    AlreadyMemberOrInvited,
    #[error("invite not found")]
    InviteNotFound,
    #[error("cannot remove the last boss")]
    CannotRemoveLastBoss,
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error(transparent)]
    Events(#[from] EventBusError),
    #[error(transparent)]
    Store(DocStoreError),
}

impl From<DocStoreError> for MembershipError {
    fn from(e: DocStoreError) -> Self {
        match e {
            DocStoreError::Unavailable(msg) => MembershipError::StoreUnavailable(msg),
            other => MembershipError::Store(other),
        }
    }
}
