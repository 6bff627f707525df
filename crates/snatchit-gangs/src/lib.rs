//! Gang membership and invitation core for SnatchIt.
//!
//! A gang is a shared expense group with a member roster, a subset of bosses,
//! and outstanding invitations. Membership is mirrored on each user's own
//! document (`gangs`/`gangInvites`), so every mutation spans two documents;
//! the engine keeps the two sides consistent by expressing each operation as
//! one atomic batch of commutative set operations against the document store.
//!
//! Entry points:
//! - [`MembershipEngine`] validates and applies membership transitions.
//! - [`GangRepository`] creates, reads, deletes and streams gangs.
//! - [`DirectoryCache`] resolves ids to display profiles for rosters.
//! - [`DocStoreBackend`] picks the store backend from configuration.

mod backend;
mod directory;
mod engine;
mod error;
mod identity;
mod repository;

pub use backend::DocStoreBackend;
pub use directory::{CrewProfile, DirectoryCache};
pub use engine::MembershipEngine;
pub use error::MembershipError;
pub use identity::{IdentityProvider, StoreIdentity};
pub use repository::{CascadeReport, GangRepository};
