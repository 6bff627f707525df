//! Domain document schemas and typed identifiers.

mod gangs;
mod ids;
mod users;

pub use gangs::*;
pub use ids::*;
pub use users::*;
