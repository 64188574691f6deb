//! Session state, role checks and the protected-route gate.

mod guard;
mod role;
mod store;
mod user;

pub use guard::{GuardState, RouteGuard};
pub use role::{Role, has_role};
pub use store::{AuthState, AuthStore};
pub use user::{ProfilePatch, RoleField, User};
