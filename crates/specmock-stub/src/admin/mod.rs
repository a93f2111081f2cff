//! Admin API served on the stub listener under `/_specmock`:
//! - register, list, inspect and remove transient stubs
//! - recent interaction history
//! - health

mod handlers;
mod router;
pub(crate) mod types;

pub use router::{is_admin_path, route_request, ADMIN_PREFIX};
