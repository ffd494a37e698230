//! Refresh-token sessions.
//!
//! Every live refresh token has exactly one [`SessionRecord`] in the
//! [`SessionRegistry`]. A token with a valid signature and expiry is still
//! refused when its record is gone: rotated, logged out, or idle-evicted.

mod manager;
mod registry;

pub use manager::{AuthFailure, RotationError, SessionManager, SessionSummary};
pub use registry::{SessionMetadata, SessionRecord, SessionRegistry};
