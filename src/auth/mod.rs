//! HTTP side of authentication.
//!
//! Access tokens arrive as `Authorization: Bearer` headers and are checked
//! statelessly plus one principal lookup per request. Refresh tokens arrive
//! only in an HttpOnly cookie and are handled by the `/api/auth` routes.

mod cookie;
mod errors;
mod extractors;
mod ip;
mod state;

pub use cookie::{
    REFRESH_COOKIE_NAME, clear_refresh_cookie, get_cookie, refresh_cookie, refresh_token,
};
pub use errors::{ApiAuthError, AuthErrorKind};
pub use extractors::{AdminOnly, Auth, Client, OptionalAuth, bearer_token};
pub use ip::{HasHeadersAndExtensions, extract_client_ip, extract_user_agent, session_metadata};
pub use state::{HasAuthBackend, ServerSettings};
