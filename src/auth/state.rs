//! Authentication state trait and macro.

use crate::session::SessionManager;

/// Trait for state types that can authenticate requests.
pub trait HasAuthBackend {
    fn sessions(&self) -> &SessionManager;
    fn secure_cookies(&self) -> bool;
    fn trust_proxy(&self) -> bool;
}

/// Macro to implement `HasAuthBackend` for state structs with the standard fields.
///
/// The struct must have these fields:
/// - `sessions: Arc<SessionManager>`
/// - `settings: ServerSettings`
///
/// # Example
/// ```ignore
/// #[derive(Clone)]
/// pub struct MyState {
///     pub sessions: Arc<SessionManager>,
///     pub settings: ServerSettings,
/// }
///
/// impl_has_auth_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn sessions(&self) -> &$crate::session::SessionManager {
                &self.sessions
            }
            fn secure_cookies(&self) -> bool {
                self.settings.secure_cookies
            }
            fn trust_proxy(&self) -> bool {
                self.settings.trust_proxy
            }
        }
    };
}

/// Request-handling settings shared by every route.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerSettings {
    /// Set the Secure flag on cookies (HTTPS deployments)
    pub secure_cookies: bool,
    /// Take the client IP from X-Forwarded-For
    pub trust_proxy: bool,
}
