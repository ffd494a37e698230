//! Access and refresh token issuance and verification.
//!
//! Both token classes carry the same claim set but are signed with
//! independent secrets, so a valid access token can never be replayed as a
//! refresh token or the other way around. Expiry is checked against the
//! injected [`Clock`] rather than the system time.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::clock::Clock;
use crate::principal::{Principal, Role};

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived bearer credential for API calls
    Access,
    /// Long-lived credential exchanged for a new pair; doubles as the session key
    Refresh,
}

/// Claims embedded in both token classes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (principal id)
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub tenant_id: String,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Unique per issuance, so two tokens minted in the same second differ
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Access token duration: 15 minutes
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 15 * 60;

/// Refresh token duration: 7 days
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Token lifetimes in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access_secs: u64,
    pub refresh_secs: u64,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access_secs: ACCESS_TOKEN_DURATION_SECS,
            refresh_secs: REFRESH_TOKEN_DURATION_SECS,
        }
    }
}

/// A freshly signed token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The JWT token string
    pub token: String,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

/// An access/refresh pair issued together.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

/// Failure to sign a token.
#[derive(Debug, thiserror::Error)]
#[error("failed to encode token: {0}")]
pub struct TokenError(#[from] jsonwebtoken::errors::Error);

/// Why a token was rejected. Only ever logged; callers expose a single
/// "invalid" outcome regardless of the variant.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("malformed token: {0}")]
    Malformed(jsonwebtoken::errors::Error),
    #[error("bad signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("wrong token type")]
    WrongTokenType,
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Signs and verifies access and refresh tokens. Stateless apart from the clock.
pub struct TokenCodec {
    access: KeyPair,
    refresh: KeyPair,
    lifetimes: TokenLifetimes,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    /// Create a codec with the default 15 minute / 7 day lifetimes.
    pub fn new(access_secret: &[u8], refresh_secret: &[u8], clock: Arc<dyn Clock>) -> Self {
        Self::with_lifetimes(
            access_secret,
            refresh_secret,
            TokenLifetimes::default(),
            clock,
        )
    }

    pub fn with_lifetimes(
        access_secret: &[u8],
        refresh_secret: &[u8],
        lifetimes: TokenLifetimes,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            access: KeyPair::from_secret(access_secret),
            refresh: KeyPair::from_secret(refresh_secret),
            lifetimes,
            clock,
        }
    }

    pub fn issue_access_token(&self, principal: &Principal) -> Result<IssuedToken, TokenError> {
        self.issue(
            principal,
            TokenType::Access,
            self.lifetimes.access_secs,
            &self.access,
        )
    }

    pub fn issue_refresh_token(&self, principal: &Principal) -> Result<IssuedToken, TokenError> {
        self.issue(
            principal,
            TokenType::Refresh,
            self.lifetimes.refresh_secs,
            &self.refresh,
        )
    }

    pub fn issue_pair(&self, principal: &Principal) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access: self.issue_access_token(principal)?,
            refresh: self.issue_refresh_token(principal)?,
        })
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims, VerifyError> {
        self.verify(token, TokenType::Access, &self.access)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<Claims, VerifyError> {
        self.verify(token, TokenType::Refresh, &self.refresh)
    }

    fn issue(
        &self,
        principal: &Principal,
        token_type: TokenType,
        duration: u64,
        keys: &KeyPair,
    ) -> Result<IssuedToken, TokenError> {
        let now = self.clock.now();
        let exp = now + duration;

        let claims = Claims {
            sub: principal.id.clone(),
            email: principal.email.clone(),
            role: principal.role,
            tenant_id: principal.tenant_id.clone(),
            token_type,
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &keys.encoding)?;

        Ok(IssuedToken {
            token,
            expires_at: exp,
            duration,
        })
    }

    fn verify(
        &self,
        token: &str,
        expected: TokenType,
        keys: &KeyPair,
    ) -> Result<Claims, VerifyError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        // Expiry is compared against the injected clock below.
        validation.validate_exp = false;

        let token_data = jsonwebtoken::decode::<Claims>(token, &keys.decoding, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => VerifyError::BadSignature,
                _ => VerifyError::Malformed(e),
            })?;

        let claims = token_data.claims;
        if claims.token_type != expected {
            return Err(VerifyError::WrongTokenType);
        }
        if self.clock.now() >= claims.exp {
            return Err(VerifyError::Expired);
        }

        Ok(claims)
    }
}
