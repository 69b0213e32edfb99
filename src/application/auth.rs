//! Single-operator authentication.
//!
//! There is exactly one credential: the admin token from configuration.
//! Requests either present it (and become the admin) or they are anonymous
//! and only ever see public bookmarks.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing admin token")]
    Missing,
    #[error("invalid admin token")]
    Invalid,
}

/// Marker for a caller that presented the configured admin token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminPrincipal;

/// Who the current request acts as. Built once by the auth middleware and
/// threaded through request extensions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiIdentity {
    principal: Option<AdminPrincipal>,
}

impl ApiIdentity {
    pub fn anonymous() -> Self {
        Self { principal: None }
    }

    pub fn admin() -> Self {
        Self {
            principal: Some(AdminPrincipal),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.principal.is_some()
    }

    pub fn require_admin(&self) -> Result<AdminPrincipal, AuthError> {
        self.principal.ok_or(AuthError::Missing)
    }
}

/// Verifies presented tokens against the configured admin token. Only the
/// hash is kept in memory, and comparison is constant-time.
#[derive(Clone)]
pub struct AdminAuth {
    hashed_token: Option<Vec<u8>>,
}

impl AdminAuth {
    pub fn new(token: Option<&str>) -> Self {
        Self {
            hashed_token: token.map(hash_token),
        }
    }

    /// No token configured: every admin-only surface stays locked.
    pub fn disabled() -> Self {
        Self { hashed_token: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.hashed_token.is_some()
    }

    pub fn authenticate(&self, presented: &str) -> Result<AdminPrincipal, AuthError> {
        let Some(expected) = &self.hashed_token else {
            return Err(AuthError::Invalid);
        };
        let hashed = hash_token(presented);
        if expected.ct_eq(&hashed).unwrap_u8() == 0 {
            return Err(AuthError::Invalid);
        }
        Ok(AdminPrincipal)
    }
}

fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}
