//! Bearer-token gateway adapter.
//!
//! The pipeline treats the access context as trusted input; this module is
//! the boundary that produces it. Tokens resolve against a configured token
//! map, or against a fixed development profile when no map is configured.
//! Permissions are always re-derived from roles through the policy table;
//! claims cannot carry their own permissions.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;
use ticketwise_core::AccessContext;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingHeader,
    #[error("Authorization header must be 'Bearer <token>'")]
    MalformedHeader,
    #[error("unknown bearer token")]
    UnknownToken,
    #[error("token file error: {0}")]
    TokenFile(String),
}

/// Claims carried by one configured token.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub user_id: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub allowed_product_tags: BTreeSet<String>,
}

/// Token resolver held by the service for the process lifetime.
#[derive(Debug, Clone, Default)]
pub struct Gateway {
    tokens: Option<BTreeMap<String, TokenClaims>>,
}

impl Gateway {
    /// Development mode: every request resolves to the demo profile.
    #[must_use]
    pub fn development() -> Self {
        Self { tokens: None }
    }

    #[must_use]
    pub fn with_tokens(tokens: BTreeMap<String, TokenClaims>) -> Self {
        Self { tokens: Some(tokens) }
    }

    /// Load a `{token: claims}` JSON map from disk.
    ///
    /// # Errors
    /// Returns [`AuthError::TokenFile`] when the file is unreadable or not a
    /// token map.
    pub fn from_token_file(path: &Path) -> Result<Self, AuthError> {
        let body = fs::read_to_string(path)
            .map_err(|err| AuthError::TokenFile(format!("{}: {err}", path.display())))?;
        let tokens: BTreeMap<String, TokenClaims> = serde_json::from_str(&body)
            .map_err(|err| AuthError::TokenFile(format!("{}: {err}", path.display())))?;
        Ok(Self::with_tokens(tokens))
    }

    /// Resolve an `Authorization` header into an access context.
    ///
    /// # Errors
    /// Returns an [`AuthError`] when a token map is configured and the header
    /// is absent, malformed, or unknown.
    pub fn resolve(&self, authorization: Option<&str>) -> Result<AccessContext, AuthError> {
        let Some(tokens) = &self.tokens else {
            if authorization.is_some() {
                tracing::warn!("no token map configured; using the development profile");
            }
            return Ok(development_profile());
        };

        let header = authorization.ok_or(AuthError::MissingHeader)?;
        let (scheme, token) = header.split_once(' ').ok_or(AuthError::MalformedHeader)?;
        if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
            return Err(AuthError::MalformedHeader);
        }

        let claims = tokens.get(token.trim()).ok_or(AuthError::UnknownToken)?;
        Ok(AccessContext::new(
            claims.user_id.clone(),
            claims.roles.clone(),
            claims.allowed_product_tags.clone(),
        ))
    }
}

/// Fixed profile for development mode. The admin role grants the ingest and
/// query permissions through the policy table.
fn development_profile() -> AccessContext {
    AccessContext::new(
        "demo-user",
        ["admin".to_string()].into_iter().collect(),
        ["Product_A".to_string(), "Product_B".to_string()].into_iter().collect(),
    )
}
