//! Bearer token extraction.
//!
//! Tokens are forwarded to the exchange untouched. A missing header, or a
//! JWT whose `exp` claim has passed, is refused before any request is made.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use exchange_core::{ExchangeError, Result};
use serde::Deserialize;

#[derive(Clone, PartialEq, Eq)]
pub struct Bearer(String);

impl std::fmt::Debug for Bearer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Bearer(***)")
    }
}

#[derive(Deserialize)]
struct Claims {
    exp: Option<i64>,
}

impl Bearer {
    /// Parse an `Authorization` header value.
    pub fn parse(header: Option<&str>, now: DateTime<Utc>) -> Result<Self> {
        let header = header
            .ok_or_else(|| ExchangeError::Unauthenticated("missing Authorization header".into()))?;
        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ExchangeError::Unauthenticated("expected a bearer token".into()))?;

        if let Some(exp) = jwt_expiry(token) {
            if exp <= now.timestamp() {
                return Err(ExchangeError::Unauthenticated("token expired".into()));
            }
        }
        Ok(Bearer(token.to_string()))
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

/// `exp` of a JWT, or `None` for opaque tokens and tokens without one.
fn jwt_expiry(token: &str) -> Option<i64> {
    let mut parts = token.split('.');
    let (_header, payload, _sig) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice::<Claims>(&bytes).ok()?.exp
}
