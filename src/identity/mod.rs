//! Caller identity extraction from `Authorization: Basic` credentials.
//!
//! The identity is the user-id half of a Basic credential: the decoded
//! token is split at the first colon and everything before it is used to
//! key rate-limit state. The secret half is never inspected.

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

const BASIC_SCHEME: &str = "Basic";

/// Reasons a request could not be attributed to a caller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("missing Authorization header")]
    MissingHeader,

    #[error("Authorization header is not valid ASCII")]
    InvalidHeader,

    #[error("unsupported authorization scheme")]
    UnsupportedScheme,

    #[error("empty credentials")]
    EmptyCredentials,

    #[error("credentials are not valid base64")]
    InvalidEncoding,

    #[error("credentials are not in identity:secret form")]
    MissingSeparator,

    #[error("empty identity")]
    EmptyIdentity,
}

/// Caller identity derived from request credentials
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract the caller identity from request headers
pub fn extract_identity(headers: &HeaderMap) -> Result<Identity, IdentityError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(IdentityError::MissingHeader)?
        .to_str()
        .map_err(|_| IdentityError::InvalidHeader)?;

    parse_basic_credentials(value)
}

/// Parse a `Basic <base64(identity:secret)>` header value
pub fn parse_basic_credentials(value: &str) -> Result<Identity, IdentityError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(IdentityError::EmptyCredentials);
    }

    let (scheme, token) = value.split_once(' ').unwrap_or((value, ""));
    if !scheme.eq_ignore_ascii_case(BASIC_SCHEME) {
        return Err(IdentityError::UnsupportedScheme);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(IdentityError::EmptyCredentials);
    }

    let decoded = STANDARD
        .decode(token)
        .map_err(|_| IdentityError::InvalidEncoding)?;
    let decoded = String::from_utf8(decoded).map_err(|_| IdentityError::InvalidEncoding)?;

    let (identity, _secret) = decoded
        .split_once(':')
        .ok_or(IdentityError::MissingSeparator)?;

    if identity.is_empty() {
        return Err(IdentityError::EmptyIdentity);
    }

    Ok(Identity(identity.to_string()))
}
