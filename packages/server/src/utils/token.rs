use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Issuer written into every capability token.
pub const TOKEN_ISSUER: &str = "fleethub-storage";

/// HTTP method a capability token authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferMethod {
    #[serde(rename = "GET")]
    Get,
    #[serde(rename = "PUT")]
    Put,
}

/// Capability claims for exactly one transfer of exactly one object.
#[derive(Debug, Serialize, Deserialize)]
pub struct TransferClaims {
    /// Audience: the owner-scoped storage id this token is valid for.
    pub aud: String,
    pub method: TransferMethod,
    /// Exact byte size of the object.
    pub size: i64,
    /// Expected sha256 digest, hex encoded.
    pub sha: String,
    /// Display name for the download Content-Disposition header.
    pub disposition_name: String,
    pub iss: String,
    /// Expiration timestamp (seconds since epoch).
    pub exp: usize,
}

/// Sign a capability token for a single transfer.
pub fn sign(
    secret: &str,
    storage_id: &str,
    method: TransferMethod,
    size: i64,
    sha: &str,
    disposition_name: &str,
    ttl: Duration,
) -> Result<String> {
    let expiration = Utc::now()
        .checked_add_signed(ttl)
        .expect("valid timestamp")
        .timestamp();

    let claims = TransferClaims {
        aud: storage_id.to_owned(),
        method,
        size,
        sha: sha.to_owned(),
        disposition_name: disposition_name.to_owned(),
        iss: TOKEN_ISSUER.to_owned(),
        exp: expiration as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Verify and decode a capability token.
pub fn verify(secret: &str, token: &str) -> Result<TransferClaims> {
    let mut validation = Validation::default();
    // The audience is the storage id itself; the gateway derives the object
    // key from it rather than matching it against a fixed value.
    validation.validate_aud = false;

    let token_data = decode::<TransferClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(token_data.claims)
}
