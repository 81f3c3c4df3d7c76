use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::{AppConfig, ConfigError},
    error::AppError,
    models::{Identity, Role},
};

/// Distinguishes short-lived API credentials from long-lived re-issuance credentials.
/// Both are signed the same way; only this claim and the lifetime differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims
///
/// The signed payload of every token. Nothing here is persisted server-side: validity is
/// decided by the signature and `exp` alone.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the identity's email, which is the login key.
    pub sub: String,
    pub role: Role,
    pub kind: TokenKind,
    /// Issued at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

/// What a successfully verified token tells the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedToken {
    pub subject: String,
    pub role: Role,
    pub kind: TokenKind,
}

/// Why a token was refused. Internal only: the gate logs it and answers `Unauthenticated`.
#[derive(Debug, Error, PartialEq)]
pub enum VerificationError {
    #[error("token is structurally invalid")]
    MalformedToken,
    #[error("token signature does not match")]
    BadSignature,
    #[error("token has expired")]
    Expired,
    #[error("expected a {expected:?} token, got {found:?}")]
    WrongKind { expected: TokenKind, found: TokenKind },
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// TokenService
///
/// Issues and verifies HS256 tokens with one process-wide secret. Stateless and immutable
/// after construction, so one instance is shared by every request.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Builds the service. An empty secret is a configuration error and is reported here,
    /// at start-up, rather than on the first request.
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Result<Self, ConfigError> {
        if secret.trim().is_empty() {
            return Err(ConfigError::EmptySigningKey);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            access_ttl,
            refresh_ttl,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        Self::new(
            &config.jwt_secret,
            config.access_token_ttl,
            config.refresh_token_ttl,
        )
    }

    pub fn issue(&self, identity: &Identity, kind: TokenKind) -> Result<String, AppError> {
        self.issue_at(identity, kind, Utc::now())
    }

    /// Issues a token as if the current time were `issued_at`.
    pub fn issue_at(
        &self,
        identity: &Identity,
        kind: TokenKind,
        issued_at: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: identity.email.clone(),
            role: identity.role,
            kind,
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("token signing failed: {}", e)))
    }

    pub fn issue_pair(&self, identity: &Identity) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            access_token: self.issue(identity, TokenKind::Access)?,
            refresh_token: self.issue(identity, TokenKind::Refresh)?,
        })
    }

    /// verify
    ///
    /// Checks structure, then signature, then expiry. The signature is always checked before
    /// expiry, so a forged token is reported as `BadSignature` even when it is also stale.
    pub fn verify(&self, token: &str) -> Result<VerifiedToken, VerificationError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => VerificationError::Expired,
                ErrorKind::InvalidSignature => VerificationError::BadSignature,
                _ => VerificationError::MalformedToken,
            }
        })?;

        Ok(VerifiedToken {
            subject: data.claims.sub,
            role: data.claims.role,
            kind: data.claims.kind,
        })
    }

    /// Like `verify`, and additionally requires the token to be of `expected` kind.
    pub fn verify_kind(
        &self,
        token: &str,
        expected: TokenKind,
    ) -> Result<VerifiedToken, VerificationError> {
        let verified = self.verify(token)?;
        if verified.kind != expected {
            return Err(VerificationError::WrongKind {
                expected,
                found: verified.kind,
            });
        }
        Ok(verified)
    }
}
