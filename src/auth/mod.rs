use std::fmt;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod password;

/// Principal authenticated by a bearer token. Wraps the customer id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(i64);

impl Identity {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Customer id, carried as a string per the JWT `sub` convention
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// A freshly signed credential plus the payload it carries
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub subject: Identity,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Token is missing")]
    MissingToken,

    #[error("Token is invalid: {0}")]
    MalformedToken(String),

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Not allowed to act on customer {requested}")]
    Forbidden { requested: i64 },

    #[error("Invalid token secret")]
    InvalidSecret,

    #[error("Token generation error: {0}")]
    TokenGeneration(String),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),
}

/// Stateless HS256 codec. Holds only the process-wide secret and the token lifetime,
/// so a shared reference can be used from any number of requests at once.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime: Duration,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: &str, lifetime: std::time::Duration) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::InvalidSecret);
        }
        let lifetime = Duration::from_std(lifetime).map_err(|_| AuthError::InvalidSecret)?;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            lifetime,
        })
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn issue(&self, subject: Identity) -> Result<IssuedToken, AuthError> {
        self.issue_at(subject, Utc::now())
    }

    /// Sign a token as if issued at `now`
    pub fn issue_at(&self, subject: Identity, now: DateTime<Utc>) -> Result<IssuedToken, AuthError> {
        let expires_at = now + self.lifetime;
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenGeneration(e.to_string()))?;

        Ok(IssuedToken {
            token,
            subject,
            issued_at: now,
            expires_at,
        })
    }

    pub fn verify(&self, raw: &str) -> Result<Identity, AuthError> {
        self.verify_at(raw, Utc::now())
    }

    /// Check signature and encoding, then expiry against `now`.
    /// A token is still valid at exactly `exp` and rejected one second later.
    pub fn verify_at(&self, raw: &str, now: DateTime<Utc>) -> Result<Identity, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked below against the caller's clock, with no leeway.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(raw, &self.decoding_key, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
            _ => AuthError::MalformedToken(e.to_string()),
        })?;

        if now.timestamp() > data.claims.exp {
            return Err(AuthError::ExpiredToken);
        }

        let subject = data
            .claims
            .sub
            .parse::<i64>()
            .map_err(|_| AuthError::MalformedToken("subject is not a customer id".to_string()))?;

        Ok(Identity::new(subject))
    }
}
