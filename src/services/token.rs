//! Session token codec
//!
//! Turns [`SessionClaims`] into a compact HS256-signed token and back.
//! Decoding never fails loudly: a bad signature, an expired token, a token
//! signed with another algorithm or plain garbage all come back as `None`,
//! which callers treat as "not authenticated".
//!
//! Every token carries an `aud` claim naming the session kind it was issued
//! for. A codec only accepts its own audience, so our session tokens and the
//! OAuth provider's tokens are never interchangeable, even under one secret.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::models::SessionClaims;

/// Audience of our own cookie sessions
pub const SESSION_AUDIENCE: &str = "myflix:session";

/// Audience of the OAuth provider's sessions
pub const OAUTH_AUDIENCE: &str = "myflix:oauth";

/// Wire form of a token payload: the claims plus the audience
#[derive(Serialize)]
struct AudiencedClaims<'a> {
    #[serde(flatten)]
    claims: &'a SessionClaims,
    aud: &'a str,
}

/// Error types for token operations
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// No signing secret available
    #[error("Session signing secret is not configured")]
    MissingSecret,

    /// Signing failed
    #[error("Failed to encode session token: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),
}

/// Signs and verifies session tokens with a fixed symmetric key
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    audience: String,
}

impl TokenCodec {
    /// Create a codec for the given secret, issuing and accepting
    /// [`SESSION_AUDIENCE`] tokens
    pub fn new(secret: &SecretString) -> Self {
        let key = secret.expose_secret().as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub", "aud"]);

        Self {
            encoding_key: EncodingKey::from_secret(key),
            decoding_key: DecodingKey::from_secret(key),
            validation,
            audience: String::new(),
        }
        .with_audience(SESSION_AUDIENCE)
    }

    /// Issue and accept tokens for `audience` only
    pub fn with_audience(mut self, audience: &str) -> Self {
        self.validation.set_audience(&[audience]);
        self.audience = audience.to_string();
        self
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Create a codec from an optional secret, failing when it is absent
    pub fn try_new(secret: Option<&SecretString>) -> Result<Self, TokenError> {
        secret.map(Self::new).ok_or(TokenError::MissingSecret)
    }

    /// Sign the claims as given. The validity window comes from the claims.
    pub fn encode(&self, claims: &SessionClaims) -> Result<String, TokenError> {
        let payload = AudiencedClaims {
            claims,
            aud: &self.audience,
        };
        let token = encode(&Header::new(Algorithm::HS256), &payload, &self.encoding_key)?;
        Ok(token)
    }

    /// Verify a token and return its claims, or `None` on any failure.
    pub fn decode(&self, token: &str) -> Option<SessionClaims> {
        if token.is_empty() {
            return None;
        }

        match decode::<SessionClaims>(token, &self.decoding_key, &self.validation) {
            // exp must be strictly in the future
            Ok(data) if !data.claims.is_expired() => Some(data.claims),
            Ok(_) => {
                tracing::debug!("Session token expired");
                None
            }
            Err(e) => {
                tracing::debug!("Failed to verify session token: {}", e);
                None
            }
        }
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &Algorithm::HS256)
            .field("audience", &self.audience)
            .field("keys", &"[REDACTED]")
            .finish()
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn round_trip_preserves_claims(
            subject in "[a-zA-Z0-9:_-]{1,40}",
            name in "[a-zA-Z ]{0,30}",
            email in "([a-z]{1,10}@[a-z]{1,10}\\.com)?",
            ttl_minutes in 1i64..(60 * 24 * 7),
        ) {
            let codec = TokenCodec::new(&SecretString::from("prop-secret-prop-secret-prop-secret"));
            let claims = SessionClaims::new(subject, name, email, Duration::minutes(ttl_minutes));

            let token = codec.encode(&claims).unwrap();
            prop_assert_eq!(codec.decode(&token), Some(claims));
        }

        #[test]
        fn past_expiry_never_decodes(seconds_ago in 1i64..(60 * 60 * 24 * 30)) {
            let codec = TokenCodec::new(&SecretString::from("prop-secret-prop-secret-prop-secret"));
            let mut claims = SessionClaims::new("1", "", "", Duration::hours(1));
            claims.expires_at = chrono::Utc::now().timestamp() - seconds_ago;

            let token = codec.encode(&claims).unwrap();
            prop_assert!(codec.decode(&token).is_none());
        }
    }
}
