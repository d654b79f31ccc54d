use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};

use mqstore_utils::Timestamp;

use crate::error::AuthError;
use crate::keypair::KeyStore;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub username: String,
    pub iat: Timestamp,
    pub exp: Timestamp,
}

/// Issues and verifies RS256 bearer tokens with the currently active keypair
pub struct TokenIssuer {
    keys: Arc<KeyStore>,
    ttl: Duration,
}

impl TokenIssuer {
    #[inline]
    pub fn new(keys: Arc<KeyStore>, ttl: Duration) -> Self {
        Self { keys, ttl }
    }

    #[inline]
    pub fn issue(&self, username: &str) -> Result<String> {
        self.issue_at(username, mqstore_utils::timestamp_secs())
    }

    pub fn issue_at(&self, username: &str, iat: Timestamp) -> Result<String> {
        let ttl = Timestamp::try_from(self.ttl.as_secs()).unwrap_or(Timestamp::MAX);
        let claims = Claims { username: username.to_owned(), iat, exp: iat.saturating_add(ttl) };
        let pair = self.keys.load();
        Ok(jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, pair.encoding_key())?)
    }

    /// Username bound to `token`, once signature and expiry have been checked
    pub fn verify(&self, token: &str) -> std::result::Result<String, AuthError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = 0;
        let pair = self.keys.load();
        match jsonwebtoken::decode::<Claims>(token, pair.decoding_key(), &validation) {
            Ok(data) => Ok(data.claims.username),
            Err(e) => match e.kind() {
                ErrorKind::ExpiredSignature => Err(AuthError::TokenExpired),
                _ => Err(AuthError::InvalidToken(e.to_string())),
            },
        }
    }
}
