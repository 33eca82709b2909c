//! HS256 JWT implementation of the auth port.

use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, get_current_timestamp,
};
use serde::{Deserialize, Serialize};

use crate::domain::{AuthError, AuthToken, TokenVerifier, UserId};

/// Claims carried by session tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    /// Expiry, seconds since the Unix epoch
    pub exp: u64,
}

/// Verifies tokens signed with a shared HMAC secret
pub struct JwtTokenVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtTokenVerifier {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Sign a token for `user` valid for `ttl`.
    ///
    /// Tokens are normally issued by the auth service; this is used by local
    /// tooling and tests.
    pub fn issue(&self, user: UserId, ttl: Duration) -> Result<String, AuthError> {
        let claims = Claims {
            user_id: user.value(),
            exp: get_current_timestamp() + ttl.as_secs(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|_| AuthError::InvalidToken)
    }
}

#[async_trait]
impl TokenVerifier for JwtTokenVerifier {
    async fn verify(&self, token: &AuthToken) -> Result<UserId, AuthError> {
        let data = decode::<Claims>(token.as_str(), &self.decoding_key, &self.validation)
            .map_err(|e| {
                tracing::debug!("Token rejected: {}", e);
                AuthError::InvalidToken
            })?;
        Ok(UserId::new(data.claims.user_id))
    }
}
