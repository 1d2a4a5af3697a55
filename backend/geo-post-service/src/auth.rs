/// Bearer token verification
///
/// Tokens are HS256 JWTs carrying the caller's username. The signing secret
/// comes from configuration and is held by the verifier instance; there is
/// no process-wide key.
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

/// Claims carried by a caller token
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Username the post is attributed to
    pub username: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.set_required_spec_claims(&["exp"]);
        validation.leeway = 0;

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Validate `token` and return the caller's username.
    pub fn verify(&self, token: &str) -> Result<String, AppError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|err| {
            tracing::debug!(error = %err, "token rejected");
            AppError::Unauthenticated("invalid or expired token".to_string())
        })?;

        let username = data.claims.username.trim();
        if username.is_empty() {
            return Err(AppError::Unauthenticated(
                "token carries no username".to_string(),
            ));
        }
        Ok(username.to_string())
    }
}
