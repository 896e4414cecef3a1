//! Credential handling: argon2 password hashes and Ed25519-signed
//! bearer tokens.
//!
//! A token is `base64url(user_id || expiry_rfc3339 || signature)` where
//! the signature covers `user_id || expiry_rfc3339`.  Verification
//! checks the expiry before the signature; everything downstream of the
//! [`AuthUser`] extractor can trust the identity.

use argon2::password_hash::rand_core::OsRng as SaltRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use uuid::Uuid;

use colloquy_shared::UserId;
use colloquy_store::User;

use crate::error::ApiError;
use crate::routes::AppState;

const UUID_LEN: usize = 16;
const SIGNATURE_LEN: usize = 64;

// ---------------------------------------------------------------------------
// Passwords
// ---------------------------------------------------------------------------

/// Hash a password into a PHC-format argon2 string.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut SaltRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("Password hashing failed: {e}")))
}

/// Check a password against a stored hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

// ---------------------------------------------------------------------------
// Bearer tokens
// ---------------------------------------------------------------------------

/// Issues and verifies signed bearer tokens.
pub struct TokenSigner {
    key: SigningKey,
    ttl: chrono::Duration,
}

impl TokenSigner {
    /// Build a signer from an optional fixed seed.  Without a seed a
    /// fresh key is generated, so issued tokens die with the process.
    pub fn new(seed: Option<[u8; 32]>, ttl: chrono::Duration) -> Self {
        let key = match seed {
            Some(seed) => SigningKey::from_bytes(&seed),
            None => {
                tracing::warn!("TOKEN_KEY not set, using an ephemeral signing key");
                SigningKey::generate(&mut rand::rngs::OsRng)
            }
        };
        Self { key, ttl }
    }

    /// Issue a token for the given user, valid for the configured TTL.
    pub fn issue(&self, user_id: UserId) -> String {
        self.issue_until(user_id, Utc::now() + self.ttl)
    }

    fn issue_until(&self, user_id: UserId, expires_at: DateTime<Utc>) -> String {
        let mut payload = Vec::new();
        payload.extend_from_slice(user_id.0.as_bytes());
        payload.extend_from_slice(expires_at.to_rfc3339().as_bytes());

        let signature = self.key.sign(&payload);
        payload.extend_from_slice(&signature.to_bytes());

        URL_SAFE_NO_PAD.encode(payload)
    }

    /// Verify a token and return the authenticated user id.
    pub fn verify(&self, token: &str) -> Result<UserId, ApiError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| ApiError::Unauthorized("Invalid token".to_string()))?;

        if bytes.len() <= UUID_LEN + SIGNATURE_LEN {
            return Err(ApiError::Unauthorized("Invalid token".to_string()));
        }

        let (payload, sig_bytes) = bytes.split_at(bytes.len() - SIGNATURE_LEN);
        let (id_bytes, expiry_bytes) = payload.split_at(UUID_LEN);

        let expires_at = std::str::from_utf8(expiry_bytes)
            .ok()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| ApiError::Unauthorized("Invalid token".to_string()))?;

        if Utc::now() > expires_at {
            return Err(ApiError::Unauthorized("Token expired".to_string()));
        }

        let signature = Signature::from_slice(sig_bytes)
            .map_err(|_| ApiError::Unauthorized("Invalid token".to_string()))?;
        self.key
            .verifying_key()
            .verify(payload, &signature)
            .map_err(|_| ApiError::Unauthorized("Invalid token".to_string()))?;

        let uuid = Uuid::from_slice(id_bytes)
            .map_err(|_| ApiError::Unauthorized("Invalid token".to_string()))?;
        Ok(UserId(uuid))
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// The authenticated user behind a `Authorization: Bearer <token>`
/// header.  Rejects with 401 on a missing, malformed, or expired token,
/// or when the account no longer exists.
pub struct AuthUser(pub User);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing authorization header".to_string()))?;

        let token = header.strip_prefix("Bearer ").unwrap_or(header);
        let user_id = state.tokens.verify(token)?;

        let user = state
            .store
            .lock()
            .await
            .user_by_id(user_id)
            .map_err(|_| ApiError::Unauthorized("Account no longer exists".to_string()))?;

        Ok(AuthUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn password_round_trip() {
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
        assert!(!verify_password("hunter2", "not-a-phc-string"));
    }

    #[test]
    fn token_round_trip() {
        let signer = TokenSigner::new(Some([7u8; 32]), Duration::days(7));
        let user_id = UserId::new();

        let token = signer.issue(user_id);
        assert_eq!(signer.verify(&token).unwrap(), user_id);
    }

    #[test]
    fn expired_token_is_rejected() {
        let signer = TokenSigner::new(Some([7u8; 32]), Duration::days(7));
        let token = signer.issue_until(UserId::new(), Utc::now() - Duration::days(1));

        let err = signer.verify(&token).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[test]
    fn token_from_wrong_key_is_rejected() {
        let signer = TokenSigner::new(Some([7u8; 32]), Duration::days(7));
        let other = TokenSigner::new(Some([8u8; 32]), Duration::days(7));

        let token = signer.issue(UserId::new());
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        let signer = TokenSigner::new(Some([7u8; 32]), Duration::days(7));
        assert!(signer.verify("not base64 !!!").is_err());
        assert!(signer.verify("").is_err());
        assert!(signer.verify(&URL_SAFE_NO_PAD.encode(b"short")).is_err());
    }
}
