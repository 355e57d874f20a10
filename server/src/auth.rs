// Authentication: password hashing and bearer session tokens.

use argon2::{
    Argon2,
    password_hash::{
        Error as PasswordHashError, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
        rand_core::OsRng,
    },
};
use axum::http::{HeaderMap, header::AUTHORIZATION};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use quillpad_core::ids::UserId;
use quillpad_core::user::UserRecord;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// Expiration, seconds since epoch.
    pub exp: u64,
    /// Issued at, seconds since epoch.
    pub iat: u64,
}

pub fn generate_password_hash(password: &str) -> Result<String, PasswordHashError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(password_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn issue_session_token(state: &AppState, user_id: &UserId) -> Result<String, AppError> {
    let now = Utc::now().timestamp().max(0) as u64;
    let claims = Claims {
        sub: user_id.to_string(),
        exp: now + state.config.jwt_expires_in,
        iat: now,
    };

    let key = EncodingKey::from_secret(state.config.jwt_secret.as_bytes());
    encode(&Header::default(), &claims, &key)
        .map_err(|err| AppError::internal(anyhow::Error::new(err)))
}

pub fn verify_session_token(state: &AppState, token: &str) -> Result<Claims, AppError> {
    let key = DecodingKey::from_secret(state.config.jwt_secret.as_bytes());
    decode::<Claims>(token, &key, &Validation::default())
        .map(|data| data.claims)
        .map_err(|_| AppError::unauthorized("invalid or expired session token"))
}

/// Resolve a bearer credential to a full user record. This is the auth
/// collaborator contract: the token yields a user id, the user store yields
/// identity details.
pub async fn authenticate_token(state: &AppState, token: &str) -> Result<UserRecord, AppError> {
    let claims = verify_session_token(state, token)?;
    let user_id = UserId::from(claims.sub);

    state
        .user_store
        .find_by_id(&user_id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::unauthorized("session user no longer exists"))
}

/// Authenticate an HTTP request via its `Authorization: Bearer` header.
pub async fn authenticate_request(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<UserRecord, AppError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer_token)
        .ok_or_else(|| AppError::unauthorized("missing bearer token"))?;

    authenticate_token(state, &token).await
}

fn extract_bearer_token(header: &str) -> Option<String> {
    let trimmed = header.trim();
    if trimmed.len() > 7 && trimmed[..7].eq_ignore_ascii_case("bearer ") {
        let token = trimmed[7..].trim();
        if !token.is_empty() {
            return Some(token.to_owned());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::build_state;
    use quillpad_core::config::AppConfig;

    #[test]
    fn password_hash_roundtrip() {
        let hash = generate_password_hash("hunter2").expect("hash password");
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("hunter2", "not-a-phc-string"));
    }

    #[tokio::test]
    async fn session_token_roundtrip() {
        let state = build_state(AppConfig::default());
        let user = state
            .user_store
            .create("ada@example.com", "ada", "hash")
            .await
            .unwrap();

        let token = issue_session_token(&state, &user.id).unwrap();
        let claims = verify_session_token(&state, &token).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert!(claims.exp > claims.iat);

        let resolved = authenticate_token(&state, &token).await.unwrap();
        assert_eq!(resolved.id, user.id);
    }

    #[tokio::test]
    async fn tampered_tokens_are_refused() {
        let state = build_state(AppConfig::default());
        let user = state
            .user_store
            .create("ada@example.com", "ada", "hash")
            .await
            .unwrap();

        let mut token = issue_session_token(&state, &user.id).unwrap();
        token.push('x');
        assert!(verify_session_token(&state, &token).is_err());
        assert!(verify_session_token(&state, "garbage").is_err());
    }

    #[test]
    fn bearer_extraction_is_case_insensitive() {
        assert_eq!(
            extract_bearer_token("Bearer abc").as_deref(),
            Some("abc")
        );
        assert_eq!(
            extract_bearer_token("bearer abc").as_deref(),
            Some("abc")
        );
        assert!(extract_bearer_token("Basic abc").is_none());
        assert!(extract_bearer_token("Bearer ").is_none());
    }
}
