// Registration and session handlers.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use quillpad_core::store::StoreError;

use crate::{
    auth::{authenticate_request, generate_password_hash, issue_session_token, verify_password},
    error::AppError,
    state::AppState,
    types::{AuthResponse, LoginRequest, RegisterRequest, UserPayload},
};

fn is_valid_email(email: &str) -> bool {
    let trimmed = email.trim();
    trimmed.len() >= 3 && trimmed.contains('@') && !trimmed.starts_with('@') && !trimmed.ends_with('@')
}

pub(crate) async fn register_handler(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Response, AppError> {
    let email = payload.email.trim();
    if !is_valid_email(email) {
        return Err(AppError::bad_request("invalid email address"));
    }

    let username = payload.username.trim();
    if username.is_empty() {
        return Err(AppError::bad_request("username must not be empty"));
    }

    if payload.password.is_empty() {
        return Err(AppError::bad_request("password is required"));
    }

    let password_hash = generate_password_hash(&payload.password)
        .map_err(|err| AppError::internal(anyhow::anyhow!("password hashing failed: {err}")))?;

    let user = match state.user_store.create(email, username, &password_hash).await {
        Ok(user) => user,
        Err(StoreError::Conflict(_)) => return Err(AppError::email_already_used(email)),
        Err(err) => return Err(err.into()),
    };

    let token = issue_session_token(&state, &user.id)?;
    let body = AuthResponse {
        token,
        user: UserPayload::from(&user),
    };
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

pub(crate) async fn login_handler(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let user = state
        .user_store
        .find_by_email(payload.email.trim())
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::unauthorized("unknown email or wrong password"))?;

    if !verify_password(&payload.password, &user.password_hash) {
        return Err(AppError::unauthorized("unknown email or wrong password"));
    }

    let token = issue_session_token(&state, &user.id)?;
    Ok(Json(AuthResponse {
        token,
        user: UserPayload::from(&user),
    }))
}

pub(crate) async fn current_user_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserPayload>, AppError> {
    let user = authenticate_request(&state, &headers).await?;
    Ok(Json(UserPayload::from(&user)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation_covers_the_basics() {
        assert!(is_valid_email("ada@example.com"));
        assert!(!is_valid_email("ada"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("ada@"));
        assert!(!is_valid_email(""));
    }
}
