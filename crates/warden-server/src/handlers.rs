//! Route handlers.
//!
//! Every response uses the envelope `{ "success": bool, "data"?: ..., "error"?: string }`.
//! Failures are rendered by `AuthError`'s `IntoResponse`.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use warden_auth::middleware::{CurrentClient, CurrentUser};
use warden_auth::session::{
    ChangePasswordRequest, LoginRequest, RefreshTokenRequest, RegisterRequest,
    UpdateProfileRequest,
};
use warden_auth::storage::{Client, ClientFilter, ClientInput, User};
use warden_auth::token::TokenPair;
use warden_auth::{AuthError, AuthResult};

use crate::server::AppState;

/// Response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

type ApiResult<T> = AuthResult<Json<ApiResponse<T>>>;

/// Unwraps a JSON body, turning malformed input into a 400 envelope.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> AuthResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AuthError::invalid_request(rejection.body_text()))
}

fn message(text: &str) -> Value {
    json!({ "message": text })
}

// =============================================================================
// Public
// =============================================================================

pub async fn health() -> Json<ApiResponse<Value>> {
    ApiResponse::ok(json!({ "status": "ok" }))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<TokenPair> {
    let req = body(payload)?;
    let tokens = state.auth.sessions.login(req).await?;
    Ok(ApiResponse::ok(tokens))
}

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<User> {
    let req = body(payload)?;
    let user = state.auth.sessions.register(req).await?;
    Ok(ApiResponse::ok(user))
}

pub async fn refresh(
    State(state): State<AppState>,
    payload: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> ApiResult<TokenPair> {
    let req = body(payload)?;
    let tokens = state.auth.sessions.refresh_token(&req.refresh_token).await?;
    Ok(ApiResponse::ok(tokens))
}

// =============================================================================
// User
// =============================================================================

pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let req = body(payload)?;
    state
        .auth
        .sessions
        .change_password(&user.user_id, req)
        .await?;
    Ok(ApiResponse::ok(message("Password changed successfully")))
}

pub async fn logout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Value> {
    state.auth.sessions.logout(&user.user_id).await?;
    Ok(ApiResponse::ok(message("Logged out successfully")))
}

pub async fn get_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<User> {
    let profile = state.auth.sessions.profile(&user.user_id).await?;
    Ok(ApiResponse::ok(profile))
}

pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> ApiResult<User> {
    let req = body(payload)?;
    let profile = state
        .auth
        .sessions
        .update_profile(&user.user_id, req)
        .await?;
    Ok(ApiResponse::ok(profile))
}

// =============================================================================
// Internal
// =============================================================================

pub async fn client_upsert(
    State(state): State<AppState>,
    payload: Result<Json<Vec<ClientInput>>, JsonRejection>,
) -> ApiResult<Vec<Client>> {
    let inputs = body(payload)?;
    if let Some(input) = inputs.iter().find(|i| i.bearer_key.trim().is_empty()) {
        return Err(AuthError::invalid_request(format!(
            "client '{}' has an empty bearer_key",
            input.name
        )));
    }

    let clients = state.clients.upsert(&inputs).await?;
    for client in &clients {
        state.invalidate_cached(&client.bearer_key).await;
    }

    tracing::info!(count = clients.len(), "Clients upserted");
    Ok(ApiResponse::ok(clients))
}

pub async fn client_find(
    State(state): State<AppState>,
    payload: Result<Json<ClientFilter>, JsonRejection>,
) -> ApiResult<Vec<Client>> {
    let filter = body(payload)?;
    let clients = state.clients.find_by_filter(&filter).await?;
    Ok(ApiResponse::ok(clients))
}

pub async fn client_delete(
    State(state): State<AppState>,
    payload: Result<Json<ClientFilter>, JsonRejection>,
) -> ApiResult<Value> {
    let filter = body(payload)?;
    if filter.is_empty() {
        return Err(AuthError::invalid_request(
            "delete requires at least one of ids, names, bearer_keys",
        ));
    }

    let doomed = state.clients.find_by_filter(&filter).await?;
    let deleted = state.clients.delete_by_filter(&filter).await?;
    for client in &doomed {
        state.invalidate_cached(&client.bearer_key).await;
    }

    tracing::info!(deleted, "Clients deleted");
    Ok(ApiResponse::ok(json!({ "deleted": deleted })))
}

// =============================================================================
// Client
// =============================================================================

pub async fn ping(CurrentClient(client): CurrentClient) -> Json<ApiResponse<Value>> {
    tracing::debug!(client_id = %client.id, "ping");
    ApiResponse::ok(message("pong"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_omits_absent_fields() {
        let Json(response) = ApiResponse::ok(json!({ "a": 1 }));
        let value = serde_json::to_value(response).unwrap();
        assert_eq!(value, json!({ "success": true, "data": { "a": 1 } }));
    }
}
