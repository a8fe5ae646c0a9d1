//! Error response handling for the gateway.
//!
//! `AuthError` renders as the standard response envelope
//! `{"success": false, "error": "..."}`. Authentication failures carry a
//! generic body and a `WWW-Authenticate` challenge; server-side failures are
//! logged in full and answered with a generic message.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AuthError;

const REALM: &str = "warden";

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = error_details(&self);

        if status.is_server_error() {
            tracing::error!(category = %self.category(), error = %self, "Request failed");
        } else {
            tracing::debug!(category = %self.category(), error = %self, "Request rejected");
        }

        let mut response = (status, Json(error_body(message))).into_response();

        if status == StatusCode::UNAUTHORIZED {
            let challenge = match self {
                AuthError::InvalidCredentials => {
                    format!("Bearer realm=\"{}\", error=\"invalid_token\"", REALM)
                }
                _ => format!("Bearer realm=\"{}\"", REALM),
            };
            if let Ok(value) = HeaderValue::from_str(&challenge) {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, value);
            }
        }

        response
    }
}

/// Maps an error to its HTTP status and client-facing message.
fn error_details(error: &AuthError) -> (StatusCode, &str) {
    match error {
        AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "Invalid credentials"),
        AuthError::Unauthorized { .. } => (StatusCode::UNAUTHORIZED, "Unauthorized"),
        AuthError::AccountInactive => (StatusCode::FORBIDDEN, "Account inactive"),
        AuthError::Forbidden { .. } => (StatusCode::FORBIDDEN, "Forbidden"),
        AuthError::DuplicateEmail => (StatusCode::CONFLICT, "Email already exists"),
        AuthError::IncorrectPassword => (StatusCode::BAD_REQUEST, "Incorrect old password"),
        AuthError::InvalidRequest { message } => (StatusCode::BAD_REQUEST, message.as_str()),
        AuthError::NotFound { .. } => (StatusCode::NOT_FOUND, "Not found"),
        AuthError::PolicyEngine { .. }
        | AuthError::Configuration { .. }
        | AuthError::Infrastructure { .. }
        | AuthError::Internal { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// Builds the failure envelope.
#[must_use]
pub fn error_body(message: &str) -> serde_json::Value {
    json!({
        "success": false,
        "error": message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_credentials_response() {
        let response = AuthError::InvalidCredentials.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let challenge = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(challenge.contains("invalid_token"));

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Invalid credentials");
    }

    #[tokio::test]
    async fn test_unauthorized_detail_not_leaked() {
        let response = AuthError::unauthorized("bearer key abc123 unknown").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
        assert_eq!(body_json(response).await["error"], "Unauthorized");
    }

    #[tokio::test]
    async fn test_server_errors_are_generic() {
        for err in [
            AuthError::policy_engine("casbin table missing"),
            AuthError::infrastructure("redis://10.0.0.3 refused"),
            AuthError::configuration("secret unset"),
            AuthError::internal("panic"),
        ] {
            let response = err.into_response();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            assert!(!response.headers().contains_key(header::WWW_AUTHENTICATE));
            assert_eq!(body_json(response).await["error"], "Internal server error");
        }
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AuthError::AccountInactive, StatusCode::FORBIDDEN),
            (AuthError::forbidden("x"), StatusCode::FORBIDDEN),
            (AuthError::DuplicateEmail, StatusCode::CONFLICT),
            (AuthError::IncorrectPassword, StatusCode::BAD_REQUEST),
            (AuthError::invalid_request("x"), StatusCode::BAD_REQUEST),
            (AuthError::not_found("x"), StatusCode::NOT_FOUND),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
