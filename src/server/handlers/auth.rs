use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::common::{audit, ok, ApiJson, ApiResponse, Envelope};
use crate::auth::{self, Session};
use crate::error::{CrmError, Result};
use crate::server::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username, or email when it contains `@`
    #[serde(alias = "username", alias = "email")]
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: Session,
    pub token: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Response> {
    if request.identifier.trim().is_empty() || request.password.is_empty() {
        return Err(CrmError::validation("Username and password are required"));
    }

    let record = state.storage.find_login(request.identifier.trim()).await?;
    let session = match auth::authenticate(record, &request.password).await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(identifier = %request.identifier.trim(), "Login refused: {}", e);
            return Err(e);
        }
    };
    state.storage.record_login(session.account_id).await?;

    let auth_config = &state.config.auth;
    let token = auth::issue_token(&session, state.jwt_secret(), auth_config.session_hours)?;
    let cookie = auth::session_cookie(&token, auth_config.session_hours, auth_config.cookie_secure);

    audit(
        &state,
        &session,
        "LOGIN",
        "user_account",
        session.account_id,
        format!("{} signed in", session.username),
    )
    .await;
    tracing::info!(user = %session.username, role = %session.role_title, "User logged in");

    let body = Json(Envelope {
        success: true,
        data: LoginResponse {
            user: session,
            token,
        },
    });
    Ok(([(header::SET_COOKIE, cookie)], body).into_response())
}

/// Clears the cookie. Tokens are stateless, so a valid session is not required.
pub async fn logout() -> Response {
    let body = Json(Envelope {
        success: true,
        data: "Logged out",
    });
    ([(header::SET_COOKIE, auth::clear_cookie())], body).into_response()
}

pub async fn me(session: Session) -> ApiResponse<Session> {
    ok(session)
}
