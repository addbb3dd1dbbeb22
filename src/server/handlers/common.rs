//! Response envelope and extractors whose rejections use the API error shape.

use std::sync::Arc;

use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::header;
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::{self, Session};
use crate::error::{CrmError, Result};
use crate::models::NewActivity;
use crate::server::state::AppState;

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

pub type ApiResponse<T> = Result<Json<Envelope<T>>>;

pub fn ok<T: Serialize>(data: T) -> ApiResponse<T> {
    Ok(Json(Envelope {
        success: true,
        data,
    }))
}

/// `Json<T>` whose rejection is a 400 in the `{ success:false, error }` envelope.
pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = CrmError;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| Self(value))
            .map_err(|rejection| CrmError::validation(rejection.body_text()))
    }
}

pub struct ApiQuery<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = CrmError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| Self(value))
            .map_err(|rejection| CrmError::validation(rejection.body_text()))
    }
}

pub struct ApiPath<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = CrmError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        Path::<T>::from_request_parts(parts, state)
            .await
            .map(|Path(value)| Self(value))
            .map_err(|_| CrmError::validation("Invalid ID"))
    }
}

/// Any handler taking a `Session` requires a valid token from the
/// `auth_token` cookie or an `Authorization: Bearer` header.
#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for Session {
    type Rejection = CrmError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self> {
        let cookie = parts.headers.get(header::COOKIE).and_then(|v| v.to_str().ok());
        let authorization = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let token = auth::token_from_headers(cookie, authorization)
            .ok_or_else(|| CrmError::Unauthorized("Authentication required".into()))?;
        auth::verify_token(&token, state.jwt_secret())
    }
}

/// Administrator-only operations.
pub fn require_admin(session: &Session) -> Result<()> {
    if session.is_admin {
        Ok(())
    } else {
        Err(CrmError::forbidden("Administrator access required"))
    }
}

/// Record a write in the activity log under the caller's name.
pub async fn audit(
    state: &AppState,
    session: &Session,
    action_type: &'static str,
    entity_type: &'static str,
    entity_id: impl ToString,
    description: String,
) {
    state
        .storage
        .log_activity(NewActivity {
            user_id: Some(session.employee_id),
            user_name: session.username.clone(),
            action_type,
            entity_type,
            entity_id: entity_id.to_string(),
            description,
        })
        .await;
}
