use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::common::{ok, ApiJson, ApiQuery, ApiResponse};
use crate::auth::Session;
use crate::crm::business_chat::{self, ChatRequest, ChatResponse, DataNeeds, APOLOGY};
use crate::error::CrmError;
use crate::models::Activity;
use crate::server::state::AppState;
use crate::storage::DashboardStats;

const MAX_ACTIVITY_LIMIT: i64 = 100;

/// Unauthenticated. 503 when the database does not answer.
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let (queries, slow_queries, query_time_ms) = state.storage.metrics().get_stats();
    let llm = state.llm_breaker.status().await;
    let common = json!({
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "active_requests": state.limits.active_requests(),
        "query_stats": {
            "total": queries,
            "slow": slow_queries,
            "total_time_ms": query_time_ms,
        },
        "llm": {
            "enabled": state.llm.is_some(),
            "circuit": llm,
        },
        "metrics": state.metrics.snapshot(),
    });

    match state.storage.database_health().await {
        Ok(db) => {
            let mut data = common;
            data["status"] = json!("healthy");
            data["database"] = json!(db);
            (StatusCode::OK, Json(json!({ "success": true, "data": data }))).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            let mut data = common;
            data["status"] = json!("unhealthy");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "Database connection failed",
                    "data": data,
                })),
            )
                .into_response()
        }
    }
}

pub async fn dashboard_stats(
    State(state): State<Arc<AppState>>,
    _session: Session,
) -> ApiResponse<DashboardStats> {
    ok(state.storage.dashboard_stats().await?)
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<i64>,
}

pub async fn activities(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiQuery(query): ApiQuery<ActivityQuery>,
) -> ApiResponse<Vec<Activity>> {
    let limit = query.limit.unwrap_or(20).clamp(1, MAX_ACTIVITY_LIMIT);
    ok(state.storage.recent_activities(limit).await?)
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiJson(request): ApiJson<ChatRequest>,
) -> ApiResponse<ChatResponse> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err(CrmError::validation("Query is required"));
    }
    let Some(model) = state.llm() else {
        return ok(ChatResponse::apology());
    };

    let needs = DataNeeds::for_query(query);
    let ctx = state.storage.business_context(needs).await?;
    let response = business_chat::answer(query, &ctx, model).await;
    if response.response == APOLOGY {
        state.metrics.record_llm_failure();
    }
    tracing::info!(
        user = %session.username,
        confidence = response.confidence,
        sources = response.sources.len(),
        "Business chat answered"
    );
    ok(response)
}
