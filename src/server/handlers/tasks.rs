use std::sync::Arc;

use axum::extract::State;
use serde::Deserialize;

use super::common::{audit, ok, ApiJson, ApiPath, ApiQuery, ApiResponse};
use crate::auth::Session;
use crate::crm::call_analysis::AnalysisSource;
use crate::models::{
    CallSummary, CallSummaryFilter, GenerateTasksRequest, Task, TaskAnalytics, TaskFilter,
    TaskGenerationResult, TaskStatusUpdate, TranscriptionInput,
};
use crate::server::state::AppState;
use crate::storage::{CallDetail, CallIngestResult};

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiQuery(filter): ApiQuery<TaskFilter>,
) -> ApiResponse<Vec<Task>> {
    ok(state.storage.list_tasks(&filter).await?)
}

pub async fn update_task_status(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
    ApiJson(update): ApiJson<TaskStatusUpdate>,
) -> ApiResponse<Task> {
    let task = state.storage.update_task_status(id, &update.status).await?;
    audit(&state, &session, "UPDATE", "task", id, format!("Task {} marked {}", task.task_number, task.status)).await;
    ok(task)
}

/// Evaluate the lead task rules for one event. Unlike the automatic triggers,
/// failures here are reported to the caller.
pub async fn generate_tasks(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiJson(request): ApiJson<GenerateTasksRequest>,
) -> ApiResponse<TaskGenerationResult> {
    let ctx = state
        .storage
        .lead_context(request.lead_id, request.quotation_id)
        .await?;
    let result = state.storage.run_task_rules(request.event, &ctx).await?;
    state.metrics.record_tasks(result.tasks.len());
    tracing::info!(
        lead_id = request.lead_id,
        event = %result.event,
        created = result.tasks.len(),
        skipped = result.skipped_rules.len(),
        by = %session.username,
        "Task rules evaluated"
    );
    ok(result)
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsQuery {
    pub assigned_to: Option<i64>,
}

pub async fn task_analytics(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiQuery(query): ApiQuery<AnalyticsQuery>,
) -> ApiResponse<TaskAnalytics> {
    ok(state.storage.task_analytics(query.assigned_to).await?)
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

pub async fn ingest_transcription(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiJson(input): ApiJson<TranscriptionInput>,
) -> ApiResponse<CallIngestResult> {
    let result = state.storage.ingest_transcription(&input, state.llm()).await?;
    state.metrics.record_call();
    state.metrics.record_tasks(result.tasks.len());
    if state.llm.is_some() && result.analysis_source == AnalysisSource::Heuristic {
        state.metrics.record_llm_failure();
    }
    ok(result)
}

pub async fn get_call(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiPath(call_id): ApiPath<String>,
) -> ApiResponse<CallDetail> {
    ok(state.storage.get_call(&call_id).await?)
}

pub async fn call_summary(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiQuery(filter): ApiQuery<CallSummaryFilter>,
) -> ApiResponse<CallSummary> {
    ok(state.storage.call_summary(&filter).await?)
}
