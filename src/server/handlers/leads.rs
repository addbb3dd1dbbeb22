use std::sync::Arc;

use axum::extract::State;
use serde::{Deserialize, Serialize};

use super::common::{audit, ok, require_admin, ApiJson, ApiPath, ApiQuery, ApiResponse};
use crate::auth::Session;
use crate::crm::followup_migration::MigrationReport;
use crate::crm::pricing::NextAction;
use crate::error::CrmError;
use crate::models::{
    BulkReassignment, EmployeeWorkload, FollowUp, FollowUpInput, FollowUpQuery, FollowUpStats,
    FollowUpStatusUpdate, Lead, LeadActivity, LeadAnalytics, LeadAssignment, LeadInput,
    LeadListQuery, LeadSource, LeadStatusUpdate,
};
use crate::server::state::AppState;

// ---------------------------------------------------------------------------
// Leads
// ---------------------------------------------------------------------------

pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiQuery(query): ApiQuery<LeadListQuery>,
) -> ApiResponse<Vec<Lead>> {
    ok(state.storage.list_leads(&query).await?)
}

#[derive(Debug, Serialize)]
pub struct LeadDetail {
    #[serde(flatten)]
    pub lead: Lead,
    pub activity: Vec<LeadActivity>,
    pub quotation_action: NextAction,
}

pub async fn get_lead(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiPath(id): ApiPath<i64>,
) -> ApiResponse<LeadDetail> {
    let lead = state.storage.get_lead(id).await?;
    let (activity, quotation_action) = tokio::try_join!(
        state.storage.lead_activity_log(id),
        state.storage.quotation_next_action(id),
    )?;
    ok(LeadDetail {
        lead,
        activity,
        quotation_action,
    })
}

pub async fn create_lead(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiJson(input): ApiJson<LeadInput>,
) -> ApiResponse<Lead> {
    let lead = state.storage.create_lead(&input, Some(session.employee_id)).await?;
    audit(&state, &session, "CREATE", "lead", lead.id, format!("Created lead {} for {}", lead.lead_number, lead.client_name)).await;
    ok(lead)
}

pub async fn update_lead_status(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
    ApiJson(update): ApiJson<LeadStatusUpdate>,
) -> ApiResponse<Lead> {
    let lead = state
        .storage
        .update_lead_status(id, &update.status, update.reason.as_deref(), Some(session.employee_id))
        .await?;
    audit(&state, &session, "UPDATE", "lead", id, format!("Lead {} moved to {}", lead.lead_number, lead.status)).await;
    ok(lead)
}

pub async fn assign_lead(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
    ApiJson(request): ApiJson<LeadAssignment>,
) -> ApiResponse<Lead> {
    let lead = state
        .storage
        .assign_lead(id, request.employee_id, Some(session.employee_id))
        .await?;
    audit(&state, &session, "UPDATE", "lead", id, format!("Lead {} assigned to {}", lead.lead_number, request.employee_id)).await;
    ok(lead)
}

pub async fn reassign_lead(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
    ApiJson(request): ApiJson<LeadAssignment>,
) -> ApiResponse<Lead> {
    let lead = state
        .storage
        .reassign_lead(id, request.employee_id, request.reason.as_deref(), Some(session.employee_id))
        .await?;
    audit(&state, &session, "UPDATE", "lead", id, format!("Lead {} reassigned to {}", lead.lead_number, request.employee_id)).await;
    ok(lead)
}

#[derive(Debug, Serialize)]
pub struct BulkReassigned {
    pub reassigned: u64,
}

pub async fn bulk_reassign_leads(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiJson(request): ApiJson<BulkReassignment>,
) -> ApiResponse<BulkReassigned> {
    let reassigned = state
        .storage
        .bulk_reassign_leads(
            &request.lead_ids,
            request.employee_id,
            request.reason.as_deref(),
            Some(session.employee_id),
        )
        .await?;
    audit(
        &state,
        &session,
        "UPDATE",
        "lead",
        request.employee_id,
        format!("Bulk reassigned {} leads to {}", reassigned, request.employee_id),
    )
    .await;
    ok(BulkReassigned { reassigned })
}

pub async fn employee_workload(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiPath(employee_id): ApiPath<i64>,
) -> ApiResponse<EmployeeWorkload> {
    ok(state.storage.employee_workload(employee_id).await?)
}

pub async fn lead_analytics(
    State(state): State<Arc<AppState>>,
    _session: Session,
) -> ApiResponse<LeadAnalytics> {
    ok(state.storage.lead_analytics().await?)
}

pub async fn lead_sources(
    State(state): State<Arc<AppState>>,
    _session: Session,
) -> ApiResponse<Vec<LeadSource>> {
    ok(state.storage.list_lead_sources().await?)
}

// ---------------------------------------------------------------------------
// Follow-ups
// ---------------------------------------------------------------------------

pub async fn list_followups(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiQuery(query): ApiQuery<FollowUpQuery>,
) -> ApiResponse<Vec<FollowUp>> {
    ok(state.storage.list_followups(&query).await?)
}

pub async fn get_followup(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiPath(id): ApiPath<i64>,
) -> ApiResponse<FollowUp> {
    ok(state.storage.get_followup(id).await?)
}

pub async fn create_followup(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiJson(input): ApiJson<FollowUpInput>,
) -> ApiResponse<FollowUp> {
    let followup = state
        .storage
        .create_followup(&input, Some(session.employee_id))
        .await?;
    audit(&state, &session, "CREATE", "followup", followup.id, format!("Scheduled {} follow-up for lead {}", input.followup_type, input.lead_id)).await;
    ok(followup)
}

pub async fn delete_followup(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
) -> ApiResponse<&'static str> {
    state.storage.delete_followup(id).await?;
    audit(&state, &session, "DELETE", "followup", id, format!("Deleted follow-up {}", id)).await;
    ok("Follow-up deleted")
}

pub async fn update_followup_status(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
    ApiJson(update): ApiJson<FollowUpStatusUpdate>,
) -> ApiResponse<FollowUp> {
    let followup = state
        .storage
        .update_followup_status(id, &update.status, &update.completion)
        .await?;
    audit(&state, &session, "UPDATE", "followup", id, format!("Follow-up marked {}", update.status)).await;
    ok(followup)
}

#[derive(Debug, Default, Deserialize)]
pub struct UpcomingQuery {
    pub days: Option<i64>,
    pub assigned_to: Option<i64>,
}

pub async fn upcoming_followups(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiQuery(query): ApiQuery<UpcomingQuery>,
) -> ApiResponse<Vec<FollowUp>> {
    if query.days.is_some_and(|d| d < 0) {
        return Err(CrmError::validation("days must not be negative"));
    }
    ok(state
        .storage
        .upcoming_followups(query.days, query.assigned_to)
        .await?)
}

pub async fn followup_stats(
    State(state): State<Arc<AppState>>,
    _session: Session,
) -> ApiResponse<FollowUpStats> {
    ok(state.storage.followup_stats().await?)
}

#[derive(Debug, Default, Deserialize)]
pub struct MigrateQuery {
    #[serde(default)]
    pub dry_run: bool,
}

pub async fn migrate_followups(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiQuery(query): ApiQuery<MigrateQuery>,
) -> ApiResponse<MigrationReport> {
    require_admin(&session)?;
    let report = state.storage.migrate_followups(query.dry_run).await?;
    if !query.dry_run {
        state.metrics.record_tasks(report.migrated);
    }
    ok(report)
}
