//! Catalogue, quotations and the approval-to-confirmation workflow.

use std::sync::Arc;

use axum::extract::State;
use serde::Deserialize;

use super::common::{audit, ok, require_admin, ApiJson, ApiPath, ApiQuery, ApiResponse};
use crate::auth::Session;
use crate::models::{
    ApprovalDecision, ConfirmationInput, CreateQuotationInput, Deliverable, DeliverableInput,
    PaymentInput, Quotation, QuotationAnalytics, QuotationListQuery, QuotationStatusUpdate,
    RecalculationReport, Service, ServiceInput, WorkflowBucket,
};
use crate::server::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    #[serde(default)]
    pub active_only: bool,
}

// ---------------------------------------------------------------------------
// Services and deliverables
// ---------------------------------------------------------------------------

pub async fn list_services(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiQuery(query): ApiQuery<CatalogQuery>,
) -> ApiResponse<Vec<Service>> {
    ok(state.storage.list_services(query.active_only).await?)
}

pub async fn create_service(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiJson(input): ApiJson<ServiceInput>,
) -> ApiResponse<Service> {
    let service = state.storage.create_service(&input).await?;
    audit(&state, &session, "CREATE", "service", service.id, format!("Created service {}", service.servicename)).await;
    ok(service)
}

pub async fn update_service(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<ServiceInput>,
) -> ApiResponse<Service> {
    let service = state.storage.update_service(id, &input).await?;
    audit(&state, &session, "UPDATE", "service", id, format!("Updated service {}", service.servicename)).await;
    ok(service)
}

pub async fn delete_service(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
) -> ApiResponse<&'static str> {
    state.storage.delete_service(id).await?;
    audit(&state, &session, "DELETE", "service", id, format!("Deleted service {}", id)).await;
    ok("Service deleted")
}

pub async fn list_deliverables(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiQuery(query): ApiQuery<CatalogQuery>,
) -> ApiResponse<Vec<Deliverable>> {
    ok(state.storage.list_deliverables(query.active_only).await?)
}

pub async fn create_deliverable(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiJson(input): ApiJson<DeliverableInput>,
) -> ApiResponse<Deliverable> {
    let deliverable = state.storage.create_deliverable(&input).await?;
    audit(&state, &session, "CREATE", "deliverable", deliverable.id, format!("Created deliverable {}", deliverable.deliverable_name)).await;
    ok(deliverable)
}

pub async fn update_deliverable(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<DeliverableInput>,
) -> ApiResponse<Deliverable> {
    let deliverable = state.storage.update_deliverable(id, &input).await?;
    audit(&state, &session, "UPDATE", "deliverable", id, format!("Updated deliverable {}", deliverable.deliverable_name)).await;
    ok(deliverable)
}

pub async fn delete_deliverable(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
) -> ApiResponse<&'static str> {
    state.storage.delete_deliverable(id).await?;
    audit(&state, &session, "DELETE", "deliverable", id, format!("Deleted deliverable {}", id)).await;
    ok("Deliverable deleted")
}

// ---------------------------------------------------------------------------
// Quotations
// ---------------------------------------------------------------------------

pub async fn list_quotations(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiQuery(query): ApiQuery<QuotationListQuery>,
) -> ApiResponse<Vec<Quotation>> {
    ok(state.storage.list_quotations(&query).await?)
}

pub async fn get_quotation(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiPath(id): ApiPath<i64>,
) -> ApiResponse<Quotation> {
    ok(state.storage.get_quotation(id).await?)
}

pub async fn get_quotation_by_slug(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiPath(slug): ApiPath<String>,
) -> ApiResponse<Quotation> {
    ok(state.storage.get_quotation_by_slug(&slug).await?)
}

pub async fn create_quotation(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiJson(input): ApiJson<CreateQuotationInput>,
) -> ApiResponse<Quotation> {
    let quotation = state
        .storage
        .create_quotation(&input, Some(session.employee_id))
        .await?;
    audit(
        &state,
        &session,
        "CREATE",
        "quotation",
        quotation.id,
        format!("Created quotation {} for {}", quotation.quotation_number, quotation.client_name),
    )
    .await;
    ok(quotation)
}

pub async fn update_quotation_status(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
    ApiJson(update): ApiJson<QuotationStatusUpdate>,
) -> ApiResponse<Quotation> {
    let quotation = state.storage.update_quotation_status(id, &update.status).await?;
    audit(
        &state,
        &session,
        "UPDATE",
        "quotation",
        id,
        format!("Quotation {} marked {}", quotation.quotation_number, quotation.status),
    )
    .await;
    ok(quotation)
}

pub async fn recalculate_totals(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> ApiResponse<RecalculationReport> {
    require_admin(&session)?;
    ok(state.storage.recalculate_quotation_totals().await?)
}

pub async fn quotation_analytics(
    State(state): State<Arc<AppState>>,
    _session: Session,
) -> ApiResponse<QuotationAnalytics> {
    ok(state.storage.quotation_analytics().await?)
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

fn no_comments() -> ApprovalDecision {
    ApprovalDecision {
        comments: None,
        price_adjustments: None,
    }
}

pub async fn submit_for_approval(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
) -> ApiResponse<Quotation> {
    ok(state.storage.submit_quotation_for_approval(id, &session).await?)
}

/// Body is optional; an empty approval carries no comments.
pub async fn approve(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
    body: Option<ApiJson<ApprovalDecision>>,
) -> ApiResponse<Quotation> {
    let decision = body.map(|ApiJson(d)| d).unwrap_or_else(no_comments);
    ok(state.storage.approve_quotation(id, &session, &decision).await?)
}

pub async fn reject(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
    body: Option<ApiJson<ApprovalDecision>>,
) -> ApiResponse<Quotation> {
    let decision = body.map(|ApiJson(d)| d).unwrap_or_else(no_comments);
    ok(state.storage.reject_quotation(id, &session, &decision).await?)
}

pub async fn client_confirmation(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
) -> ApiResponse<Quotation> {
    ok(state.storage.record_client_confirmation(id, &session).await?)
}

pub async fn payment(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<PaymentInput>,
) -> ApiResponse<Quotation> {
    ok(state.storage.record_payment(id, &session, &input).await?)
}

pub async fn confirm(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
    body: Option<ApiJson<ConfirmationInput>>,
) -> ApiResponse<Quotation> {
    let input = body.map(|ApiJson(c)| c).unwrap_or_default();
    ok(state.storage.confirm_quotation(id, &session, input).await?)
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
) -> ApiResponse<Quotation> {
    ok(state.storage.cancel_quotation(id, &session).await?)
}

pub async fn pending_approvals(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> ApiResponse<Vec<Quotation>> {
    ok(state.storage.pending_approvals(&session).await?)
}

pub async fn pending_confirmations(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> ApiResponse<Vec<Quotation>> {
    ok(state.storage.pending_confirmations(&session).await?)
}

pub async fn workflow_analytics(
    State(state): State<Arc<AppState>>,
    _session: Session,
) -> ApiResponse<Vec<WorkflowBucket>> {
    ok(state.storage.workflow_analytics().await?)
}
