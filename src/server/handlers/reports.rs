use std::sync::Arc;

use axum::extract::State;

use super::common::{ok, ApiQuery, ApiResponse};
use crate::auth::Session;
use crate::models::{
    FunnelStage, LeadReportRow, LeadSourceReport, QuotationReportRow, ReportFilterOptions,
    ReportQuery, ReportRows, TeamPerformance, TrendPoint,
};
use crate::server::state::AppState;
use crate::storage::report_filters;

pub async fn lead_sources(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiQuery(query): ApiQuery<ReportQuery>,
) -> ApiResponse<LeadSourceReport> {
    let filters = report_filters(&query)?;
    ok(state.storage.lead_source_report(&filters).await?)
}

pub async fn conversion_funnel(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiQuery(query): ApiQuery<ReportQuery>,
) -> ApiResponse<Vec<FunnelStage>> {
    let filters = report_filters(&query)?;
    ok(state.storage.conversion_funnel(&filters).await?)
}

pub async fn team_performance(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiQuery(query): ApiQuery<ReportQuery>,
) -> ApiResponse<TeamPerformance> {
    let filters = report_filters(&query)?;
    ok(state.storage.team_performance(&filters).await?)
}

pub async fn trends(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiQuery(query): ApiQuery<ReportQuery>,
) -> ApiResponse<Vec<TrendPoint>> {
    let filters = report_filters(&query)?;
    ok(state.storage.lead_trends(&filters).await?)
}

pub async fn filter_options(
    State(state): State<Arc<AppState>>,
    _session: Session,
) -> ApiResponse<ReportFilterOptions> {
    ok(state.storage.report_filter_options().await?)
}

pub async fn leads(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiQuery(query): ApiQuery<ReportQuery>,
) -> ApiResponse<ReportRows<LeadReportRow>> {
    let filters = report_filters(&query)?;
    ok(state.storage.leads_report(&filters).await?)
}

pub async fn quotations(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiQuery(query): ApiQuery<ReportQuery>,
) -> ApiResponse<ReportRows<QuotationReportRow>> {
    let filters = report_filters(&query)?;
    ok(state.storage.quotations_report(&filters).await?)
}
