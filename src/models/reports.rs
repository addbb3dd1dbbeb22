use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Raw report query string. List filters are comma-separated
/// (`?employees=3,7&statuses=NEW,QUALIFIED`); dates are `YYYY-MM-DD`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub lead_sources: Option<String>,
    pub employees: Option<String>,
    pub statuses: Option<String>,
    pub companies: Option<String>,
    pub branches: Option<String>,
}

/// Parsed filters. `until` is exclusive: the day after `to`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportFilters {
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub lead_source_ids: Vec<i64>,
    pub employee_ids: Vec<i64>,
    pub statuses: Vec<String>,
    pub company_ids: Vec<i64>,
    pub branch_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LeadSourceReportRow {
    pub id: i64,
    pub lead_number: String,
    pub client_name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub lead_source_id: Option<i64>,
    pub lead_source_name: String,
    pub assigned_to: Option<i64>,
    pub employee_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadSourceSummary {
    pub lead_source_name: String,
    pub total: i64,
    pub won: i64,
    pub lost: i64,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeadSourceReport {
    pub summary: Vec<LeadSourceSummary>,
    pub leads: Vec<LeadSourceReportRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct FunnelStage {
    pub status: String,
    pub lead_source_id: Option<i64>,
    pub lead_source_name: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct TeamStatusCount {
    pub employee_id: i64,
    pub employee_name: String,
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamMemberSummary {
    pub employee_id: i64,
    pub employee_name: String,
    pub total: i64,
    pub active: i64,
    pub won: i64,
    pub lost: i64,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamPerformance {
    pub members: Vec<TeamMemberSummary>,
    pub by_status: Vec<TeamStatusCount>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub status: String,
    pub lead_source_name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FilterOption {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusOption {
    pub id: &'static str,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportFilterOptions {
    pub lead_sources: Vec<FilterOption>,
    pub employees: Vec<FilterOption>,
    pub companies: Vec<FilterOption>,
    pub branches: Vec<FilterOption>,
    pub statuses: Vec<StatusOption>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LeadReportRow {
    pub id: i64,
    pub lead_number: String,
    pub client_name: String,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub status: String,
    pub estimated_value: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub assigned_to_name: Option<String>,
    pub branch_name: Option<String>,
    pub company_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct QuotationReportRow {
    pub id: i64,
    pub quotation_number: String,
    pub client_name: String,
    pub total_amount: f64,
    pub status: String,
    pub workflow_status: String,
    pub created_at: DateTime<Utc>,
    pub created_by_name: Option<String>,
    pub lead_number: Option<String>,
}

/// Flat report rows with their count and summed value.
#[derive(Debug, Clone, Serialize)]
pub struct ReportRows<T> {
    pub count: usize,
    pub total_value: f64,
    pub data: Vec<T>,
}
