use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Leads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadStatus {
    Unassigned,
    Assigned,
    New,
    Contacted,
    Qualified,
    Proposal,
    Negotiation,
    ClosedWon,
    ClosedLost,
    Rejected,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 10] = [
        Self::Unassigned,
        Self::Assigned,
        Self::New,
        Self::Contacted,
        Self::Qualified,
        Self::Proposal,
        Self::Negotiation,
        Self::ClosedWon,
        Self::ClosedLost,
        Self::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unassigned => "UNASSIGNED",
            Self::Assigned => "ASSIGNED",
            Self::New => "NEW",
            Self::Contacted => "CONTACTED",
            Self::Qualified => "QUALIFIED",
            Self::Proposal => "PROPOSAL",
            Self::Negotiation => "NEGOTIATION",
            Self::ClosedWon => "CLOSED_WON",
            Self::ClosedLost => "CLOSED_LOST",
            Self::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|status| status.as_str() == upper)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ClosedWon | Self::ClosedLost | Self::Rejected)
    }
}

pub const TERMINAL_LEAD_STATUSES: [&str; 3] = ["CLOSED_WON", "CLOSED_LOST", "REJECTED"];

/// Lead row joined with display names.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Lead {
    pub id: i64,
    pub lead_number: String,
    pub client_name: String,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub company_id: Option<i64>,
    pub company_name: Option<String>,
    pub branch_id: Option<i64>,
    pub branch_name: Option<String>,
    pub assigned_to: Option<i64>,
    pub assigned_to_name: Option<String>,
    pub lead_source_id: Option<i64>,
    pub lead_source_name: String,
    pub status: String,
    pub is_rejected: bool,
    pub rejection_reason: Option<String>,
    pub reassigned_from_employee_id: Option<i64>,
    pub reassigned_at: Option<DateTime<Utc>>,
    pub reassignment_reason: Option<String>,
    pub estimated_value: Option<f64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeadInput {
    pub client_name: String,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub company_id: Option<i64>,
    pub branch_id: Option<i64>,
    pub assigned_to: Option<i64>,
    pub lead_source_id: Option<i64>,
    pub estimated_value: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadListQuery {
    pub assigned_to: Option<i64>,
    pub status: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeadStatusUpdate {
    pub status: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeadAssignment {
    pub employee_id: i64,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkReassignment {
    pub lead_ids: Vec<i64>,
    pub employee_id: i64,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LeadSource {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LeadActivity {
    pub id: i64,
    pub lead_id: i64,
    pub activity_type: String,
    pub description: String,
    pub performed_by: Option<i64>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EmployeeWorkload {
    pub employee_id: i64,
    pub total: i64,
    pub active: i64,
    pub by_status: HashMap<String, i64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LeadAnalytics {
    pub total: i64,
    pub by_status: HashMap<String, i64>,
    pub by_source: HashMap<String, i64>,
    pub conversion_rate: f64,
    pub open_pipeline_value: f64,
}

// ---------------------------------------------------------------------------
// Follow-ups
// ---------------------------------------------------------------------------

pub const FOLLOWUP_TYPES: [&str; 7] = [
    "email",
    "phone",
    "in_person",
    "video_call",
    "text_message",
    "social_media",
    "other",
];
pub const FOLLOWUP_PRIORITIES: [&str; 3] = ["low", "medium", "high"];
pub const FOLLOWUP_STATUSES: [&str; 4] = ["scheduled", "completed", "missed", "cancelled"];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FollowUp {
    pub id: i64,
    pub lead_id: i64,
    pub lead_number: Option<String>,
    pub client_name: Option<String>,
    pub lead_assigned_to: Option<i64>,
    pub estimated_value: Option<f64>,
    pub scheduled_at: DateTime<Utc>,
    pub followup_type: String,
    pub status: String,
    pub priority: String,
    pub notes: Option<String>,
    pub outcome: Option<String>,
    pub interaction_summary: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub follow_up_required: bool,
    pub next_follow_up_date: Option<DateTime<Utc>>,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FollowUpInput {
    pub lead_id: i64,
    pub scheduled_at: DateTime<Utc>,
    pub followup_type: String,
    #[serde(default = "default_priority")]
    pub priority: String,
    pub notes: Option<String>,
    pub interaction_summary: Option<String>,
    #[serde(default)]
    pub follow_up_required: bool,
    pub next_follow_up_date: Option<DateTime<Utc>>,
}

fn default_priority() -> String {
    "medium".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FollowUpCompletion {
    pub outcome: Option<String>,
    pub duration_minutes: Option<i32>,
    #[serde(default)]
    pub follow_up_required: bool,
    pub next_follow_up_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FollowUpStatusUpdate {
    pub status: String,
    #[serde(flatten)]
    pub completion: FollowUpCompletion,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FollowUpQuery {
    pub lead_id: Option<i64>,
    pub status: Option<String>,
    pub assigned_to: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FollowUpStats {
    pub total: i64,
    pub overdue: i64,
    pub by_status: HashMap<String, i64>,
    pub by_type: HashMap<String, i64>,
}

// ---------------------------------------------------------------------------
// Catalogue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Service {
    pub id: i64,
    pub servicename: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub basic_price: f64,
    pub premium_price: f64,
    pub elite_price: f64,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceInput {
    pub servicename: String,
    pub category: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub basic_price: f64,
    #[serde(default)]
    pub premium_price: f64,
    #[serde(default)]
    pub elite_price: f64,
    #[serde(default = "default_service_status")]
    pub status: String,
}

fn default_service_status() -> String {
    "Active".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Deliverable {
    pub id: i64,
    pub deliverable_name: String,
    pub deliverable_cat: String,
    pub deliverable_type: String,
    pub process_name: Option<String>,
    pub basic_total_price: f64,
    pub premium_total_price: f64,
    pub elite_total_price: f64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliverableInput {
    pub deliverable_name: String,
    #[serde(default = "default_deliverable_cat")]
    pub deliverable_cat: String,
    #[serde(default = "default_deliverable_type")]
    pub deliverable_type: String,
    pub process_name: Option<String>,
    #[serde(default)]
    pub basic_total_price: f64,
    #[serde(default)]
    pub premium_total_price: f64,
    #[serde(default)]
    pub elite_total_price: f64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_deliverable_cat() -> String {
    "Main".to_string()
}
fn default_deliverable_type() -> String {
    "Photo".to_string()
}
fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Quotation payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
    pub id: i64,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
}

fn default_quantity() -> f64 {
    1.0
}

/// Per-item price override. Services use `{pkg}_price`, deliverables `{pkg}_total_price`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PriceOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premium_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elite_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_total_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premium_total_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elite_total_price: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomService {
    pub name: String,
    pub price: f64,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
    #[serde(default)]
    pub package_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuotationEventData {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub event_name: String,
    #[serde(default)]
    pub event_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub event_location: Option<String>,
    #[serde(default)]
    pub venue_name: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub expected_crowd: Option<String>,
    /// `basic|premium|elite|custom`, or `default` to inherit the quotation's package.
    #[serde(default = "default_event_package")]
    pub selected_package: String,
    #[serde(default)]
    pub selected_services: Vec<LineItem>,
    #[serde(default)]
    pub selected_deliverables: Vec<LineItem>,
    #[serde(default)]
    pub service_overrides: HashMap<i64, PriceOverride>,
    #[serde(default)]
    pub package_overrides: HashMap<i64, PriceOverride>,
}

fn default_event_package() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuotationData {
    pub client_name: String,
    #[serde(default)]
    pub bride_name: String,
    #[serde(default)]
    pub groom_name: String,
    pub mobile: String,
    #[serde(default)]
    pub mobile_country_code: String,
    #[serde(default)]
    pub whatsapp: String,
    #[serde(default)]
    pub whatsapp_country_code: String,
    #[serde(default)]
    pub alternate_mobile: String,
    #[serde(default)]
    pub alternate_mobile_country_code: String,
    #[serde(default)]
    pub alternate_whatsapp: String,
    #[serde(default)]
    pub alternate_whatsapp_country_code: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub events: Vec<QuotationEventData>,
    pub default_package: String,
    #[serde(default)]
    pub selected_services: Vec<LineItem>,
    #[serde(default)]
    pub selected_deliverables: Vec<LineItem>,
    #[serde(default)]
    pub service_overrides: HashMap<i64, PriceOverride>,
    #[serde(default)]
    pub package_overrides: HashMap<i64, PriceOverride>,
    #[serde(default)]
    pub custom_services: Vec<CustomService>,
}

// ---------------------------------------------------------------------------
// Quotations
// ---------------------------------------------------------------------------

pub const QUOTATION_STATUSES: [&str; 5] = ["draft", "sent", "approved", "rejected", "expired"];
pub const PACKAGES: [&str; 4] = ["basic", "premium", "elite", "custom"];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Quotation {
    pub id: i64,
    pub lead_id: Option<i64>,
    pub follow_up_id: Option<i64>,
    pub quotation_number: String,
    pub slug: String,
    pub client_name: String,
    pub bride_name: String,
    pub groom_name: String,
    pub mobile: String,
    pub whatsapp: Option<String>,
    pub email: Option<String>,
    pub default_package: String,
    pub total_amount: f64,
    pub status: String,
    pub workflow_status: String,
    pub client_verbal_confirmation_date: Option<DateTime<Utc>>,
    pub payment_received_date: Option<DateTime<Utc>>,
    pub payment_amount: Option<f64>,
    pub payment_reference: Option<String>,
    pub created_by: Option<i64>,
    pub quotation_data: serde_json::Value,
    pub events_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateQuotationInput {
    pub lead_id: Option<i64>,
    pub follow_up_id: Option<i64>,
    pub data: QuotationData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuotationListQuery {
    pub lead_id: Option<i64>,
    pub status: Option<String>,
    pub workflow_status: Option<String>,
    pub created_by: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuotationStatusUpdate {
    pub status: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RecalculationReport {
    pub checked: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QuotationAnalytics {
    pub total: i64,
    pub by_status: HashMap<String, i64>,
    pub total_value: f64,
    pub approved_value: f64,
    pub average_deal_size: f64,
    pub sent: i64,
    pub approved: i64,
    pub sent_rate: f64,
    pub approval_rate: f64,
    pub overall_conversion_rate: f64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WorkflowBucket {
    pub workflow_status: String,
    pub count: i64,
    pub total_value: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApprovalDecision {
    pub comments: Option<String>,
    pub price_adjustments: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentInput {
    pub amount: f64,
    pub reference: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfirmationInput {
    pub client_contact_person: Option<String>,
    pub confirmation_method: Option<String>,
    #[serde(default)]
    pub deliverables_confirmed: serde_json::Value,
    #[serde(default)]
    pub event_details_confirmed: serde_json::Value,
    pub client_expectations: Option<String>,
}
