use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    /// Stored form in `ai_tasks.priority`.
    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Urgent => "URGENT",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

pub const TASK_STATUSES: [&str; 4] = ["PENDING", "IN_PROGRESS", "COMPLETED", "CANCELLED"];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Task {
    pub id: i64,
    pub task_number: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: String,
    pub status: String,
    pub due_date: Option<DateTime<Utc>>,
    pub category: String,
    pub assigned_to_employee_id: Option<i64>,
    pub assigned_to_name: Option<String>,
    pub assigned_by: Option<String>,
    pub lead_id: Option<i64>,
    pub quotation_id: Option<i64>,
    pub client_name: Option<String>,
    pub business_impact: Option<String>,
    pub ai_reasoning: Option<String>,
    pub estimated_value: Option<f64>,
    pub estimated_hours: Option<f64>,
    pub automation_source: Option<String>,
    pub metadata: serde_json::Value,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for `ai_tasks`, produced by the rule engine, the follow-up
/// migration and call analysis.
#[derive(Debug, Clone, Serialize)]
pub struct NewTask {
    pub task_number: String,
    pub title: String,
    pub description: String,
    pub priority: TaskPriority,
    pub status: String,
    pub due_date: DateTime<Utc>,
    pub category: String,
    pub assigned_to_employee_id: Option<i64>,
    pub assigned_by: String,
    pub lead_id: Option<i64>,
    pub quotation_id: Option<i64>,
    pub client_name: Option<String>,
    pub business_impact: String,
    pub ai_reasoning: String,
    pub estimated_value: f64,
    pub estimated_hours: f64,
    pub automation_source: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskFilter {
    pub assigned_to: Option<i64>,
    pub status: Option<String>,
    pub lead_id: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskAnalytics {
    pub total: i64,
    pub overdue: i64,
    pub by_status: HashMap<String, i64>,
    pub by_priority: HashMap<String, i64>,
    pub by_rule: HashMap<String, i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskGenerationLog {
    pub lead_id: Option<i64>,
    pub quotation_id: Option<i64>,
    pub rule_triggered: String,
    pub task_id: Option<i64>,
    pub success: bool,
    pub error_message: Option<String>,
    pub metadata: serde_json::Value,
}

/// Outcome of evaluating the task rules for one lead event.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskGenerationResult {
    pub event: String,
    pub lead_id: i64,
    pub tasks: Vec<Task>,
    pub skipped_rules: Vec<String>,
    pub insights: Vec<String>,
}

/// Manual rule evaluation for one lead.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateTasksRequest {
    pub lead_id: i64,
    pub quotation_id: Option<i64>,
    pub event: crate::crm::task_rules::LeadEvent,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskStatusUpdate {
    pub status: String,
}
