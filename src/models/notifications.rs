use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const NOTIFICATION_TYPES: [&str; 8] = [
    "overdue",
    "approval_needed",
    "payment_received",
    "client_followup",
    "automation",
    "task_assigned",
    "escalation",
    "system",
];
pub const NOTIFICATION_PRIORITIES: [&str; 4] = ["low", "medium", "high", "urgent"];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: i64,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
    pub priority: String,
    pub title: String,
    pub message: String,
    pub quotation_id: Option<i64>,
    pub is_read: bool,
    pub action_url: Option<String>,
    pub action_label: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewNotification {
    pub user_id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_priority")]
    pub priority: String,
    pub title: String,
    pub message: String,
    pub quotation_id: Option<i64>,
    pub action_url: Option<String>,
    pub action_label: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

fn default_priority() -> String {
    "medium".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub priority: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub is_read: Option<bool>,
    #[serde(default)]
    pub business_only: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    pub total: i64,
    pub unread: i64,
    pub page: i64,
    pub limit: i64,
}

pub const ACTIVITY_ACTIONS: [&str; 4] = ["CREATE", "UPDATE", "DELETE", "LOGIN"];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Activity {
    pub id: i64,
    pub user_id: Option<i64>,
    pub user_name: String,
    pub action_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewActivity {
    pub user_id: Option<i64>,
    pub user_name: String,
    pub action_type: &'static str,
    pub entity_type: &'static str,
    pub entity_id: String,
    pub description: String,
}
