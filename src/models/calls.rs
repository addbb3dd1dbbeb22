use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Self::Positive,
            "negative" => Self::Negative,
            _ => Self::Neutral,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    High,
    #[default]
    Medium,
    Low,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Medium,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionInput {
    pub call_id: String,
    pub task_id: Option<i64>,
    pub lead_id: Option<i64>,
    pub client_name: String,
    pub sales_agent: String,
    pub phone_number: String,
    #[serde(default)]
    pub duration: i32,
    pub recording_url: Option<String>,
    pub transcript: String,
    #[serde(default = "default_confidence")]
    pub confidence_score: f64,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_confidence() -> f64 {
    0.8
}
fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CallTranscription {
    pub id: Uuid,
    pub call_id: String,
    pub task_id: Option<i64>,
    pub lead_id: Option<i64>,
    pub client_name: String,
    pub sales_agent: String,
    pub phone_number: String,
    pub duration: i32,
    pub recording_url: Option<String>,
    pub transcript: String,
    pub confidence_score: f64,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

/// Agent scores on a 1 to 10 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentPerformance {
    pub professionalism: f64,
    pub responsiveness: f64,
    pub knowledge: f64,
    pub closing_effectiveness: f64,
}

impl Default for AgentPerformance {
    fn default() -> Self {
        Self {
            professionalism: 7.0,
            responsiveness: 7.0,
            knowledge: 7.0,
            closing_effectiveness: 7.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientBehavior {
    pub engagement_level: Level,
    pub interest_level: Level,
    pub objections: Vec<String>,
    pub buying_signals: Vec<String>,
}

/// Result of analysing one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallAnalysis {
    pub overall_sentiment: Sentiment,
    pub sentiment_score: f64,
    pub client_sentiment: Sentiment,
    pub agent_sentiment: Sentiment,
    pub call_intent: String,
    pub key_topics: Vec<String>,
    pub business_outcomes: Vec<String>,
    pub action_items: Vec<String>,
    pub agent_performance: AgentPerformance,
    pub client_behavior: ClientBehavior,
    pub forbidden_words_detected: Vec<String>,
    pub compliance_issues: Vec<String>,
    pub risk_level: Level,
    pub talk_time_ratio: f64,
    pub interruptions: i32,
    pub silent_periods: i32,
    pub call_quality_score: f64,
    pub quote_discussed: bool,
    pub budget_mentioned: bool,
    pub timeline_discussed: bool,
    pub next_steps_agreed: bool,
    pub follow_up_required: bool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CallAnalyticsRow {
    pub id: Uuid,
    pub call_id: String,
    pub overall_sentiment: String,
    pub sentiment_score: f64,
    pub client_sentiment: String,
    pub agent_sentiment: String,
    pub call_intent: String,
    pub key_topics: Vec<String>,
    pub business_outcomes: Vec<String>,
    pub action_items: Vec<String>,
    pub agent_performance: serde_json::Value,
    pub client_behavior: serde_json::Value,
    pub forbidden_words_detected: Vec<String>,
    pub compliance_issues: Vec<String>,
    pub risk_level: String,
    pub talk_time_ratio: f64,
    pub interruptions: i32,
    pub silent_periods: i32,
    pub call_quality_score: f64,
    pub quote_discussed: bool,
    pub budget_mentioned: bool,
    pub timeline_discussed: bool,
    pub next_steps_agreed: bool,
    pub follow_up_required: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallSummaryFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub agent: Option<String>,
    pub client: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CallSummary {
    pub total_calls: i64,
    pub avg_sentiment_score: f64,
    pub avg_quality_score: f64,
    pub avg_duration_secs: f64,
    pub high_risk_calls: i64,
    pub follow_ups_required: i64,
    pub positive: i64,
    pub neutral: i64,
    pub negative: i64,
}
