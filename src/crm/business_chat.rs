//! Natural-language questions answered from live business records.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::format_amount;
use crate::llm::{GenerateOptions, LanguageModel};
use crate::models::{Employee, Lead, Quotation, Task};

pub const LEAD_LIMIT: i64 = 20;
pub const QUOTATION_LIMIT: i64 = 15;
pub const TASK_LIMIT: i64 = 15;

pub const APOLOGY: &str =
    "I apologize, but I encountered an error accessing the business data. Please try again.";

static PROPER_NOUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-z]+\b").expect("static regex"));

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub query: String,
}

/// Which record sets a question needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataNeeds {
    pub leads: bool,
    pub quotations: bool,
    pub tasks: bool,
    pub employees: bool,
}

impl DataNeeds {
    pub fn all() -> Self {
        Self {
            leads: true,
            quotations: true,
            tasks: true,
            employees: true,
        }
    }

    /// Keyword routing. A capitalised word (likely a name) or no match fetches everything.
    pub fn for_query(query: &str) -> Self {
        let lower = query.to_lowercase();
        let any = |words: &[&str]| words.iter().any(|w| lower.contains(w));
        let needs = Self {
            leads: any(&["lead", "client", "prospect"]),
            quotations: any(&["quotation", "quote", "price", "amount", "revenue"]),
            tasks: any(&["task", "work", "progress", "status"]),
            employees: any(&["employee", "team", "staff"]),
        };
        if PROPER_NOUN.is_match(query) || needs == Self::default() {
            Self::all()
        } else {
            needs
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BusinessContext {
    pub leads: Vec<Lead>,
    pub quotations: Vec<Quotation>,
    pub tasks: Vec<Task>,
    pub employees: Vec<Employee>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DataUsed {
    pub leads: usize,
    pub quotations: usize,
    pub tasks: usize,
    pub employees: usize,
}

impl From<&BusinessContext> for DataUsed {
    fn from(ctx: &BusinessContext) -> Self {
        Self {
            leads: ctx.leads.len(),
            quotations: ctx.quotations.len(),
            tasks: ctx.tasks.len(),
            employees: ctx.employees.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub confidence: f64,
    pub sources: Vec<String>,
    pub suggested_actions: Vec<String>,
    pub data_used: DataUsed,
}

impl ChatResponse {
    pub fn apology() -> Self {
        Self {
            response: APOLOGY.to_string(),
            confidence: 0.0,
            sources: Vec::new(),
            suggested_actions: Vec::new(),
            data_used: DataUsed::default(),
        }
    }
}

fn or<'a>(value: Option<&'a str>, fallback: &'a str) -> &'a str {
    value.filter(|v| !v.trim().is_empty()).unwrap_or(fallback)
}

fn amount(value: Option<f64>) -> String {
    value
        .map(|v| format!("₹{}", format_amount(v)))
        .unwrap_or_else(|| "Not specified".to_string())
}

pub fn build_prompt(query: &str, ctx: &BusinessContext) -> String {
    let mut out = String::from(
        "You are the AI assistant for OOAK Photography & Videography. You have access to the business records below and must give accurate, specific answers.\n\nCURRENT BUSINESS DATA:\n\n",
    );

    out.push_str(&format!("RECENT LEADS ({} total):\n", ctx.leads.len()));
    for (i, lead) in ctx.leads.iter().take(10).enumerate() {
        out.push_str(&format!(
            "{}. {}\n   - Lead Number: {}\n   - Email: {}\n   - Phone: {}\n   - Company: {}\n   - Source: {}\n   - Status: {}\n   - Estimated Value: {}\n   - Notes: {}\n   - Assigned to: {}\n   - Created: {}\n\n",
            i + 1,
            lead.client_name,
            lead.lead_number,
            or(lead.client_email.as_deref(), "Not provided"),
            or(lead.client_phone.as_deref(), "Not provided"),
            or(lead.company_name.as_deref(), "Not provided"),
            lead.lead_source_name,
            lead.status,
            amount(lead.estimated_value),
            or(lead.notes.as_deref(), "No notes"),
            or(lead.assigned_to_name.as_deref(), "Unassigned"),
            lead.created_at.format("%Y-%m-%d"),
        ));
    }

    out.push_str(&format!("RECENT QUOTATIONS ({} total):\n", ctx.quotations.len()));
    for (i, q) in ctx.quotations.iter().take(8).enumerate() {
        out.push_str(&format!(
            "{}. {} - {}\n   - Number: {}\n   - Package: {}\n   - Events: {}\n   - Status: {}\n   - Workflow: {}\n   - Created: {}\n\n",
            i + 1,
            q.client_name,
            amount(Some(q.total_amount)),
            q.quotation_number,
            q.default_package,
            q.events_count,
            q.status,
            q.workflow_status,
            q.created_at.format("%Y-%m-%d"),
        ));
    }

    out.push_str(&format!("ACTIVE TASKS ({} total):\n", ctx.tasks.len()));
    for (i, t) in ctx.tasks.iter().take(8).enumerate() {
        out.push_str(&format!(
            "{}. {}\n   - Client: {}\n   - Status: {}\n   - Priority: {}\n   - Estimated Value: {}\n   - Business Impact: {}\n   - Assigned to: {}\n   - Due Date: {}\n   - Created: {}\n\n",
            i + 1,
            t.title,
            or(t.client_name.as_deref(), "Unknown"),
            t.status,
            t.priority,
            amount(t.estimated_value),
            or(t.business_impact.as_deref(), "Not specified"),
            or(t.assigned_to_name.as_deref(), "Unassigned"),
            t.due_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "No due date".to_string()),
            t.created_at.format("%Y-%m-%d"),
        ));
    }

    out.push_str(&format!("TEAM MEMBERS ({} total):\n", ctx.employees.len()));
    for (i, e) in ctx.employees.iter().enumerate() {
        out.push_str(&format!(
            "{}. {}\n   - Email: {}\n   - Department: {}\n   - Designation: {}\n   - Employee ID: {}\n\n",
            i + 1,
            e.full_name(),
            or(e.email.as_deref(), "Not provided"),
            or(e.department_name.as_deref(), "Not specified"),
            or(e.job_title.as_deref().or(e.designation_name.as_deref()), "Not specified"),
            e.employee_id,
        ));
    }

    out.push_str(
        "BUSINESS INTELLIGENCE RULES:\n\
         1. ONLY use the data provided above - NEVER make up information\n\
         2. For specific client names, search through all the data carefully\n\
         3. Provide exact amounts, dates, and details from the records\n\
         4. If information isn't available in the data, clearly state that\n\
         5. Reference specific records when providing information\n\
         6. Calculate totals and summaries from the actual data\n\
         7. Suggest actionable next steps based on the current business state\n\n",
    );
    out.push_str(&format!("USER QUERY: {}\n\n", query));
    out.push_str(
        "Answer using ONLY the business data above. If the query asks about someone or something not in the data, clearly state that you don't have that information in the current records.",
    );
    out
}

pub fn confidence(response: &str) -> f64 {
    let mut c: f64 = 0.5;
    if response.contains('₹') {
        c += 0.2;
    }
    if response.contains("Created:") || response.contains("Date:") {
        c += 0.1;
    }
    if response.contains("Status:") {
        c += 0.1;
    }
    if response.chars().count() > 200 {
        c += 0.1;
    }
    if !response.contains("I don't have") {
        c += 0.1;
    }
    c.min(1.0)
}

pub fn sources(response: &str) -> Vec<String> {
    let mut out = Vec::new();
    if response.contains("lead") {
        out.push("leads_table".to_string());
    }
    if response.contains("quotation") || response.contains('₹') {
        out.push("quotations_table".to_string());
    }
    if response.contains("task") {
        out.push("tasks_table".to_string());
    }
    if response.contains("employee") || response.contains("team") {
        out.push("employees_table".to_string());
    }
    out
}

pub fn suggested_actions(response: &str) -> Vec<String> {
    let mut out = Vec::new();
    if response.contains("follow up") || response.contains("contact") {
        out.push("Schedule follow-up call or meeting".to_string());
    }
    if response.contains("quotation") && response.contains("pending") {
        out.push("Send quotation reminder".to_string());
    }
    if response.contains("task") && response.contains("pending") {
        out.push("Review pending tasks".to_string());
    }
    if response.contains("revenue") || response.contains("amount") {
        out.push("Analyze revenue opportunities".to_string());
    }
    out
}

pub async fn answer(query: &str, ctx: &BusinessContext, model: &dyn LanguageModel) -> ChatResponse {
    let options = GenerateOptions {
        temperature: 0.3,
        max_tokens: 1500,
        json: false,
    };
    match model.generate(&build_prompt(query, ctx), options).await {
        Ok(text) if !text.trim().is_empty() => ChatResponse {
            confidence: confidence(&text),
            sources: sources(&text),
            suggested_actions: suggested_actions(&text),
            data_used: DataUsed::from(ctx),
            response: text,
        },
        Ok(_) => ChatResponse {
            response: "No response generated".to_string(),
            confidence: 0.0,
            sources: Vec::new(),
            suggested_actions: Vec::new(),
            data_used: DataUsed::from(ctx),
        },
        Err(e) => {
            tracing::warn!(error = %e, "business chat generation failed");
            ChatResponse::apology()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;

    #[test]
    fn test_data_needs_routing() {
        let needs = DataNeeds::for_query("how many leads came this week?");
        assert_eq!(
            needs,
            DataNeeds {
                leads: true,
                ..Default::default()
            }
        );

        let needs = DataNeeds::for_query("total revenue and pending tasks");
        assert!(needs.quotations && needs.tasks && !needs.leads && !needs.employees);

        assert_eq!(DataNeeds::for_query("what about Priya?"), DataNeeds::all());
        assert_eq!(DataNeeds::for_query("hello there"), DataNeeds::all());
    }

    #[test]
    fn test_confidence_scoring() {
        assert_eq!(confidence("I don't have that"), 0.5);
        assert_eq!(confidence("short"), 0.6);
        let rich = format!("Status: approved, Created: 2024-01-01, ₹50,000 {}", "x".repeat(200));
        assert_eq!(confidence(&rich), 1.0);
    }

    #[test]
    fn test_sources_and_actions() {
        let text = "The lead has a pending quotation worth ₹1,00,000; follow up with the team.";
        assert_eq!(
            sources(text),
            vec!["leads_table", "quotations_table", "employees_table"]
        );
        assert_eq!(
            suggested_actions(text),
            vec!["Schedule follow-up call or meeting", "Send quotation reminder"]
        );
    }

    #[test]
    fn test_prompt_contains_query_and_counts() {
        let prompt = build_prompt("Who is our top client?", &BusinessContext::default());
        assert!(prompt.contains("RECENT LEADS (0 total):"));
        assert!(prompt.contains("TEAM MEMBERS (0 total):"));
        assert!(prompt.contains("USER QUERY: Who is our top client?"));
    }

    #[tokio::test]
    async fn test_answer_and_failure() {
        let ctx = BusinessContext::default();
        let model = ScriptedModel::replying("There are no leads in the records.");
        let resp = answer("leads?", &ctx, &model).await;
        assert_eq!(resp.response, "There are no leads in the records.");
        assert_eq!(resp.sources, vec!["leads_table"]);
        assert!(resp.confidence > 0.5);

        let resp = answer("leads?", &ctx, &ScriptedModel::failing()).await;
        assert_eq!(resp, ChatResponse::apology());
    }
}
