//! Rule table that turns lead and quotation events into work items.
//!
//! Evaluation is pure: given an event, the lead context and the candidate
//! employees, it yields the tasks to insert. Persistence, dedup lookups and
//! logging live in the storage layer.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::format_amount;
use crate::models::{EmployeeCandidate, LeadStatus, NewTask, TaskPriority};

pub const DEFAULT_ESTIMATED_VALUE: f64 = 30000.0;
pub const HIGH_VALUE_THRESHOLD: f64 = 100000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LeadEvent {
    LeadAssigned,
    LeadStatusChanged { from: LeadStatus, to: LeadStatus },
    QuotationCreated,
    QuotationSent,
    QuotationApproved,
}

impl LeadEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LeadAssigned => "lead_assigned",
            Self::LeadStatusChanged { .. } => "lead_status_changed",
            Self::QuotationCreated => "quotation_created",
            Self::QuotationSent => "quotation_sent",
            Self::QuotationApproved => "quotation_approved",
        }
    }

    /// Events that carry no payload, by name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "lead_assigned" => Some(Self::LeadAssigned),
            "quotation_created" => Some(Self::QuotationCreated),
            "quotation_sent" => Some(Self::QuotationSent),
            "quotation_approved" => Some(Self::QuotationApproved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuotationRef {
    pub id: i64,
    pub quotation_number: String,
    pub total_amount: f64,
}

/// What the rules know about the lead at the time of the event.
#[derive(Debug, Clone, Serialize)]
pub struct LeadContext {
    pub lead_id: i64,
    pub lead_number: String,
    pub client_name: String,
    pub status: LeadStatus,
    pub estimated_value: Option<f64>,
    pub assigned_to: Option<i64>,
    pub quotation: Option<QuotationRef>,
}

impl LeadContext {
    fn value_or_default(&self) -> f64 {
        self.estimated_value
            .filter(|v| *v > 0.0)
            .unwrap_or(DEFAULT_ESTIMATED_VALUE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Experience {
    Junior,
    Senior,
    Expert,
}

impl Experience {
    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Self::Expert => &["head", "manager", "senior", "lead"],
            Self::Senior => &["senior", "head", "lead"],
            Self::Junior => &["junior", "associate", "resource"],
        }
    }
}

#[derive(Debug)]
pub struct TaskRule {
    pub id: &'static str,
    pub name: &'static str,
    pub priority: TaskPriority,
    pub sla_hours: i64,
    pub departments: &'static [&'static str],
    pub designations: &'static [&'static str],
    pub experience: Option<Experience>,
    pub balance_workload: bool,
    /// Keep the task with the lead's owner when they are active.
    pub prefer_lead_owner: bool,
    pub estimated_hours: f64,
}

impl TaskRule {
    pub fn automation_source(&self) -> String {
        format!("ai_rule_{}", self.id)
    }

    pub fn fires(&self, event: &LeadEvent, ctx: &LeadContext) -> bool {
        match self.id {
            "lead_assignment_initial_contact" => {
                matches!(event, LeadEvent::LeadAssigned)
                    || matches!(
                        event,
                        LeadEvent::LeadStatusChanged {
                            from: LeadStatus::Unassigned,
                            to: LeadStatus::Assigned
                        }
                    )
            }
            "lead_qualification_task" => matches!(
                event,
                LeadEvent::LeadStatusChanged {
                    to: LeadStatus::Contacted,
                    ..
                }
            ),
            "quotation_preparation_task" => matches!(
                event,
                LeadEvent::LeadStatusChanged {
                    to: LeadStatus::Qualified,
                    ..
                }
            ),
            "high_value_lead_escalation" => {
                ctx.estimated_value.unwrap_or(0.0) >= HIGH_VALUE_THRESHOLD
                    && matches!(
                        event,
                        LeadEvent::LeadAssigned | LeadEvent::LeadStatusChanged { .. }
                    )
                    && ctx.status == LeadStatus::Assigned
            }
            "quotation_followup_task" => {
                matches!(event, LeadEvent::QuotationSent) && ctx.quotation.is_some()
            }
            "payment_followup_task" => {
                matches!(event, LeadEvent::QuotationApproved) && ctx.quotation.is_some()
            }
            _ => false,
        }
    }
}

pub static RULES: [TaskRule; 6] = [
    TaskRule {
        id: "lead_assignment_initial_contact",
        name: "Initial Contact Task on Lead Assignment",
        priority: TaskPriority::Medium,
        sla_hours: 24,
        departments: &["SALES"],
        designations: &["Sales Head", "Sales Resource"],
        experience: Some(Experience::Senior),
        balance_workload: true,
        prefer_lead_owner: true,
        estimated_hours: 1.0,
    },
    TaskRule {
        id: "lead_qualification_task",
        name: "Lead Qualification Task",
        priority: TaskPriority::Medium,
        sla_hours: 48,
        departments: &["SALES"],
        designations: &["Sales Head", "Senior Sales"],
        experience: Some(Experience::Senior),
        balance_workload: false,
        prefer_lead_owner: true,
        estimated_hours: 2.0,
    },
    TaskRule {
        id: "quotation_preparation_task",
        name: "Quotation Preparation Task",
        priority: TaskPriority::High,
        sla_hours: 48,
        departments: &["SALES"],
        designations: &["Sales Head"],
        experience: Some(Experience::Expert),
        balance_workload: false,
        prefer_lead_owner: false,
        estimated_hours: 4.0,
    },
    TaskRule {
        id: "high_value_lead_escalation",
        name: "High-Value Lead Escalation",
        priority: TaskPriority::Urgent,
        sla_hours: 12,
        departments: &["SALES"],
        designations: &["Manager", "Sales Head"],
        experience: Some(Experience::Expert),
        balance_workload: false,
        prefer_lead_owner: false,
        estimated_hours: 2.0,
    },
    TaskRule {
        id: "quotation_followup_task",
        name: "Quotation Follow-up Task",
        priority: TaskPriority::High,
        sla_hours: 24,
        departments: &["SALES"],
        designations: &["Sales Resource", "Sales Head"],
        experience: None,
        balance_workload: true,
        prefer_lead_owner: true,
        estimated_hours: 1.0,
    },
    TaskRule {
        id: "payment_followup_task",
        name: "Payment Follow-up Task",
        priority: TaskPriority::High,
        sla_hours: 72,
        departments: &["ACCOUNTS"],
        designations: &["Sales Head", "Accounts Manager"],
        experience: None,
        balance_workload: true,
        prefer_lead_owner: false,
        estimated_hours: 1.0,
    },
];

pub fn matching_rules(event: &LeadEvent, ctx: &LeadContext) -> Vec<&'static TaskRule> {
    RULES.iter().filter(|r| r.fires(event, ctx)).collect()
}

pub fn find_rule(id: &str) -> Option<&'static TaskRule> {
    RULES.iter().find(|r| r.id == id)
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(&needle.to_lowercase()))
}

/// Keep the candidates matching `keep`, unless that would leave nobody.
fn narrow<'a>(
    pool: Vec<&'a EmployeeCandidate>,
    keep: impl Fn(&EmployeeCandidate) -> bool,
) -> Vec<&'a EmployeeCandidate> {
    let narrowed: Vec<_> = pool.iter().copied().filter(|c| keep(c)).collect();
    if narrowed.is_empty() {
        pool
    } else {
        narrowed
    }
}

/// Pick an assignee: department, then designation, then experience keywords
/// (each narrowing only when it leaves someone), then the lightest workload.
pub fn select_assignee<'a>(
    rule: &TaskRule,
    candidates: &'a [EmployeeCandidate],
    lead_owner: Option<i64>,
) -> Option<&'a EmployeeCandidate> {
    if rule.prefer_lead_owner {
        if let Some(owner) = lead_owner.and_then(|id| candidates.iter().find(|c| c.id == id)) {
            return Some(owner);
        }
    }

    let mut pool: Vec<&EmployeeCandidate> = candidates
        .iter()
        .filter(|c| {
            rule.departments
                .iter()
                .any(|d| contains_ci(c.department_name.as_deref(), d))
        })
        .collect();
    if pool.is_empty() {
        pool = candidates.iter().collect();
    }

    if !rule.designations.is_empty() {
        pool = narrow(pool, |c| {
            rule.designations.iter().any(|d| {
                contains_ci(c.designation_name.as_deref(), d) || contains_ci(c.job_title.as_deref(), d)
            })
        });
    }

    if let Some(level) = rule.experience {
        pool = narrow(pool, |c| {
            level.keywords().iter().any(|k| {
                contains_ci(c.designation_name.as_deref(), k) || contains_ci(c.job_title.as_deref(), k)
            })
        });
    }

    if rule.balance_workload {
        return pool.into_iter().min_by_key(|c| (c.open_tasks, c.id));
    }
    pool.into_iter().next()
}

/// `AI-{unix_ms}-{5 uppercase alphanumerics}`
pub fn task_number<R: Rng>(now: DateTime<Utc>, rng: &mut R) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let suffix: String = (0..5)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();
    format!("AI-{}-{}", now.timestamp_millis(), suffix)
}

struct TaskText {
    title: String,
    description: String,
    reasoning: String,
    impact: String,
    estimated_value: f64,
    task_type: &'static str,
}

fn task_text(rule: &TaskRule, ctx: &LeadContext) -> TaskText {
    let client = &ctx.client_name;
    let value = ctx.value_or_default();
    let quote = ctx.quotation.as_ref();
    let quote_number = quote.map(|q| q.quotation_number.as_str()).unwrap_or("-");
    let quote_total = quote.map(|q| q.total_amount).unwrap_or(value);

    match rule.id {
        "lead_assignment_initial_contact" => TaskText {
            title: format!("Initial contact with {}", client),
            description: format!(
                "Make initial contact with {} (Lead #{}). Introduce yourself, understand their requirements, and schedule a detailed discussion.",
                client, ctx.lead_number
            ),
            reasoning: format!(
                "New lead assigned and requires initial contact within 24 hours. Estimated value: ₹{}.",
                format_amount(value)
            ),
            impact: format!("First Impression • Pipeline Entry • Revenue Opportunity: ₹{}", format_amount(value)),
            estimated_value: value,
            task_type: "lead_follow_up",
        },
        "lead_qualification_task" => TaskText {
            title: format!("Qualify lead requirements - {}", client),
            description: format!(
                "Conduct detailed qualification of {}. Understand their needs, budget, timeline and decision process before quotation preparation.",
                client
            ),
            reasoning: format!(
                "Lead has been contacted and is ready for qualification. Budget estimate ₹{}.",
                format_amount(value)
            ),
            impact: "Lead Qualification • Requirements Gathering • Pipeline Progression".to_string(),
            estimated_value: value,
            task_type: "lead_follow_up",
        },
        "quotation_preparation_task" => TaskText {
            title: format!("Prepare quotation for {}", client),
            description: format!(
                "Prepare a quotation for {} based on the qualified requirements. Include services, pricing, terms and deliverables.",
                client
            ),
            reasoning: format!(
                "Lead is qualified. Quotation due within 48 hours to keep momentum. Estimated value: ₹{}.",
                format_amount(value)
            ),
            impact: format!("Revenue Generation • Deal Closure • Value: ₹{}", format_amount(value)),
            estimated_value: value,
            task_type: "quotation_approval",
        },
        "high_value_lead_escalation" => {
            let raw = ctx.estimated_value.unwrap_or(0.0);
            TaskText {
                title: format!("HIGH VALUE: Manage lead {} (₹{})", client, format_amount(raw)),
                description: format!(
                    "High-value lead (₹{}) requires immediate management attention. Client: {}.",
                    format_amount(raw),
                    client
                ),
                reasoning: format!(
                    "Lead worth ₹{} needs management handling within 12 hours.",
                    format_amount(raw)
                ),
                impact: format!("CRITICAL REVENUE: ₹{} • Executive Attention Required", format_amount(raw)),
                estimated_value: if raw > 0.0 { raw } else { HIGH_VALUE_THRESHOLD },
                task_type: "lead_follow_up",
            }
        }
        "quotation_followup_task" => TaskText {
            title: format!("Follow up with {} about quotation", client),
            description: format!(
                "Follow up with {} regarding quotation {} (₹{}). Answer questions and request feedback on the proposal.",
                client,
                quote_number,
                format_amount(quote_total)
            ),
            reasoning: format!(
                "Quotation sent and needs follow-up within 24 hours. Value: ₹{}.",
                format_amount(quote_total)
            ),
            impact: format!("Revenue Recovery: ₹{} • Deal Closure", format_amount(quote_total)),
            estimated_value: quote_total,
            task_type: "quotation_follow_up",
        },
        _ => TaskText {
            title: format!("Payment follow-up for {}", client),
            description: format!(
                "Follow up on payment for approved quotation {} from {} (₹{}). Send a reminder and confirm the timeline.",
                quote_number,
                client,
                format_amount(quote_total)
            ),
            reasoning: format!(
                "Quotation approved. Payment follow-up required within 3 days. Value: ₹{}.",
                format_amount(quote_total)
            ),
            impact: format!("Cash Flow: ₹{} • Revenue Realization", format_amount(quote_total)),
            estimated_value: quote_total,
            task_type: "payment_follow_up",
        },
    }
}

pub fn build_task<R: Rng>(
    rule: &TaskRule,
    event: &LeadEvent,
    ctx: &LeadContext,
    assignee: Option<&EmployeeCandidate>,
    now: DateTime<Utc>,
    rng: &mut R,
) -> NewTask {
    let text = task_text(rule, ctx);
    NewTask {
        task_number: task_number(now, rng),
        title: text.title,
        description: text.description,
        priority: rule.priority,
        status: "PENDING".to_string(),
        due_date: now + Duration::hours(rule.sla_hours),
        category: "AI_GENERATED".to_string(),
        assigned_to_employee_id: assignee.map(|a| a.id),
        assigned_by: "system".to_string(),
        lead_id: Some(ctx.lead_id),
        quotation_id: ctx.quotation.as_ref().map(|q| q.id),
        client_name: Some(ctx.client_name.clone()),
        business_impact: text.impact,
        ai_reasoning: format!("{} [rule: {}]", text.reasoning, rule.id),
        estimated_value: text.estimated_value,
        estimated_hours: rule.estimated_hours,
        automation_source: Some(rule.automation_source()),
        metadata: json!({
            "rule_id": rule.id,
            "rule_name": rule.name,
            "event": event.name(),
            "task_type": text.task_type,
            "sla_hours": rule.sla_hours,
            "lead_status": ctx.status.as_str(),
            "assigned_to_name": assignee.map(|a| a.full_name()),
            "department_assigned": assignee.and_then(|a| a.department_name.clone()),
            "designation_assigned": assignee.and_then(|a| a.designation_name.clone()),
            "ai_generated": true,
            "generated_at": now.to_rfc3339(),
        }),
    }
}

/// Short human-readable notes returned with a generation run.
pub fn insights(event: &LeadEvent, ctx: &LeadContext, generated: usize) -> Vec<String> {
    let mut out = Vec::new();
    if generated > 0 {
        out.push(format!("Generated {} tasks for {}", generated, ctx.client_name));
    }
    if let Some(v) = ctx.estimated_value.filter(|v| *v >= HIGH_VALUE_THRESHOLD) {
        out.push(format!("High-value lead (₹{}) escalated to management", format_amount(v)));
    }
    match event {
        LeadEvent::LeadAssigned => {
            out.push("Lead assignment: 24-hour SLA for initial contact".to_string())
        }
        LeadEvent::QuotationSent => {
            out.push("Quotation sent: follow-up due within 24 hours".to_string())
        }
        LeadEvent::QuotationApproved => {
            out.push("Quotation approved: payment follow-up due within 72 hours".to_string())
        }
        _ => {}
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ctx(status: LeadStatus, value: Option<f64>) -> LeadContext {
        LeadContext {
            lead_id: 11,
            lead_number: "L2024-0011".into(),
            client_name: "Meera".into(),
            status,
            estimated_value: value,
            assigned_to: Some(5),
            quotation: None,
        }
    }

    fn candidate(id: i64, dept: &str, designation: &str, open: i64) -> EmployeeCandidate {
        EmployeeCandidate {
            id,
            first_name: format!("E{}", id),
            last_name: String::new(),
            job_title: None,
            department_name: Some(dept.into()),
            designation_name: Some(designation.into()),
            open_tasks: open,
        }
    }

    fn ids(rules: Vec<&TaskRule>) -> Vec<&'static str> {
        rules.into_iter().map(|r| r.id).collect()
    }

    // -------------------------------------------------------------------------
    // Rule matching
    // -------------------------------------------------------------------------

    #[test]
    fn test_assignment_rules() {
        let c = ctx(LeadStatus::Assigned, Some(50000.0));
        assert_eq!(
            ids(matching_rules(&LeadEvent::LeadAssigned, &c)),
            vec!["lead_assignment_initial_contact"]
        );

        let event = LeadEvent::LeadStatusChanged {
            from: LeadStatus::Unassigned,
            to: LeadStatus::Assigned,
        };
        assert_eq!(
            ids(matching_rules(&event, &c)),
            vec!["lead_assignment_initial_contact"]
        );
    }

    #[test]
    fn test_high_value_escalation() {
        let c = ctx(LeadStatus::Assigned, Some(100000.0));
        assert_eq!(
            ids(matching_rules(&LeadEvent::LeadAssigned, &c)),
            vec!["lead_assignment_initial_contact", "high_value_lead_escalation"]
        );

        // Not assigned: no escalation
        let c = ctx(LeadStatus::Unassigned, Some(250000.0));
        assert!(matching_rules(&LeadEvent::LeadAssigned, &c)
            .iter()
            .all(|r| r.id != "high_value_lead_escalation"));
    }

    #[test]
    fn test_status_rules() {
        let c = ctx(LeadStatus::Contacted, None);
        let event = LeadEvent::LeadStatusChanged {
            from: LeadStatus::Assigned,
            to: LeadStatus::Contacted,
        };
        assert_eq!(ids(matching_rules(&event, &c)), vec!["lead_qualification_task"]);

        let event = LeadEvent::LeadStatusChanged {
            from: LeadStatus::Contacted,
            to: LeadStatus::Qualified,
        };
        assert_eq!(ids(matching_rules(&event, &c)), vec!["quotation_preparation_task"]);
    }

    #[test]
    fn test_quotation_rules_need_quotation() {
        let mut c = ctx(LeadStatus::Proposal, None);
        assert!(matching_rules(&LeadEvent::QuotationSent, &c).is_empty());

        c.quotation = Some(QuotationRef {
            id: 3,
            quotation_number: "QT-2024-0003".into(),
            total_amount: 85000.0,
        });
        assert_eq!(
            ids(matching_rules(&LeadEvent::QuotationSent, &c)),
            vec!["quotation_followup_task"]
        );
        assert_eq!(
            ids(matching_rules(&LeadEvent::QuotationApproved, &c)),
            vec!["payment_followup_task"]
        );
        assert!(matching_rules(&LeadEvent::QuotationCreated, &c).is_empty());
    }

    // -------------------------------------------------------------------------
    // Assignment
    // -------------------------------------------------------------------------

    #[test]
    fn test_assignee_prefers_lead_owner() {
        let rule = find_rule("lead_assignment_initial_contact").unwrap();
        let people = vec![candidate(1, "SALES", "Sales Head", 0), candidate(5, "SALES", "Sales Resource", 9)];
        assert_eq!(select_assignee(rule, &people, Some(5)).unwrap().id, 5);
        // Inactive owner is simply absent from the candidates
        assert_eq!(select_assignee(rule, &people, Some(99)).unwrap().id, 1);
    }

    #[test]
    fn test_assignee_department_and_experience() {
        let rule = find_rule("quotation_preparation_task").unwrap();
        let people = vec![
            candidate(1, "OPERATIONS", "Head of Operations", 0),
            candidate(2, "SALES", "Sales Resource", 0),
            candidate(3, "SALES", "Sales Head", 4),
        ];
        assert_eq!(select_assignee(rule, &people, None).unwrap().id, 3);
    }

    #[test]
    fn test_assignee_workload_balancing() {
        let rule = find_rule("payment_followup_task").unwrap();
        let people = vec![
            candidate(1, "ACCOUNTS", "Accounts Manager", 6),
            candidate(2, "ACCOUNTS", "Accounts Manager", 2),
            candidate(3, "SALES", "Sales Head", 0),
        ];
        assert_eq!(select_assignee(rule, &people, None).unwrap().id, 2);
    }

    #[test]
    fn test_assignee_falls_back_to_everyone() {
        let rule = find_rule("payment_followup_task").unwrap();
        let people = vec![candidate(7, "OPERATIONS", "Editor", 1)];
        assert_eq!(select_assignee(rule, &people, None).unwrap().id, 7);
        assert!(select_assignee(rule, &[], None).is_none());
    }

    // -------------------------------------------------------------------------
    // Task construction
    // -------------------------------------------------------------------------

    #[test]
    fn test_task_number_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let now = Utc::now();
        let number = task_number(now, &mut rng);
        let parts: Vec<_> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "AI");
        assert_eq!(parts[1], now.timestamp_millis().to_string());
        assert_eq!(parts[2].len(), 5);
        assert!(parts[2].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_build_task_fields() {
        let mut rng = StdRng::seed_from_u64(1);
        let now = Utc::now();
        let rule = find_rule("lead_assignment_initial_contact").unwrap();
        let c = ctx(LeadStatus::Assigned, None);
        let who = candidate(5, "SALES", "Sales Resource", 0);
        let task = build_task(rule, &LeadEvent::LeadAssigned, &c, Some(&who), now, &mut rng);

        assert_eq!(task.priority.as_db(), "MEDIUM");
        assert_eq!(task.status, "PENDING");
        assert_eq!(task.category, "AI_GENERATED");
        assert_eq!(task.due_date, now + Duration::hours(24));
        assert_eq!(task.estimated_value, DEFAULT_ESTIMATED_VALUE);
        assert_eq!(
            task.automation_source.as_deref(),
            Some("ai_rule_lead_assignment_initial_contact")
        );
        assert_eq!(task.assigned_to_employee_id, Some(5));
        assert_eq!(task.metadata["rule_id"], "lead_assignment_initial_contact");
        assert_eq!(task.metadata["event"], "lead_assigned");
        assert_eq!(task.title, "Initial contact with Meera");
    }

    #[test]
    fn test_escalation_task_is_urgent_with_value() {
        let mut rng = StdRng::seed_from_u64(1);
        let now = Utc::now();
        let rule = find_rule("high_value_lead_escalation").unwrap();
        let c = ctx(LeadStatus::Assigned, Some(150000.0));
        let task = build_task(rule, &LeadEvent::LeadAssigned, &c, None, now, &mut rng);
        assert_eq!(task.priority, TaskPriority::Urgent);
        assert_eq!(task.due_date, now + Duration::hours(12));
        assert_eq!(task.estimated_value, 150000.0);
        assert!(task.title.contains("150,000"));
    }

    #[test]
    fn test_insights() {
        let c = ctx(LeadStatus::Assigned, Some(120000.0));
        let notes = insights(&LeadEvent::LeadAssigned, &c, 2);
        assert_eq!(notes.len(), 3);
        assert!(notes[0].starts_with("Generated 2 tasks"));
    }

    #[test]
    fn test_event_wire_format() {
        let event: LeadEvent = serde_json::from_str(
            r#"{"type":"lead_status_changed","from":"ASSIGNED","to":"CONTACTED"}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            LeadEvent::LeadStatusChanged {
                from: LeadStatus::Assigned,
                to: LeadStatus::Contacted
            }
        );
        assert_eq!(LeadEvent::from_name("quotation_sent"), Some(LeadEvent::QuotationSent));
        assert_eq!(LeadEvent::from_name("lead_status_changed"), None);
    }
}
