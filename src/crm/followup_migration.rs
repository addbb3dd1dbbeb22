//! Conversion of open follow-ups into tracked tasks.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::json;

use super::format_amount;
use super::task_rules::task_number;
use crate::models::{FollowUp, NewTask, TaskPriority};

pub const HIGH_VALUE_CLIENT: f64 = 50000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigratedTaskType {
    ProposalFollowup,
    PaymentFollowup,
    ScheduledFollowup,
    UrgentFollowup,
    EmailFollowup,
    PhoneFollowup,
    MeetingFollowup,
    GeneralFollowup,
}

impl MigratedTaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProposalFollowup => "proposal_followup",
            Self::PaymentFollowup => "payment_followup",
            Self::ScheduledFollowup => "scheduled_followup",
            Self::UrgentFollowup => "urgent_followup",
            Self::EmailFollowup => "email_followup",
            Self::PhoneFollowup => "phone_followup",
            Self::MeetingFollowup => "meeting_followup",
            Self::GeneralFollowup => "general_followup",
        }
    }
}

pub fn classify(followup: &FollowUp) -> MigratedTaskType {
    let method = followup.followup_type.to_lowercase();
    let status = followup.status.to_lowercase();
    let notes = followup.notes.as_deref().unwrap_or_default().to_lowercase();
    let outcome = followup.outcome.as_deref().unwrap_or_default().to_lowercase();

    if outcome.contains("proposal") || notes.contains("proposal") || notes.contains("quote") {
        MigratedTaskType::ProposalFollowup
    } else if outcome.contains("payment") || notes.contains("payment") || notes.contains("invoice") {
        MigratedTaskType::PaymentFollowup
    } else if status == "scheduled" || status == "pending" {
        MigratedTaskType::ScheduledFollowup
    } else if status == "overdue" || status == "missed" {
        MigratedTaskType::UrgentFollowup
    } else if method.contains("email") {
        MigratedTaskType::EmailFollowup
    } else if method.contains("phone") || method.contains("call") {
        MigratedTaskType::PhoneFollowup
    } else if method.contains("meeting") || method.contains("in_person") {
        MigratedTaskType::MeetingFollowup
    } else {
        MigratedTaskType::GeneralFollowup
    }
}

pub fn map_priority(priority: &str) -> TaskPriority {
    TaskPriority::parse(priority).unwrap_or(TaskPriority::Medium)
}

fn is_overdue(followup: &FollowUp, now: DateTime<Utc>) -> bool {
    followup.status == "missed" || (followup.status == "scheduled" && followup.scheduled_at < now)
}

pub fn due_date(followup: &FollowUp, now: DateTime<Utc>) -> DateTime<Utc> {
    if let Some(next) = followup.next_follow_up_date {
        return next;
    }
    if is_overdue(followup, now) {
        return now;
    }
    if followup.status == "scheduled" && followup.scheduled_at > now {
        return followup.scheduled_at;
    }
    let days = match followup.priority.to_lowercase().as_str() {
        "urgent" => 0,
        "high" => 1,
        "medium" => 3,
        "low" => 7,
        _ => 2,
    };
    now + Duration::days(days)
}

fn client_name(followup: &FollowUp) -> String {
    followup
        .client_name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| "Unknown Client".to_string())
}

fn estimated_value(followup: &FollowUp) -> f64 {
    followup.estimated_value.filter(|v| *v > 0.0).unwrap_or(0.0)
}

/// Title and description for a migrated task.
pub fn task_content(followup: &FollowUp, kind: MigratedTaskType) -> (String, String) {
    let client = client_name(followup);
    let notes = followup.notes.as_deref().filter(|n| !n.is_empty());
    let outcome = followup.outcome.as_deref().filter(|o| !o.is_empty());
    let with = |label: &str, fallback: &str| match notes {
        Some(n) => format!("{}: {}", label, n),
        None => fallback.to_string(),
    };

    let (title, mut description) = match kind {
        MigratedTaskType::ProposalFollowup => (
            format!("Follow up on proposal with {}", client),
            format!(
                "Follow up with {} regarding the proposal submission. Check their decision timeline and address any concerns. {}",
                client,
                with("Previous notes", "")
            ),
        ),
        MigratedTaskType::PaymentFollowup => (
            format!("Payment follow-up for {}", client),
            format!(
                "Contact {} regarding payment status for approved quotation. Send payment reminders and confirm payment timeline. {}",
                client,
                with("Context", "")
            ),
        ),
        MigratedTaskType::UrgentFollowup => (
            format!("URGENT: Follow up with {}", client),
            format!(
                "Immediate attention required for {}. This followup was missed/overdue and needs urgent action. {}",
                client,
                outcome.map(|o| format!("Previous outcome: {}", o)).unwrap_or_default()
            ),
        ),
        MigratedTaskType::EmailFollowup => (
            format!("Email follow-up with {}", client),
            format!(
                "Send follow-up email to {}. {}",
                client,
                with("Content focus", "Check on their interest and next steps.")
            ),
        ),
        MigratedTaskType::PhoneFollowup => (
            format!("Phone call follow-up with {}", client),
            format!(
                "Schedule and conduct phone call with {}. {}",
                client,
                with("Discussion points", "Discuss project status and address any questions.")
            ),
        ),
        MigratedTaskType::MeetingFollowup => (
            format!("Meeting follow-up with {}", client),
            format!(
                "Schedule and conduct meeting with {}. {}",
                client,
                with("Meeting agenda", "Discuss project details and finalize next steps.")
            ),
        ),
        MigratedTaskType::ScheduledFollowup | MigratedTaskType::GeneralFollowup => (
            format!("Follow up with {}", client),
            format!(
                "General follow-up task for {} via {}. {}",
                client,
                followup.followup_type,
                with("Notes", "Maintain client relationship and check project status.")
            ),
        ),
    };

    let description_trimmed = description.trim_end().len();
    description.truncate(description_trimmed);

    let value = estimated_value(followup);
    if value > 0.0 {
        description.push_str(&format!(" | Estimated client value: ₹{}", format_amount(value)));
    }
    (title, description)
}

pub fn business_impact(followup: &FollowUp) -> String {
    let value = estimated_value(followup);
    let mut impact = String::new();
    if value > 0.0 {
        impact.push_str(&format!("Revenue Impact: ₹{} • ", format_amount(value)));
    }
    impact.push_str("Client Relationship Maintenance");
    if followup.status == "missed" || followup.priority == "urgent" {
        impact.push_str(" • CRITICAL: Urgent attention required");
    }
    if value > HIGH_VALUE_CLIENT {
        impact.push_str(" • High-value client retention risk");
    }
    if followup.follow_up_required {
        impact.push_str(" • Pipeline progression required");
    }
    impact
}

pub fn reasoning(followup: &FollowUp, now: DateTime<Utc>) -> String {
    let age_days = (now - followup.created_at).num_days();
    let mut out = String::from("Migrated from followup system. ");
    if is_overdue(followup, now) {
        out.push_str("URGENT: This followup was overdue and requires immediate attention to prevent client relationship damage. ");
    }
    if let Some(outcome) = followup.outcome.as_deref().filter(|o| !o.is_empty()) {
        out.push_str(&format!("Previous outcome: \"{}\". ", outcome));
    }
    if followup.follow_up_required {
        out.push_str("Follow-up flagged as required for pipeline progression. ");
    }
    if age_days > 7 {
        out.push_str(&format!(
            "Long-pending followup ({} days old) - needs strategic approach. ",
            age_days
        ));
    }
    out.push_str("Intelligent task system will ensure proper tracking and escalation.");
    out
}

/// Builds the task that replaces one follow-up.
pub fn build_task<R: Rng>(followup: &FollowUp, now: DateTime<Utc>, rng: &mut R) -> NewTask {
    let kind = classify(followup);
    let (title, description) = task_content(followup, kind);
    NewTask {
        task_number: task_number(now, rng),
        title,
        description,
        priority: map_priority(&followup.priority),
        status: "PENDING".to_string(),
        due_date: due_date(followup, now),
        category: "FOLLOWUP_MIGRATION".to_string(),
        assigned_to_employee_id: followup.created_by.or(followup.lead_assigned_to),
        assigned_by: "followup_migration".to_string(),
        lead_id: Some(followup.lead_id),
        quotation_id: None,
        client_name: Some(client_name(followup)),
        business_impact: business_impact(followup),
        ai_reasoning: reasoning(followup, now),
        estimated_value: estimated_value(followup),
        estimated_hours: 1.0,
        automation_source: Some(format!("followup_migration_{}", followup.id)),
        metadata: json!({
            "migrated_from_followup_id": followup.id,
            "task_type": kind.as_str(),
            "original_status": followup.status,
            "original_method": followup.followup_type,
            "original_scheduled_at": followup.scheduled_at.to_rfc3339(),
            "lead_number": followup.lead_number,
        }),
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub dry_run: bool,
    pub analyzed: usize,
    pub migrated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<String, usize>,
    pub by_method: BTreeMap<String, usize>,
    pub revenue_impact: f64,
    pub errors: Vec<String>,
}

impl MigrationReport {
    pub fn record(&mut self, followup: &FollowUp, task: &NewTask) {
        self.migrated += 1;
        *self.by_status.entry(followup.status.clone()).or_default() += 1;
        *self
            .by_priority
            .entry(task.priority.as_str().to_string())
            .or_default() += 1;
        *self
            .by_method
            .entry(followup.followup_type.clone())
            .or_default() += 1;
        self.revenue_impact += task.estimated_value;
    }

    pub fn record_failure(&mut self, followup_id: i64, err: impl std::fmt::Display) {
        self.failed += 1;
        self.errors
            .push(format!("Failed to migrate followup {}: {}", followup_id, err));
    }

    /// Plain-text summary for the CLI and API.
    pub fn render(&self) -> String {
        let mut lines = vec![
            if self.dry_run {
                "FOLLOWUP TO TASK MIGRATION (DRY RUN)".to_string()
            } else {
                "FOLLOWUP TO TASK MIGRATION COMPLETE".to_string()
            },
            format!(
                "Results: {} tasks created, {} skipped, {} failed",
                self.migrated, self.skipped, self.failed
            ),
            format!("Total Revenue Impact: ₹{}", format_amount(self.revenue_impact)),
            String::new(),
            "Breakdown by Status:".to_string(),
        ];
        lines.extend(self.by_status.iter().map(|(k, v)| format!("  - {}: {} followups", k, v)));
        lines.push(String::new());
        lines.push("Breakdown by Priority:".to_string());
        lines.extend(self.by_priority.iter().map(|(k, v)| format!("  - {}: {} tasks", k, v)));
        lines.push(String::new());
        lines.push("Breakdown by Contact Method:".to_string());
        lines.extend(self.by_method.iter().map(|(k, v)| format!("  - {}: {} followups", k, v)));
        lines.extend(self.errors.iter().cloned());
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn followup(status: &str, method: &str) -> FollowUp {
        let now = Utc::now();
        FollowUp {
            id: 11,
            lead_id: 3,
            lead_number: Some("L2024-0003".into()),
            client_name: Some("Meera Weds Arjun".into()),
            lead_assigned_to: Some(5),
            estimated_value: Some(80000.0),
            scheduled_at: now + Duration::days(2),
            followup_type: method.into(),
            status: status.into(),
            priority: "medium".into(),
            notes: None,
            outcome: None,
            interaction_summary: None,
            completed_at: None,
            duration_minutes: None,
            follow_up_required: false,
            next_follow_up_date: None,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    // -------------------------------------------------------------------------
    // Classification
    // -------------------------------------------------------------------------

    #[test]
    fn test_classification_order() {
        let mut f = followup("scheduled", "email");
        f.notes = Some("Send the revised quote".into());
        assert_eq!(classify(&f), MigratedTaskType::ProposalFollowup);

        f.notes = Some("Invoice pending".into());
        assert_eq!(classify(&f), MigratedTaskType::PaymentFollowup);

        f.notes = None;
        assert_eq!(classify(&f), MigratedTaskType::ScheduledFollowup);

        assert_eq!(classify(&followup("missed", "email")), MigratedTaskType::UrgentFollowup);
        assert_eq!(classify(&followup("cancelled", "email")), MigratedTaskType::EmailFollowup);
        assert_eq!(classify(&followup("cancelled", "phone")), MigratedTaskType::PhoneFollowup);
        assert_eq!(classify(&followup("cancelled", "video_call")), MigratedTaskType::PhoneFollowup);
        assert_eq!(classify(&followup("cancelled", "in_person")), MigratedTaskType::MeetingFollowup);
        assert_eq!(classify(&followup("cancelled", "other")), MigratedTaskType::GeneralFollowup);
    }

    #[test]
    fn test_priority_mapping() {
        assert_eq!(map_priority("HIGH"), TaskPriority::High);
        assert_eq!(map_priority("urgent"), TaskPriority::Urgent);
        assert_eq!(map_priority("whenever"), TaskPriority::Medium);
    }

    // -------------------------------------------------------------------------
    // Due dates
    // -------------------------------------------------------------------------

    #[test]
    fn test_due_date_rules() {
        let now = Utc::now();

        let mut f = followup("scheduled", "email");
        let next = now + Duration::days(9);
        f.next_follow_up_date = Some(next);
        assert_eq!(due_date(&f, now), next);

        let f = followup("missed", "email");
        assert_eq!(due_date(&f, now), now);

        let mut f = followup("scheduled", "email");
        f.scheduled_at = now - Duration::hours(1);
        assert_eq!(due_date(&f, now), now);

        let f = followup("scheduled", "email");
        assert_eq!(due_date(&f, now), f.scheduled_at);

        let mut f = followup("cancelled", "email");
        f.priority = "low".into();
        assert_eq!(due_date(&f, now), now + Duration::days(7));
        f.priority = "high".into();
        assert_eq!(due_date(&f, now), now + Duration::days(1));
        f.priority = "odd".into();
        assert_eq!(due_date(&f, now), now + Duration::days(2));
    }

    // -------------------------------------------------------------------------
    // Text
    // -------------------------------------------------------------------------

    #[test]
    fn test_content_and_impact() {
        let mut f = followup("missed", "phone");
        f.follow_up_required = true;
        let (title, description) = task_content(&f, classify(&f));
        assert_eq!(title, "URGENT: Follow up with Meera Weds Arjun");
        assert!(description.ends_with(" | Estimated client value: ₹80,000"));

        assert_eq!(
            business_impact(&f),
            "Revenue Impact: ₹80,000 • Client Relationship Maintenance • CRITICAL: Urgent attention required • High-value client retention risk • Pipeline progression required"
        );

        let mut f = followup("cancelled", "email");
        f.estimated_value = None;
        assert_eq!(business_impact(&f), "Client Relationship Maintenance");
        let (_, description) = task_content(&f, classify(&f));
        assert_eq!(
            description,
            "Send follow-up email to Meera Weds Arjun. Check on their interest and next steps."
        );
    }

    #[test]
    fn test_reasoning_clauses() {
        let now = Utc::now();
        let mut f = followup("missed", "phone");
        f.outcome = Some("No answer".into());
        f.created_at = now - Duration::days(10);
        let text = reasoning(&f, now);
        assert!(text.starts_with("Migrated from followup system. URGENT:"));
        assert!(text.contains("Previous outcome: \"No answer\". "));
        assert!(text.contains("(10 days old)"));
        assert!(text.ends_with("Intelligent task system will ensure proper tracking and escalation."));
    }

    // -------------------------------------------------------------------------
    // Task and report
    // -------------------------------------------------------------------------

    #[test]
    fn test_build_task_assignment_and_metadata() {
        let mut rng = StdRng::seed_from_u64(1);
        let now = Utc::now();

        let f = followup("scheduled", "email");
        let task = build_task(&f, now, &mut rng);
        assert_eq!(task.assigned_to_employee_id, Some(5));
        assert_eq!(task.metadata["migrated_from_followup_id"], 11);
        assert_eq!(task.metadata["task_type"], "scheduled_followup");
        assert_eq!(task.automation_source.as_deref(), Some("followup_migration_11"));

        let mut f = followup("scheduled", "email");
        f.created_by = Some(8);
        assert_eq!(build_task(&f, now, &mut rng).assigned_to_employee_id, Some(8));
    }

    #[test]
    fn test_report_accumulates() {
        let mut rng = StdRng::seed_from_u64(2);
        let now = Utc::now();
        let mut report = MigrationReport::default();

        for f in [followup("scheduled", "email"), followup("missed", "phone")] {
            let task = build_task(&f, now, &mut rng);
            report.record(&f, &task);
        }
        report.record_failure(99, "boom");

        assert_eq!(report.migrated, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.by_method["phone"], 1);
        assert_eq!(report.revenue_impact, 160000.0);
        let text = report.render();
        assert!(text.contains("Total Revenue Impact: ₹160,000"));
        assert!(text.contains("Failed to migrate followup 99: boom"));
    }
}
