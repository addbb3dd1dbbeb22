//! `ai_tasks` persistence and the rule-engine runner that turns lead events into tasks.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::json;

use super::PgStorage;
use crate::crm::task_rules::{self, LeadContext, LeadEvent};
use crate::error::{CrmError, Result};
use crate::models::{
    EmployeeCandidate, NewTask, Task, TaskAnalytics, TaskFilter, TaskGenerationLog,
    TaskGenerationResult, TASK_STATUSES,
};

const TASK_SELECT: &str = r#"
    SELECT t.id, t.task_number, t.title, t.description, t.priority, t.status, t.due_date,
           t.category, t.assigned_to_employee_id,
           NULLIF(TRIM(CONCAT(e.first_name, ' ', e.last_name)), '') AS assigned_to_name,
           t.assigned_by, t.lead_id, t.quotation_id, t.client_name, t.business_impact,
           t.ai_reasoning, t.estimated_value, t.estimated_hours, t.automation_source,
           t.metadata, t.completed_at, t.created_at, t.updated_at
    FROM ai_tasks t
    LEFT JOIN employees e ON e.id = t.assigned_to_employee_id
"#;

const DEFAULT_LIST_LIMIT: i64 = 100;

impl PgStorage {
    pub async fn get_task(&self, id: i64) -> Result<Task> {
        let sql = format!("{} WHERE t.id = $1", TASK_SELECT);
        self.timed(sqlx::query_as::<_, Task>(&sql).bind(id).fetch_optional(&self.pool))
            .await?
            .ok_or_else(|| CrmError::not_found("Task not found"))
    }

    pub async fn insert_task(&self, task: &NewTask) -> Result<Task> {
        let id: i64 = self
            .timed(
                sqlx::query_scalar(
                    r#"
                    INSERT INTO ai_tasks
                        (task_number, title, description, priority, status, due_date, category,
                         assigned_to_employee_id, assigned_by, lead_id, quotation_id, client_name,
                         business_impact, ai_reasoning, estimated_value, estimated_hours,
                         automation_source, metadata)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
                    RETURNING id
                    "#,
                )
                .bind(&task.task_number)
                .bind(&task.title)
                .bind(&task.description)
                .bind(task.priority.as_db())
                .bind(&task.status)
                .bind(task.due_date)
                .bind(&task.category)
                .bind(task.assigned_to_employee_id)
                .bind(&task.assigned_by)
                .bind(task.lead_id)
                .bind(task.quotation_id)
                .bind(&task.client_name)
                .bind(&task.business_impact)
                .bind(&task.ai_reasoning)
                .bind(task.estimated_value)
                .bind(task.estimated_hours)
                .bind(&task.automation_source)
                .bind(&task.metadata)
                .fetch_one(&self.pool),
            )
            .await?;
        self.get_task(id).await
    }

    pub(crate) async fn task_exists_for_source(&self, lead_id: i64, source: &str) -> Result<bool> {
        let exists = self
            .timed(
                sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM ai_tasks WHERE lead_id = $1 AND automation_source = $2)",
                )
                .bind(lead_id)
                .bind(source)
                .fetch_one(&self.pool),
            )
            .await?;
        Ok(exists)
    }

    /// Active employees with their count of open tasks.
    pub async fn task_candidates(&self) -> Result<Vec<EmployeeCandidate>> {
        let rows = self
            .timed(
                sqlx::query_as::<_, EmployeeCandidate>(
                    r#"
                    SELECT e.id, e.first_name, e.last_name, e.job_title,
                           d.name AS department_name, g.name AS designation_name,
                           (SELECT COUNT(*) FROM ai_tasks t
                             WHERE t.assigned_to_employee_id = e.id
                               AND t.status IN ('PENDING', 'IN_PROGRESS')) AS open_tasks
                    FROM employees e
                    LEFT JOIN departments d ON d.id = e.department_id
                    LEFT JOIN designations g ON g.id = e.designation_id
                    WHERE e.status = 'active'
                    ORDER BY e.id
                    "#,
                )
                .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows)
    }

    /// Append to `task_generation_log`. Failures are logged and swallowed.
    pub(crate) async fn log_task_generation(&self, entry: &TaskGenerationLog) {
        let result = self
            .timed(
                sqlx::query(
                    r#"
                    INSERT INTO task_generation_log
                        (lead_id, quotation_id, rule_triggered, task_id, success, error_message, metadata)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    "#,
                )
                .bind(entry.lead_id)
                .bind(entry.quotation_id)
                .bind(&entry.rule_triggered)
                .bind(entry.task_id)
                .bind(entry.success)
                .bind(&entry.error_message)
                .bind(&entry.metadata)
                .execute(&self.pool),
            )
            .await;
        if let Err(e) = result {
            tracing::warn!(rule = %entry.rule_triggered, "Failed to write task generation log: {}", e);
        }
    }

    /// Evaluate every rule for `event`, inserting one task per rule that fires
    /// and has not already produced a task for this lead.
    pub async fn run_task_rules(
        &self,
        event: LeadEvent,
        ctx: &LeadContext,
    ) -> Result<TaskGenerationResult> {
        let mut result = TaskGenerationResult {
            event: event.name().to_string(),
            lead_id: ctx.lead_id,
            ..Default::default()
        };

        let rules = task_rules::matching_rules(&event, ctx);
        if rules.is_empty() {
            result.insights = task_rules::insights(&event, ctx, 0);
            return Ok(result);
        }
        let candidates = self.task_candidates().await?;
        let quotation_id = ctx.quotation.as_ref().map(|q| q.id);

        for rule in rules {
            let source = rule.automation_source();
            if self.task_exists_for_source(ctx.lead_id, &source).await? {
                tracing::debug!(lead_id = ctx.lead_id, rule = rule.id, "Task already exists, skipping rule");
                result.skipped_rules.push(rule.id.to_string());
                self.log_task_generation(&TaskGenerationLog {
                    lead_id: Some(ctx.lead_id),
                    quotation_id,
                    rule_triggered: rule.id.to_string(),
                    task_id: None,
                    success: true,
                    error_message: None,
                    metadata: json!({ "event": event.name(), "skipped": "duplicate" }),
                })
                .await;
                continue;
            }

            let new_task = {
                let assignee = task_rules::select_assignee(rule, &candidates, ctx.assigned_to);
                let mut rng = rand::thread_rng();
                task_rules::build_task(rule, &event, ctx, assignee, Utc::now(), &mut rng)
            };

            match self.insert_task(&new_task).await {
                Ok(task) => {
                    tracing::info!(
                        lead_id = ctx.lead_id,
                        rule = rule.id,
                        task_number = %task.task_number,
                        assignee = ?task.assigned_to_employee_id,
                        "Task generated"
                    );
                    self.log_task_generation(&TaskGenerationLog {
                        lead_id: Some(ctx.lead_id),
                        quotation_id,
                        rule_triggered: rule.id.to_string(),
                        task_id: Some(task.id),
                        success: true,
                        error_message: None,
                        metadata: json!({ "event": event.name(), "task_number": task.task_number }),
                    })
                    .await;
                    if let (Some(employee), Some(due)) = (task.assigned_to_employee_id, task.due_date) {
                        if let Err(e) = self
                            .notify_task_assigned(employee, task.id, &task.title, &task.priority, due)
                            .await
                        {
                            tracing::warn!(task_id = task.id, "Failed to notify assignee: {}", e);
                        }
                    }
                    result.tasks.push(task);
                }
                Err(e) => {
                    tracing::error!(lead_id = ctx.lead_id, rule = rule.id, "Task generation failed: {}", e);
                    self.log_task_generation(&TaskGenerationLog {
                        lead_id: Some(ctx.lead_id),
                        quotation_id,
                        rule_triggered: rule.id.to_string(),
                        task_id: None,
                        success: false,
                        error_message: Some(e.to_string()),
                        metadata: json!({ "event": event.name() }),
                    })
                    .await;
                }
            }
        }

        result.insights = task_rules::insights(&event, ctx, result.tasks.len());
        Ok(result)
    }

    /// Fire a lead event from another workflow. Task generation never fails the caller.
    pub async fn trigger_lead_event(
        &self,
        lead_id: i64,
        quotation_id: Option<i64>,
        event: LeadEvent,
    ) -> Option<TaskGenerationResult> {
        let outcome = async {
            let ctx = self.lead_context(lead_id, quotation_id).await?;
            self.run_task_rules(event, &ctx).await
        }
        .await;
        match outcome {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::warn!(lead_id, event = event.name(), "Task rules not applied: {}", e);
                None
            }
        }
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let sql = format!(
            r#"{}
            WHERE ($1::BIGINT IS NULL OR t.assigned_to_employee_id = $1)
              AND ($2::TEXT IS NULL OR t.status = $2)
              AND ($3::BIGINT IS NULL OR t.lead_id = $3)
            ORDER BY t.due_date ASC NULLS LAST, t.id DESC
            LIMIT $4
            "#,
            TASK_SELECT
        );
        let status = filter.status.as_ref().map(|s| s.trim().to_ascii_uppercase());
        let rows = self
            .timed(
                sqlx::query_as::<_, Task>(&sql)
                    .bind(filter.assigned_to)
                    .bind(status)
                    .bind(filter.lead_id)
                    .bind(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 500))
                    .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows)
    }

    pub async fn update_task_status(&self, id: i64, status: &str) -> Result<Task> {
        let status = status.trim().to_ascii_uppercase();
        if !TASK_STATUSES.contains(&status.as_str()) {
            return Err(CrmError::validation(format!(
                "Invalid task status. Must be one of: {}",
                TASK_STATUSES.join(", ")
            )));
        }
        let updated = self
            .timed(
                sqlx::query(
                    r#"
                    UPDATE ai_tasks
                    SET status = $2,
                        completed_at = CASE WHEN $2 = 'COMPLETED' THEN COALESCE(completed_at, now()) ELSE NULL END,
                        updated_at = now()
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(&status)
                .execute(&self.pool),
            )
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(CrmError::not_found("Task not found"));
        }
        tracing::info!(task_id = id, status = %status, "Task status updated");
        self.get_task(id).await
    }

    pub async fn task_analytics(&self, assigned_to: Option<i64>) -> Result<TaskAnalytics> {
        let grouped = |column: &str| {
            format!(
                "SELECT {col} AS key, COUNT(*) AS n FROM ai_tasks \
                 WHERE ($1::BIGINT IS NULL OR assigned_to_employee_id = $1) \
                 AND {col} IS NOT NULL GROUP BY {col}",
                col = column
            )
        };

        let mut analytics = TaskAnalytics::default();
        for (column, target) in [
            ("status", &mut analytics.by_status),
            ("LOWER(priority)", &mut analytics.by_priority),
            ("metadata->>'rule_id'", &mut analytics.by_rule),
        ] {
            let rows: Vec<(String, i64)> = self
                .timed(
                    sqlx::query_as(&grouped(column))
                        .bind(assigned_to)
                        .fetch_all(&self.pool),
                )
                .await?;
            *target = rows.into_iter().collect::<HashMap<_, _>>();
        }
        analytics.total = analytics.by_status.values().sum();

        analytics.overdue = self
            .timed(
                sqlx::query_scalar(
                    r#"
                    SELECT COUNT(*) FROM ai_tasks
                    WHERE ($1::BIGINT IS NULL OR assigned_to_employee_id = $1)
                      AND due_date < now()
                      AND status NOT IN ('COMPLETED', 'CANCELLED')
                    "#,
                )
                .bind(assigned_to)
                .fetch_one(&self.pool),
            )
            .await?;
        Ok(analytics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LeadStatus, TaskPriority};
    use crate::storage::postgres::test_storage;
    use chrono::Duration;

    fn new_task(lead_id: Option<i64>, source: &str) -> NewTask {
        NewTask {
            task_number: format!("T-{}", uuid::Uuid::new_v4().simple()),
            title: "Call the client".into(),
            description: "Discuss requirements".into(),
            priority: TaskPriority::High,
            status: "PENDING".into(),
            due_date: Utc::now() + Duration::hours(24),
            category: "AI_GENERATED".into(),
            assigned_to_employee_id: None,
            assigned_by: "system".into(),
            lead_id,
            quotation_id: None,
            client_name: Some("Test".into()),
            business_impact: "Revenue".into(),
            ai_reasoning: "test".into(),
            estimated_value: 30000.0,
            estimated_hours: 1.0,
            automation_source: Some(source.into()),
            metadata: json!({ "rule_id": "test_rule" }),
        }
    }

    #[tokio::test]
    async fn test_insert_and_complete_task() {
        let Some(storage) = test_storage().await else {
            return;
        };
        let task = storage.insert_task(&new_task(None, "manual")).await.unwrap();
        assert_eq!(task.priority, "HIGH");
        assert!(task.completed_at.is_none());

        let done = storage.update_task_status(task.id, "completed").await.unwrap();
        assert_eq!(done.status, "COMPLETED");
        assert!(done.completed_at.is_some());

        let reopened = storage.update_task_status(task.id, "PENDING").await.unwrap();
        assert!(reopened.completed_at.is_none());

        let err = storage.update_task_status(task.id, "DONE").await.unwrap_err();
        assert!(matches!(err, CrmError::Validation(_)));
    }

    #[tokio::test]
    async fn test_rules_are_deduplicated_per_lead() {
        let Some(storage) = test_storage().await else {
            return;
        };
        let lead = storage
            .create_lead(
                &crate::models::LeadInput {
                    client_name: "Dedup Client".into(),
                    client_email: None,
                    client_phone: None,
                    company_id: None,
                    branch_id: None,
                    assigned_to: None,
                    lead_source_id: None,
                    estimated_value: Some(20000.0),
                    notes: None,
                },
                None,
            )
            .await
            .unwrap();
        let ctx = storage.lead_context(lead.id, None).await.unwrap();
        let event = LeadEvent::LeadStatusChanged {
            from: LeadStatus::Assigned,
            to: LeadStatus::Contacted,
        };

        let first = storage.run_task_rules(event, &ctx).await.unwrap();
        assert_eq!(first.tasks.len(), 1);
        let second = storage.run_task_rules(event, &ctx).await.unwrap();
        assert!(second.tasks.is_empty());
        assert_eq!(second.skipped_rules, vec!["lead_qualification_task".to_string()]);
    }

    #[tokio::test]
    async fn test_analytics_counts() {
        let Some(storage) = test_storage().await else {
            return;
        };
        storage.insert_task(&new_task(None, "manual")).await.unwrap();
        let analytics = storage.task_analytics(None).await.unwrap();
        assert!(analytics.total >= 1);
        assert!(analytics.by_rule.get("test_rule").copied().unwrap_or(0) >= 1);
    }
}
