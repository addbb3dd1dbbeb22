//! Lead follow-ups and their one-way migration into `ai_tasks`.

use std::collections::HashSet;

use chrono::Utc;

use super::PgStorage;
use crate::crm::followup_migration::{self, MigrationReport};
use crate::error::{CrmError, Result};
use crate::models::{
    FollowUp, FollowUpCompletion, FollowUpInput, FollowUpQuery, FollowUpStats, FOLLOWUP_PRIORITIES,
    FOLLOWUP_STATUSES, FOLLOWUP_TYPES,
};

const FOLLOWUP_SELECT: &str = r#"
    SELECT f.id, f.lead_id, l.lead_number, l.client_name, l.assigned_to AS lead_assigned_to,
           l.estimated_value, f.scheduled_at, f.followup_type, f.status, f.priority, f.notes,
           f.outcome, f.interaction_summary, f.completed_at, f.duration_minutes,
           f.follow_up_required, f.next_follow_up_date, f.created_by, f.created_at, f.updated_at
    FROM lead_followups f
    LEFT JOIN leads l ON l.id = f.lead_id
"#;

pub const DEFAULT_UPCOMING_DAYS: i64 = 7;

pub(crate) fn validate_followup(input: &FollowUpInput) -> Result<()> {
    if !FOLLOWUP_TYPES.contains(&input.followup_type.as_str()) {
        return Err(CrmError::validation(format!(
            "Invalid follow-up type. Must be one of: {}",
            FOLLOWUP_TYPES.join(", ")
        )));
    }
    if !FOLLOWUP_PRIORITIES.contains(&input.priority.as_str()) {
        return Err(CrmError::validation(format!(
            "Invalid priority. Must be one of: {}",
            FOLLOWUP_PRIORITIES.join(", ")
        )));
    }
    Ok(())
}

fn validate_status(status: &str) -> Result<()> {
    if !FOLLOWUP_STATUSES.contains(&status) {
        return Err(CrmError::validation(format!(
            "Invalid status. Must be one of: {}",
            FOLLOWUP_STATUSES.join(", ")
        )));
    }
    Ok(())
}

impl PgStorage {
    pub async fn get_followup(&self, id: i64) -> Result<FollowUp> {
        let sql = format!("{} WHERE f.id = $1", FOLLOWUP_SELECT);
        self.timed(sqlx::query_as::<_, FollowUp>(&sql).bind(id).fetch_optional(&self.pool))
            .await?
            .ok_or_else(|| CrmError::not_found("Follow-up not found"))
    }

    pub async fn create_followup(&self, input: &FollowUpInput, created_by: Option<i64>) -> Result<FollowUp> {
        validate_followup(input)?;

        let lead_exists: bool = self
            .timed(
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM leads WHERE id = $1)")
                    .bind(input.lead_id)
                    .fetch_one(&self.pool),
            )
            .await?;
        if !lead_exists {
            return Err(CrmError::validation("Invalid lead ID"));
        }

        let id: i64 = self
            .timed(
                sqlx::query_scalar(
                    r#"
                    INSERT INTO lead_followups
                        (lead_id, scheduled_at, followup_type, priority, notes, interaction_summary,
                         follow_up_required, next_follow_up_date, created_by)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    RETURNING id
                    "#,
                )
                .bind(input.lead_id)
                .bind(input.scheduled_at)
                .bind(&input.followup_type)
                .bind(&input.priority)
                .bind(&input.notes)
                .bind(&input.interaction_summary)
                .bind(input.follow_up_required)
                .bind(input.next_follow_up_date)
                .bind(created_by)
                .fetch_one(&self.pool),
            )
            .await?;

        tracing::info!(followup_id = id, lead_id = input.lead_id, kind = %input.followup_type, "Follow-up scheduled");
        self.get_followup(id).await
    }

    pub async fn list_followups(&self, query: &FollowUpQuery) -> Result<Vec<FollowUp>> {
        let sql = format!(
            r#"{}
            WHERE ($1::BIGINT IS NULL OR f.lead_id = $1)
              AND ($2::TEXT IS NULL OR f.status = $2)
              AND ($3::BIGINT IS NULL OR f.created_by = $3 OR l.assigned_to = $3)
            ORDER BY f.scheduled_at DESC
            LIMIT $4
            "#,
            FOLLOWUP_SELECT
        );
        let rows = self
            .timed(
                sqlx::query_as::<_, FollowUp>(&sql)
                    .bind(query.lead_id)
                    .bind(&query.status)
                    .bind(query.assigned_to)
                    .bind(query.limit.unwrap_or(100).clamp(1, 500))
                    .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows)
    }

    pub async fn delete_followup(&self, id: i64) -> Result<()> {
        let deleted = self
            .timed(sqlx::query("DELETE FROM lead_followups WHERE id = $1").bind(id).execute(&self.pool))
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(CrmError::not_found("Follow-up not found"));
        }
        Ok(())
    }

    /// Completing a follow-up records its outcome; other statuses only change the status.
    pub async fn update_followup_status(
        &self,
        id: i64,
        status: &str,
        completion: &FollowUpCompletion,
    ) -> Result<FollowUp> {
        validate_status(status)?;

        let updated = if status == "completed" {
            self.timed(
                sqlx::query(
                    r#"
                    UPDATE lead_followups
                    SET status = 'completed', completed_at = now(), outcome = $2,
                        duration_minutes = $3, follow_up_required = $4,
                        next_follow_up_date = $5, updated_at = now()
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(&completion.outcome)
                .bind(completion.duration_minutes)
                .bind(completion.follow_up_required)
                .bind(completion.next_follow_up_date)
                .execute(&self.pool),
            )
            .await?
        } else {
            self.timed(
                sqlx::query("UPDATE lead_followups SET status = $2, updated_at = now() WHERE id = $1")
                    .bind(id)
                    .bind(status)
                    .execute(&self.pool),
            )
            .await?
        };
        if updated.rows_affected() == 0 {
            return Err(CrmError::not_found("Follow-up not found"));
        }
        tracing::info!(followup_id = id, status, "Follow-up status updated");
        self.get_followup(id).await
    }

    /// Scheduled follow-ups due between now and `days` from now, soonest first.
    pub async fn upcoming_followups(&self, days: Option<i64>, assigned_to: Option<i64>) -> Result<Vec<FollowUp>> {
        let days = days.unwrap_or(DEFAULT_UPCOMING_DAYS).clamp(1, 365) as i32;
        let sql = format!(
            r#"{}
            WHERE f.status = 'scheduled'
              AND f.scheduled_at >= now()
              AND f.scheduled_at <= now() + make_interval(days => $1)
              AND ($2::BIGINT IS NULL OR f.created_by = $2 OR l.assigned_to = $2)
            ORDER BY f.scheduled_at ASC
            "#,
            FOLLOWUP_SELECT
        );
        let rows = self
            .timed(
                sqlx::query_as::<_, FollowUp>(&sql)
                    .bind(days)
                    .bind(assigned_to)
                    .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows)
    }

    pub async fn followup_stats(&self) -> Result<FollowUpStats> {
        let by_status: Vec<(String, i64)> = self
            .timed(
                sqlx::query_as("SELECT status, COUNT(*) FROM lead_followups GROUP BY status")
                    .fetch_all(&self.pool),
            )
            .await?;
        let by_type: Vec<(String, i64)> = self
            .timed(
                sqlx::query_as("SELECT followup_type, COUNT(*) FROM lead_followups GROUP BY followup_type")
                    .fetch_all(&self.pool),
            )
            .await?;
        let overdue: i64 = self
            .timed(
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM lead_followups WHERE status = 'scheduled' AND scheduled_at < now()",
                )
                .fetch_one(&self.pool),
            )
            .await?;

        Ok(FollowUpStats {
            total: by_status.iter().map(|(_, n)| n).sum(),
            overdue,
            by_status: by_status.into_iter().collect(),
            by_type: by_type.into_iter().collect(),
        })
    }

    /// Convert every open follow-up into a task. Already-migrated rows are skipped;
    /// `dry_run` builds the report without writing.
    pub async fn migrate_followups(&self, dry_run: bool) -> Result<MigrationReport> {
        let sql = format!("{} WHERE f.status <> 'completed' ORDER BY f.id", FOLLOWUP_SELECT);
        let followups = self
            .timed(sqlx::query_as::<_, FollowUp>(&sql).fetch_all(&self.pool))
            .await?;

        let migrated: HashSet<i64> = self
            .timed(
                sqlx::query_scalar::<_, i64>(
                    r#"
                    SELECT (metadata->>'migrated_from_followup_id')::BIGINT FROM ai_tasks
                    WHERE metadata ? 'migrated_from_followup_id'
                    "#,
                )
                .fetch_all(&self.pool),
            )
            .await?
            .into_iter()
            .collect();

        let mut report = MigrationReport {
            dry_run,
            analyzed: followups.len(),
            ..Default::default()
        };
        tracing::info!(followups = followups.len(), dry_run, "Starting follow-up migration");

        for followup in &followups {
            if migrated.contains(&followup.id) {
                report.skipped += 1;
                continue;
            }
            let task = {
                let mut rng = rand::thread_rng();
                followup_migration::build_task(followup, Utc::now(), &mut rng)
            };
            if dry_run {
                report.record(followup, &task);
                continue;
            }
            match self.insert_task(&task).await {
                Ok(created) => {
                    tracing::debug!(followup_id = followup.id, task_id = created.id, "Follow-up migrated");
                    report.record(followup, &task);
                }
                Err(e) => {
                    tracing::warn!(followup_id = followup.id, "Follow-up migration failed: {}", e);
                    report.record_failure(followup.id, e);
                }
            }
        }

        tracing::info!(
            migrated = report.migrated,
            skipped = report.skipped,
            failed = report.failed,
            "Follow-up migration finished"
        );
        Ok(report)
    }
}
