//! Leads: creation, assignment, status changes with their activity trail, workload and analytics.

use chrono::{Datelike, Utc};
use serde_json::json;

use super::PgStorage;
use crate::crm::pricing;
use crate::crm::task_rules::{LeadContext, LeadEvent, QuotationRef};
use crate::error::{CrmError, Result};
use crate::models::{
    EmployeeWorkload, Lead, LeadActivity, LeadAnalytics, LeadInput, LeadListQuery, LeadSource,
    LeadStatus, TERMINAL_LEAD_STATUSES,
};

const LEAD_SELECT: &str = r#"
    SELECT l.id, l.lead_number, l.client_name, l.client_email, l.client_phone,
           l.company_id, c.name AS company_name,
           l.branch_id, b.name AS branch_name,
           l.assigned_to, NULLIF(TRIM(CONCAT(e.first_name, ' ', e.last_name)), '') AS assigned_to_name,
           l.lead_source_id, COALESCE(s.name, 'Not specified') AS lead_source_name,
           l.status, l.is_rejected, l.rejection_reason,
           l.reassigned_from_employee_id, l.reassigned_at, l.reassignment_reason,
           l.estimated_value, l.notes, l.created_at, l.updated_at
    FROM leads l
    LEFT JOIN companies c ON c.id = l.company_id
    LEFT JOIN branches b ON b.id = l.branch_id
    LEFT JOIN employees e ON e.id = l.assigned_to
    LEFT JOIN lead_sources s ON s.id = l.lead_source_id
"#;

const DEFAULT_REASSIGNMENT_REASON: &str = "Manual reassignment";
const WORKLOAD_WINDOW_DAYS: i32 = 30;

pub(crate) fn parse_status(status: &str) -> Result<LeadStatus> {
    LeadStatus::parse(status).ok_or_else(|| {
        CrmError::validation(format!(
            "Invalid status. Must be one of: {}",
            LeadStatus::ALL
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    })
}

/// Rejections need a non-empty reason.
pub(crate) fn rejection_reason(status: LeadStatus, reason: Option<&str>) -> Result<Option<String>> {
    let reason = reason.map(str::trim).filter(|r| !r.is_empty());
    if status == LeadStatus::Rejected && reason.is_none() {
        return Err(CrmError::validation("Rejection reason is required"));
    }
    Ok(reason.map(str::to_string))
}

pub(crate) fn workload_from_counts(employee_id: i64, counts: Vec<(String, i64)>) -> EmployeeWorkload {
    let mut workload = EmployeeWorkload {
        employee_id,
        ..Default::default()
    };
    for (status, n) in counts {
        workload.total += n;
        if !TERMINAL_LEAD_STATUSES.contains(&status.as_str()) {
            workload.active += n;
        }
        workload.by_status.insert(status, n);
    }
    workload
}

/// `(limit, offset)` for a lead listing page; huge pages saturate to an empty page.
fn lead_page(page: Option<i64>, limit: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(50).clamp(1, 200);
    let page = page.unwrap_or(1).max(1);
    (limit, (page - 1).saturating_mul(limit))
}

impl PgStorage {
    pub async fn get_lead(&self, id: i64) -> Result<Lead> {
        let sql = format!("{} WHERE l.id = $1", LEAD_SELECT);
        self.timed(sqlx::query_as::<_, Lead>(&sql).bind(id).fetch_optional(&self.pool))
            .await?
            .ok_or_else(|| CrmError::not_found("Lead not found"))
    }

    pub async fn list_leads(&self, query: &LeadListQuery) -> Result<Vec<Lead>> {
        let (limit, offset) = lead_page(query.page, query.limit);
        let status = match query.status.as_deref() {
            Some(s) => Some(parse_status(s)?.as_str()),
            None => None,
        };
        let sql = format!(
            r#"{}
            WHERE ($1::BIGINT IS NULL OR l.assigned_to = $1)
              AND ($2::TEXT IS NULL OR l.status = $2)
            ORDER BY l.created_at DESC, l.id DESC
            LIMIT $3 OFFSET $4
            "#,
            LEAD_SELECT
        );
        let rows = self
            .timed(
                sqlx::query_as::<_, Lead>(&sql)
                    .bind(query.assigned_to)
                    .bind(status)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows)
    }

    async fn next_lead_number(&self) -> Result<String> {
        let year = Utc::now().year();
        let existing: i64 = self
            .timed(
                sqlx::query_scalar("SELECT COUNT(*) FROM leads WHERE lead_number LIKE $1")
                    .bind(format!("L{}-%", year))
                    .fetch_one(&self.pool),
            )
            .await?;
        Ok(pricing::lead_number(year, existing))
    }

    async fn require_active_employee(&self, employee_id: i64) -> Result<()> {
        let active: Option<bool> = self
            .timed(
                sqlx::query_scalar("SELECT status = 'active' FROM employees WHERE id = $1")
                    .bind(employee_id)
                    .fetch_optional(&self.pool),
            )
            .await?;
        match active {
            Some(true) => Ok(()),
            Some(false) => Err(CrmError::validation("Employee is not active")),
            None => Err(CrmError::not_found("Employee not found")),
        }
    }

    /// New leads start UNASSIGNED, or ASSIGNED when an owner is given
    /// (which also fires the `lead_assigned` task rules).
    pub async fn create_lead(&self, input: &LeadInput, performed_by: Option<i64>) -> Result<Lead> {
        if input.client_name.trim().is_empty() {
            return Err(CrmError::validation("Client name is required"));
        }
        if let Some(assignee) = input.assigned_to {
            self.require_active_employee(assignee).await?;
        }

        let lead_number = self.next_lead_number().await?;
        let status = if input.assigned_to.is_some() {
            LeadStatus::Assigned
        } else {
            LeadStatus::Unassigned
        };

        let mut tx = self.begin().await?;
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO leads
                (lead_number, client_name, client_email, client_phone, company_id, branch_id,
                 assigned_to, lead_source_id, status, estimated_value, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
            "#,
        )
        .bind(&lead_number)
        .bind(input.client_name.trim())
        .bind(&input.client_email)
        .bind(&input.client_phone)
        .bind(input.company_id)
        .bind(input.branch_id)
        .bind(input.assigned_to)
        .bind(input.lead_source_id)
        .bind(status.as_str())
        .bind(input.estimated_value)
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO lead_activity_logs (lead_id, activity_type, description, performed_by, metadata) VALUES ($1, 'CREATED', $2, $3, $4)",
        )
        .bind(id)
        .bind(format!("Lead {} created", lead_number))
        .bind(performed_by)
        .bind(json!({ "status": status.as_str(), "assigned_to": input.assigned_to }))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(lead_id = id, lead_number = %lead_number, status = status.as_str(), "Lead created");

        if input.assigned_to.is_some() {
            self.trigger_lead_event(id, None, LeadEvent::LeadAssigned).await;
        }
        self.get_lead(id).await
    }

    pub async fn update_lead_status(
        &self,
        id: i64,
        status: &str,
        reason: Option<&str>,
        performed_by: Option<i64>,
    ) -> Result<Lead> {
        let next = parse_status(status)?;
        let reason = rejection_reason(next, reason)?;

        let mut tx = self.begin().await?;
        let current: String = sqlx::query_scalar("SELECT status FROM leads WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CrmError::not_found("Lead not found"))?;

        let rejected = next == LeadStatus::Rejected;
        sqlx::query(
            r#"
            UPDATE leads
            SET status = $2,
                is_rejected = $3,
                rejection_reason = CASE WHEN $3 THEN $4 ELSE rejection_reason END,
                rejected_at = CASE WHEN $3 THEN now() ELSE rejected_at END,
                rejected_by = CASE WHEN $3 THEN $5 ELSE rejected_by END,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(next.as_str())
        .bind(rejected)
        .bind(&reason)
        .bind(performed_by)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO lead_activity_logs (lead_id, activity_type, description, performed_by, metadata) VALUES ($1, 'STATUS_CHANGE', $2, $3, $4)",
        )
        .bind(id)
        .bind(format!("Status changed from {} to {}", current, next.as_str()))
        .bind(performed_by)
        .bind(json!({ "old_status": current, "new_status": next.as_str(), "reason": reason }))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(lead_id = id, from = %current, to = next.as_str(), "Lead status updated");

        if let Some(from) = LeadStatus::parse(&current).filter(|from| *from != next) {
            self.trigger_lead_event(id, None, LeadEvent::LeadStatusChanged { from, to: next })
                .await;
        }
        self.get_lead(id).await
    }

    /// First assignment of an owner. UNASSIGNED leads become ASSIGNED.
    pub async fn assign_lead(&self, id: i64, employee_id: i64, performed_by: Option<i64>) -> Result<Lead> {
        self.require_active_employee(employee_id).await?;

        let mut tx = self.begin().await?;
        let updated = sqlx::query(
            r#"
            UPDATE leads
            SET assigned_to = $2,
                status = CASE WHEN status = 'UNASSIGNED' THEN 'ASSIGNED' ELSE status END,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(employee_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if updated == 0 {
            return Err(CrmError::not_found("Lead not found"));
        }
        sqlx::query(
            "INSERT INTO lead_activity_logs (lead_id, activity_type, description, performed_by, metadata) VALUES ($1, 'ASSIGNMENT', $2, $3, $4)",
        )
        .bind(id)
        .bind(format!("Lead assigned to employee {}", employee_id))
        .bind(performed_by)
        .bind(json!({ "assigned_to": employee_id }))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(lead_id = id, employee_id, "Lead assigned");
        self.trigger_lead_event(id, None, LeadEvent::LeadAssigned).await;
        self.get_lead(id).await
    }

    pub async fn reassign_lead(
        &self,
        id: i64,
        employee_id: i64,
        reason: Option<&str>,
        performed_by: Option<i64>,
    ) -> Result<Lead> {
        self.require_active_employee(employee_id).await?;
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_REASSIGNMENT_REASON);

        let mut tx = self.begin().await?;
        let previous: Option<i64> = sqlx::query_scalar("SELECT assigned_to FROM leads WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CrmError::not_found("Lead not found"))?;

        sqlx::query(
            r#"
            UPDATE leads
            SET assigned_to = $2,
                reassigned_from_employee_id = assigned_to,
                reassigned_at = now(),
                reassignment_reason = $3,
                status = CASE WHEN status = 'UNASSIGNED' THEN 'ASSIGNED' ELSE status END,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(employee_id)
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO lead_activity_logs (lead_id, activity_type, description, performed_by, metadata) VALUES ($1, 'REASSIGNMENT', $2, $3, $4)",
        )
        .bind(id)
        .bind(format!("Lead reassigned: {}", reason))
        .bind(performed_by)
        .bind(json!({ "from": previous, "to": employee_id, "reason": reason }))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(lead_id = id, from = ?previous, to = employee_id, "Lead reassigned");
        self.get_lead(id).await
    }

    /// Returns the number of leads moved.
    pub async fn bulk_reassign_leads(
        &self,
        lead_ids: &[i64],
        employee_id: i64,
        reason: Option<&str>,
        performed_by: Option<i64>,
    ) -> Result<u64> {
        if lead_ids.is_empty() {
            return Err(CrmError::validation("At least one lead ID is required"));
        }
        self.require_active_employee(employee_id).await?;
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_REASSIGNMENT_REASON);

        let mut tx = self.begin().await?;
        let moved = sqlx::query(
            r#"
            UPDATE leads
            SET assigned_to = $2,
                reassigned_from_employee_id = assigned_to,
                reassigned_at = now(),
                reassignment_reason = $3,
                status = CASE WHEN status = 'UNASSIGNED' THEN 'ASSIGNED' ELSE status END,
                updated_at = now()
            WHERE id = ANY($1)
            "#,
        )
        .bind(lead_ids)
        .bind(employee_id)
        .bind(reason)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query(
            r#"
            INSERT INTO lead_activity_logs (lead_id, activity_type, description, performed_by, metadata)
            SELECT id, 'REASSIGNMENT', $3, $4, jsonb_build_object('to', $2::BIGINT, 'bulk', true)
            FROM leads WHERE id = ANY($1)
            "#,
        )
        .bind(lead_ids)
        .bind(employee_id)
        .bind(format!("Lead reassigned: {}", reason))
        .bind(performed_by)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(count = moved, to = employee_id, "Leads bulk reassigned");
        Ok(moved)
    }

    pub async fn lead_activity_log(&self, lead_id: i64) -> Result<Vec<LeadActivity>> {
        let rows = self
            .timed(
                sqlx::query_as::<_, LeadActivity>(
                    "SELECT * FROM lead_activity_logs WHERE lead_id = $1 ORDER BY created_at DESC, id DESC",
                )
                .bind(lead_id)
                .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows)
    }

    /// Leads created for the employee in the last 30 days, by status.
    pub async fn employee_workload(&self, employee_id: i64) -> Result<EmployeeWorkload> {
        let counts: Vec<(String, i64)> = self
            .timed(
                sqlx::query_as(
                    r#"
                    SELECT status, COUNT(*) FROM leads
                    WHERE assigned_to = $1 AND created_at >= now() - make_interval(days => $2)
                    GROUP BY status
                    "#,
                )
                .bind(employee_id)
                .bind(WORKLOAD_WINDOW_DAYS)
                .fetch_all(&self.pool),
            )
            .await?;
        Ok(workload_from_counts(employee_id, counts))
    }

    pub async fn lead_analytics(&self) -> Result<LeadAnalytics> {
        let by_status: Vec<(String, i64)> = self
            .timed(sqlx::query_as("SELECT status, COUNT(*) FROM leads GROUP BY status").fetch_all(&self.pool))
            .await?;
        let by_source: Vec<(String, i64)> = self
            .timed(
                sqlx::query_as(
                    r#"
                    SELECT COALESCE(s.name, 'Not specified'), COUNT(*)
                    FROM leads l LEFT JOIN lead_sources s ON s.id = l.lead_source_id
                    GROUP BY 1
                    "#,
                )
                .fetch_all(&self.pool),
            )
            .await?;
        let terminal: Vec<String> = TERMINAL_LEAD_STATUSES.iter().map(|s| s.to_string()).collect();
        let open_pipeline_value: f64 = self
            .timed(
                sqlx::query_scalar(
                    "SELECT COALESCE(SUM(estimated_value), 0)::DOUBLE PRECISION FROM leads WHERE status <> ALL($1)",
                )
                .bind(&terminal)
                .fetch_one(&self.pool),
            )
            .await?;

        let total: i64 = by_status.iter().map(|(_, n)| n).sum();
        let won = by_status
            .iter()
            .find(|(s, _)| s == LeadStatus::ClosedWon.as_str())
            .map(|(_, n)| *n)
            .unwrap_or(0);

        Ok(LeadAnalytics {
            total,
            by_status: by_status.into_iter().collect(),
            by_source: by_source.into_iter().collect(),
            conversion_rate: pricing::rate(won, total),
            open_pipeline_value,
        })
    }

    pub async fn list_lead_sources(&self) -> Result<Vec<LeadSource>> {
        let rows = self
            .timed(
                sqlx::query_as::<_, LeadSource>(
                    "SELECT id, name, description FROM lead_sources WHERE is_active ORDER BY name",
                )
                .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows)
    }

    /// Rule-engine view of a lead. Uses the given quotation, else the lead's newest one.
    pub async fn lead_context(&self, lead_id: i64, quotation_id: Option<i64>) -> Result<LeadContext> {
        let lead = self.get_lead(lead_id).await?;
        let quotation: Option<(i64, String, f64)> = self
            .timed(
                sqlx::query_as(
                    r#"
                    SELECT id, quotation_number, total_amount FROM quotations
                    WHERE ($2::BIGINT IS NOT NULL AND id = $2)
                       OR ($2::BIGINT IS NULL AND lead_id = $1)
                    ORDER BY created_at DESC
                    LIMIT 1
                    "#,
                )
                .bind(lead_id)
                .bind(quotation_id)
                .fetch_optional(&self.pool),
            )
            .await?;

        Ok(LeadContext {
            lead_id: lead.id,
            lead_number: lead.lead_number,
            client_name: lead.client_name,
            status: LeadStatus::parse(&lead.status).unwrap_or(LeadStatus::Unassigned),
            estimated_value: lead.estimated_value,
            assigned_to: lead.assigned_to,
            quotation: quotation.map(|(id, quotation_number, total_amount)| QuotationRef {
                id,
                quotation_number,
                total_amount,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::postgres::test_storage;

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("closed_won").unwrap(), LeadStatus::ClosedWon);
        let err = parse_status("WON").unwrap_err();
        assert!(err.to_string().starts_with("Invalid status. Must be one of: UNASSIGNED"));
    }

    #[test]
    fn test_lead_page() {
        assert_eq!(lead_page(None, None), (50, 0));
        assert_eq!(lead_page(Some(3), Some(500)), (200, 400));
        assert_eq!(lead_page(Some(0), Some(0)), (1, 0));
        assert_eq!(lead_page(Some(i64::MAX), Some(200)), (200, i64::MAX));
    }

    #[test]
    fn test_rejection_requires_reason() {
        assert!(rejection_reason(LeadStatus::Rejected, None).is_err());
        assert!(rejection_reason(LeadStatus::Rejected, Some("  ")).is_err());
        assert_eq!(
            rejection_reason(LeadStatus::Rejected, Some(" budget ")).unwrap(),
            Some("budget".to_string())
        );
        assert_eq!(rejection_reason(LeadStatus::Contacted, None).unwrap(), None);
    }

    #[test]
    fn test_workload_counts_active() {
        let w = workload_from_counts(
            3,
            vec![
                ("ASSIGNED".into(), 2),
                ("CLOSED_WON".into(), 1),
                ("REJECTED".into(), 1),
                ("NEGOTIATION".into(), 3),
            ],
        );
        assert_eq!(w.total, 7);
        assert_eq!(w.active, 5);
        assert_eq!(w.by_status["NEGOTIATION"], 3);
    }

    // -------------------------------------------------------------------------
    // Database (requires OOAK_TEST_DATABASE_URL)
    // -------------------------------------------------------------------------

    fn input(name: &str) -> LeadInput {
        LeadInput {
            client_name: name.to_string(),
            client_email: None,
            client_phone: Some("9876543210".into()),
            company_id: None,
            branch_id: None,
            assigned_to: None,
            lead_source_id: None,
            estimated_value: Some(45000.0),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_reject_lead() {
        let Some(storage) = test_storage().await else {
            return;
        };
        let lead = storage.create_lead(&input("Anika"), None).await.unwrap();
        assert_eq!(lead.status, "UNASSIGNED");
        assert!(lead.lead_number.starts_with(&format!("L{}-", Utc::now().year())));
        assert_eq!(lead.lead_source_name, "Not specified");

        let err = storage
            .update_lead_status(lead.id, "REJECTED", None, None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Rejection reason is required");

        let rejected = storage
            .update_lead_status(lead.id, "REJECTED", Some("Out of budget"), None)
            .await
            .unwrap();
        assert!(rejected.is_rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("Out of budget"));

        let log = storage.lead_activity_log(lead.id).await.unwrap();
        assert!(log.iter().any(|a| a.activity_type == "STATUS_CHANGE"));
    }

    #[tokio::test]
    async fn test_bulk_reassign() {
        let Some(storage) = test_storage().await else {
            return;
        };
        let employees = storage.list_employees(None).await.unwrap();
        let Some(employee) = employees.iter().find(|e| e.status == "active") else {
            return;
        };
        let a = storage.create_lead(&input("Bulk A"), None).await.unwrap();
        let b = storage.create_lead(&input("Bulk B"), None).await.unwrap();

        let moved = storage
            .bulk_reassign_leads(&[a.id, b.id], employee.id, None, None)
            .await
            .unwrap();
        assert_eq!(moved, 2);

        let a = storage.get_lead(a.id).await.unwrap();
        assert_eq!(a.assigned_to, Some(employee.id));
        assert_eq!(a.status, "ASSIGNED");
        assert_eq!(a.reassignment_reason.as_deref(), Some("Manual reassignment"));
    }
}
