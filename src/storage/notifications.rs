//! In-app notifications: creation, paged inbox, read state, expiry and the
//! business-event helpers used by the quotation workflow and task engine.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use super::PgStorage;
use crate::crm::format_amount;
use crate::error::{CrmError, Result};
use crate::models::{
    NewNotification, Notification, NotificationPage, NotificationQuery, Quotation,
    ADMIN_ROLE_TITLE, NOTIFICATION_PRIORITIES, NOTIFICATION_TYPES, SALES_HEAD_ROLE,
};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;
const OVERDUE_URGENT_DAYS: i64 = 7;
const OVERDUE_ESCALATION_DAYS: i64 = 5;

pub(crate) fn validate_notification(n: &NewNotification) -> Result<()> {
    if !NOTIFICATION_TYPES.contains(&n.kind.as_str()) {
        return Err(CrmError::validation(format!(
            "Invalid notification type. Must be one of: {}",
            NOTIFICATION_TYPES.join(", ")
        )));
    }
    if !NOTIFICATION_PRIORITIES.contains(&n.priority.as_str()) {
        return Err(CrmError::validation(format!(
            "Invalid priority. Must be one of: {}",
            NOTIFICATION_PRIORITIES.join(", ")
        )));
    }
    if n.title.trim().is_empty() {
        return Err(CrmError::validation("Title is required"));
    }
    if n.message.trim().is_empty() {
        return Err(CrmError::validation("Message is required"));
    }
    Ok(())
}

/// Normalised `(page, limit, offset)`.
pub(crate) fn page_window(page: Option<i64>, limit: Option<i64>) -> (i64, i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (page, limit, (page - 1).saturating_mul(limit))
}

pub(crate) fn overdue_priority(days_overdue: i64) -> &'static str {
    if days_overdue > OVERDUE_URGENT_DAYS {
        "urgent"
    } else {
        "high"
    }
}

fn business_event(
    user_id: i64,
    kind: &str,
    priority: &str,
    title: String,
    message: String,
    quotation_id: Option<i64>,
    metadata: serde_json::Value,
) -> NewNotification {
    let mut metadata = metadata;
    metadata["business_event"] = json!(true);
    NewNotification {
        user_id,
        kind: kind.to_string(),
        priority: priority.to_string(),
        title,
        message,
        quotation_id,
        action_url: quotation_id.map(|id| format!("/sales/quotations/{}", id)),
        action_label: quotation_id.map(|_| "View Quotation".to_string()),
        expires_at: None,
        metadata: Some(metadata),
    }
}

impl PgStorage {
    pub async fn create_notification(&self, n: &NewNotification) -> Result<Notification> {
        validate_notification(n)?;

        let user_exists: bool = self
            .timed(
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM employees WHERE id = $1)")
                    .bind(n.user_id)
                    .fetch_one(&self.pool),
            )
            .await?;
        if !user_exists {
            return Err(CrmError::validation("Invalid user ID"));
        }

        let notification = self
            .timed(
                sqlx::query_as::<_, Notification>(
                    r#"
                    INSERT INTO notifications
                        (id, user_id, type, priority, title, message, quotation_id,
                         action_url, action_label, expires_at, metadata)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                    RETURNING *
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(n.user_id)
                .bind(&n.kind)
                .bind(&n.priority)
                .bind(n.title.trim())
                .bind(n.message.trim())
                .bind(n.quotation_id)
                .bind(&n.action_url)
                .bind(&n.action_label)
                .bind(n.expires_at)
                .bind(n.metadata.clone().unwrap_or_else(|| json!({})))
                .fetch_one(&self.pool),
            )
            .await?;

        tracing::debug!(
            user_id = n.user_id,
            kind = %n.kind,
            priority = %n.priority,
            "Notification created"
        );
        Ok(notification)
    }

    /// The caller's inbox, newest first. Expired notifications are hidden.
    pub async fn list_notifications(
        &self,
        user_id: i64,
        query: &NotificationQuery,
    ) -> Result<NotificationPage> {
        let (page, limit, offset) = page_window(query.page, query.limit);

        const FILTER: &str = r#"
            WHERE user_id = $1
              AND (expires_at IS NULL OR expires_at > now())
              AND ($2::TEXT IS NULL OR priority = $2)
              AND ($3::TEXT IS NULL OR type = $3)
              AND ($4::BOOLEAN IS NULL OR is_read = $4)
              AND (NOT $5::BOOLEAN OR COALESCE((metadata->>'business_event')::BOOLEAN, false))
        "#;

        let sql = format!(
            "SELECT * FROM notifications {} ORDER BY created_at DESC LIMIT $6 OFFSET $7",
            FILTER
        );
        let notifications = self
            .timed(
                sqlx::query_as::<_, Notification>(&sql)
                    .bind(user_id)
                    .bind(&query.priority)
                    .bind(&query.kind)
                    .bind(query.is_read)
                    .bind(query.business_only)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool),
            )
            .await?;

        let count_sql = format!("SELECT COUNT(*) FROM notifications {}", FILTER);
        let total: i64 = self
            .timed(
                sqlx::query_scalar(&count_sql)
                    .bind(user_id)
                    .bind(&query.priority)
                    .bind(&query.kind)
                    .bind(query.is_read)
                    .bind(query.business_only)
                    .fetch_one(&self.pool),
            )
            .await?;

        let unread: i64 = self
            .timed(
                sqlx::query_scalar(
                    r#"
                    SELECT COUNT(*) FROM notifications
                    WHERE user_id = $1 AND NOT is_read
                      AND (expires_at IS NULL OR expires_at > now())
                    "#,
                )
                .bind(user_id)
                .fetch_one(&self.pool),
            )
            .await?;

        Ok(NotificationPage {
            notifications,
            total,
            unread,
            page,
            limit,
        })
    }

    pub async fn mark_notification_read(&self, user_id: i64, id: Uuid) -> Result<()> {
        let updated = self
            .timed(
                sqlx::query(
                    r#"
                    UPDATE notifications SET is_read = true, read_at = COALESCE(read_at, now())
                    WHERE id = $1 AND user_id = $2
                    "#,
                )
                .bind(id)
                .bind(user_id)
                .execute(&self.pool),
            )
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(CrmError::not_found("Notification not found"));
        }
        Ok(())
    }

    pub async fn mark_all_notifications_read(&self, user_id: i64) -> Result<u64> {
        let updated = self
            .timed(
                sqlx::query(
                    "UPDATE notifications SET is_read = true, read_at = now() WHERE user_id = $1 AND NOT is_read",
                )
                .bind(user_id)
                .execute(&self.pool),
            )
            .await?
            .rows_affected();
        Ok(updated)
    }

    pub async fn cleanup_expired_notifications(&self) -> Result<u64> {
        let deleted = self
            .timed(
                sqlx::query("DELETE FROM notifications WHERE expires_at IS NOT NULL AND expires_at <= now()")
                    .execute(&self.pool),
            )
            .await?
            .rows_affected();
        if deleted > 0 {
            tracing::info!(deleted, "Expired notifications removed");
        }
        Ok(deleted)
    }

    /// Employees holding an active account with one of the given role titles.
    pub(crate) async fn employees_with_roles(&self, roles: &[&str]) -> Result<Vec<i64>> {
        let roles: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
        let ids = self
            .timed(
                sqlx::query_scalar(
                    r#"
                    SELECT DISTINCT a.employee_id
                    FROM user_accounts a
                    JOIN roles r ON r.id = a.role_id
                    WHERE a.is_active AND r.title = ANY($1)
                    ORDER BY a.employee_id
                    "#,
                )
                .bind(&roles)
                .fetch_all(&self.pool),
            )
            .await?;
        Ok(ids)
    }

    async fn send_all(&self, notifications: Vec<NewNotification>) -> Result<usize> {
        let mut sent = 0;
        for n in &notifications {
            self.create_notification(n).await?;
            sent += 1;
        }
        Ok(sent)
    }

    // -----------------------------------------------------------------------
    // Business-event helpers
    // -----------------------------------------------------------------------

    pub async fn notify_approval_needed(&self, quotation: &Quotation) -> Result<usize> {
        let approvers = self
            .employees_with_roles(&[SALES_HEAD_ROLE, ADMIN_ROLE_TITLE])
            .await?;
        let batch = approvers
            .into_iter()
            .map(|user_id| {
                business_event(
                    user_id,
                    "approval_needed",
                    "high",
                    format!("Approval needed: {}", quotation.quotation_number),
                    format!(
                        "Quotation {} for {} (₹{}) is waiting for approval.",
                        quotation.quotation_number,
                        quotation.client_name,
                        format_amount(quotation.total_amount)
                    ),
                    Some(quotation.id),
                    json!({ "quotation_number": quotation.quotation_number }),
                )
            })
            .collect();
        self.send_all(batch).await
    }

    /// Tells the quotation's creator and the sales heads.
    pub async fn notify_payment_received(&self, quotation: &Quotation, amount: f64) -> Result<usize> {
        let mut recipients = self.employees_with_roles(&[SALES_HEAD_ROLE]).await?;
        if let Some(rep) = quotation.created_by {
            if !recipients.contains(&rep) {
                recipients.insert(0, rep);
            }
        }
        let batch = recipients
            .into_iter()
            .map(|user_id| {
                business_event(
                    user_id,
                    "payment_received",
                    "high",
                    format!("Payment received: {}", quotation.quotation_number),
                    format!(
                        "Payment of ₹{} received from {} for quotation {}.",
                        format_amount(amount),
                        quotation.client_name,
                        quotation.quotation_number
                    ),
                    Some(quotation.id),
                    json!({ "amount": amount }),
                )
            })
            .collect();
        self.send_all(batch).await
    }

    /// Reminds the creator; escalates to sales heads past the escalation threshold.
    pub async fn notify_overdue_quotation(
        &self,
        quotation: &Quotation,
        days_overdue: i64,
    ) -> Result<usize> {
        let mut batch = Vec::new();
        if let Some(rep) = quotation.created_by {
            batch.push(business_event(
                rep,
                "overdue",
                overdue_priority(days_overdue),
                format!("Quotation overdue: {}", quotation.quotation_number),
                format!(
                    "Quotation {} for {} has had no response for {} days.",
                    quotation.quotation_number, quotation.client_name, days_overdue
                ),
                Some(quotation.id),
                json!({ "days_overdue": days_overdue }),
            ));
        }
        if days_overdue > OVERDUE_ESCALATION_DAYS {
            for head in self.employees_with_roles(&[SALES_HEAD_ROLE]).await? {
                batch.push(business_event(
                    head,
                    "escalation",
                    "urgent",
                    format!("Escalation: {} overdue", quotation.quotation_number),
                    format!(
                        "Quotation {} (₹{}) for {} is {} days overdue and needs attention.",
                        quotation.quotation_number,
                        format_amount(quotation.total_amount),
                        quotation.client_name,
                        days_overdue
                    ),
                    Some(quotation.id),
                    json!({ "days_overdue": days_overdue, "escalated": true }),
                ));
            }
        }
        self.send_all(batch).await
    }

    pub async fn notify_task_assigned(
        &self,
        employee_id: i64,
        task_id: i64,
        title: &str,
        priority: &str,
        due_date: DateTime<Utc>,
    ) -> Result<Notification> {
        let n = NewNotification {
            user_id: employee_id,
            kind: "task_assigned".to_string(),
            priority: priority.to_ascii_lowercase(),
            title: format!("New task: {}", title),
            message: format!(
                "You have been assigned \"{}\", due {}.",
                title,
                due_date.format("%Y-%m-%d %H:%M UTC")
            ),
            quotation_id: None,
            action_url: Some(format!("/tasks/{}", task_id)),
            action_label: Some("Open Task".to_string()),
            expires_at: Some(due_date + Duration::days(30)),
            metadata: Some(json!({ "task_id": task_id, "business_event": true })),
        };
        self.create_notification(&n).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::postgres::test_storage;

    fn sample(kind: &str, priority: &str) -> NewNotification {
        NewNotification {
            user_id: 1,
            kind: kind.to_string(),
            priority: priority.to_string(),
            title: "Title".into(),
            message: "Message".into(),
            quotation_id: None,
            action_url: None,
            action_label: None,
            expires_at: None,
            metadata: None,
        }
    }

    #[test]
    fn test_validation() {
        assert!(validate_notification(&sample("system", "medium")).is_ok());
        assert!(validate_notification(&sample("spam", "medium"))
            .unwrap_err()
            .to_string()
            .starts_with("Invalid notification type"));
        assert!(validate_notification(&sample("system", "critical")).is_err());

        let mut blank = sample("system", "low");
        blank.title = "  ".into();
        assert_eq!(
            validate_notification(&blank).unwrap_err().to_string(),
            "Title is required"
        );
    }

    #[test]
    fn test_page_window() {
        assert_eq!(page_window(None, None), (1, 50, 0));
        assert_eq!(page_window(Some(0), Some(500)), (1, 100, 0));
        assert_eq!(page_window(Some(3), Some(20)), (3, 20, 40));
        assert_eq!(page_window(Some(-2), Some(0)), (1, 1, 0));
        assert_eq!(
            page_window(Some(i64::MAX), Some(100)),
            (i64::MAX, 100, i64::MAX)
        );
    }

    #[test]
    fn test_overdue_priority() {
        assert_eq!(overdue_priority(3), "high");
        assert_eq!(overdue_priority(7), "high");
        assert_eq!(overdue_priority(8), "urgent");
    }

    #[test]
    fn test_business_event_marks_metadata() {
        let n = business_event(4, "overdue", "high", "t".into(), "m".into(), Some(9), json!({}));
        assert_eq!(n.metadata.unwrap()["business_event"], true);
        assert_eq!(n.action_url.as_deref(), Some("/sales/quotations/9"));
    }

    // -------------------------------------------------------------------------
    // Database (requires OOAK_TEST_DATABASE_URL)
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_inbox_flow() {
        let Some(storage) = test_storage().await else {
            return;
        };
        let employees = storage.list_employees(None).await.unwrap();
        let Some(employee) = employees.first() else {
            return;
        };

        let mut n = sample("system", "high");
        n.user_id = employee.id;
        let created = storage.create_notification(&n).await.unwrap();
        assert!(!created.is_read);

        let page = storage
            .list_notifications(
                employee.id,
                &NotificationQuery {
                    priority: Some("high".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(page.notifications.iter().any(|x| x.id == created.id));
        assert!(page.unread >= 1);

        storage
            .mark_notification_read(employee.id, created.id)
            .await
            .unwrap();
        let err = storage
            .mark_notification_read(employee.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unknown_user_rejected() {
        let Some(storage) = test_storage().await else {
            return;
        };
        let mut n = sample("system", "low");
        n.user_id = i64::MAX;
        let err = storage.create_notification(&n).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid user ID");
    }
}
