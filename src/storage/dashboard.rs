//! Dashboard counters and the record snapshot behind business chat.

use serde::Serialize;

use super::PgStorage;
use crate::crm::business_chat::{BusinessContext, DataNeeds, LEAD_LIMIT, QUOTATION_LIMIT, TASK_LIMIT};
use crate::error::Result;
use crate::models::{Activity, LeadListQuery, QuotationListQuery, TaskFilter};

/// Month-over-month change, reported as an unsigned percentage plus direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GrowthTrend {
    pub is_positive: bool,
    pub value: i64,
}

impl GrowthTrend {
    pub fn from_counts(total: i64, current_month: i64, previous_month: i64) -> Self {
        if total == 0 {
            return Self {
                is_positive: true,
                value: 0,
            };
        }
        if previous_month == 0 {
            return Self {
                is_positive: true,
                value: 100,
            };
        }
        let rate = (current_month - previous_month) as f64 / previous_month as f64 * 100.0;
        Self {
            is_positive: rate >= 0.0,
            // Halves round toward +inf, so -2.5 reports 2.
            value: (rate + 0.5).floor().abs() as i64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntityCount {
    pub count: i64,
    pub trend: GrowthTrend,
}

#[derive(Debug, Clone, Serialize)]
pub struct DepartmentCount {
    pub department: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub companies: EntityCount,
    pub branches: EntityCount,
    pub employees: EntityCount,
    pub leads: EntityCount,
    pub quotations: EntityCount,
    pub employees_by_department: Vec<DepartmentCount>,
    pub recent_activities: Vec<Activity>,
}

const RECENT_ACTIVITY_LIMIT: i64 = 10;

impl PgStorage {
    /// `table` must be one of the fixed names below; it is interpolated.
    async fn entity_count(&self, table: &'static str) -> Result<EntityCount> {
        let sql = format!(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE created_at >= date_trunc('month', now())),
                   COUNT(*) FILTER (WHERE created_at >= date_trunc('month', now()) - interval '1 month'
                                      AND created_at < date_trunc('month', now()))
            FROM {}
            "#,
            table
        );
        let (total, current, previous): (i64, i64, i64) = self
            .timed(sqlx::query_as(&sql).fetch_one(&self.pool))
            .await?;
        Ok(EntityCount {
            count: total,
            trend: GrowthTrend::from_counts(total, current, previous),
        })
    }

    pub async fn dashboard_stats(&self) -> Result<DashboardStats> {
        let (companies, branches, employees, leads, quotations) = tokio::try_join!(
            self.entity_count("companies"),
            self.entity_count("branches"),
            self.entity_count("employees"),
            self.entity_count("leads"),
            self.entity_count("quotations"),
        )?;

        let by_department: Vec<(String, i64)> = self
            .timed(
                sqlx::query_as(
                    r#"
                    SELECT COALESCE(d.name, 'Unassigned'), COUNT(e.id)
                    FROM employees e
                    LEFT JOIN departments d ON d.id = e.department_id
                    GROUP BY 1
                    ORDER BY 2 DESC, 1
                    "#,
                )
                .fetch_all(&self.pool),
            )
            .await?;

        Ok(DashboardStats {
            companies,
            branches,
            employees,
            leads,
            quotations,
            employees_by_department: by_department
                .into_iter()
                .map(|(department, count)| DepartmentCount { department, count })
                .collect(),
            recent_activities: self.recent_activities(RECENT_ACTIVITY_LIMIT).await?,
        })
    }

    /// Newest records for each requested set.
    pub async fn business_context(&self, needs: DataNeeds) -> Result<BusinessContext> {
        let mut ctx = BusinessContext::default();
        if needs.leads {
            ctx.leads = self
                .list_leads(&LeadListQuery {
                    limit: Some(LEAD_LIMIT),
                    ..Default::default()
                })
                .await?;
        }
        if needs.quotations {
            ctx.quotations = self
                .list_quotations(&QuotationListQuery {
                    limit: Some(QUOTATION_LIMIT),
                    ..Default::default()
                })
                .await?;
        }
        if needs.tasks {
            ctx.tasks = self
                .list_tasks(&TaskFilter {
                    limit: Some(TASK_LIMIT),
                    ..Default::default()
                })
                .await?;
        }
        if needs.employees {
            ctx.employees = self.list_employees(None).await?;
        }
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::postgres::test_storage;

    #[test]
    fn test_growth_trend() {
        assert_eq!(
            GrowthTrend::from_counts(0, 0, 0),
            GrowthTrend {
                is_positive: true,
                value: 0
            }
        );
        assert_eq!(GrowthTrend::from_counts(5, 3, 0).value, 100);

        let up = GrowthTrend::from_counts(20, 6, 4);
        assert!(up.is_positive);
        assert_eq!(up.value, 50);

        let down = GrowthTrend::from_counts(20, 1, 3);
        assert!(!down.is_positive);
        assert_eq!(down.value, 67);

        let half = GrowthTrend::from_counts(79, 39, 40);
        assert!(!half.is_positive);
        assert_eq!(half.value, 2);
        assert_eq!(GrowthTrend::from_counts(81, 41, 40).value, 3);
    }

    #[tokio::test]
    async fn test_dashboard_stats() {
        let Some(storage) = test_storage().await else {
            return;
        };
        let stats = storage.dashboard_stats().await.unwrap();
        assert!(stats.recent_activities.len() <= RECENT_ACTIVITY_LIMIT as usize);
        let by_dept: i64 = stats.employees_by_department.iter().map(|d| d.count).sum();
        assert_eq!(by_dept, stats.employees.count);
    }

    #[tokio::test]
    async fn test_business_context_respects_needs() {
        let Some(storage) = test_storage().await else {
            return;
        };
        let ctx = storage
            .business_context(DataNeeds {
                quotations: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(ctx.leads.is_empty());
        assert!(ctx.employees.is_empty());
        assert!(ctx.quotations.len() <= QUOTATION_LIMIT as usize);
    }
}
