//! Filterable lead and quotation reports.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate, NaiveTime};
use sqlx::postgres::PgArguments;
use sqlx::query::QueryAs;
use sqlx::Postgres;

use super::PgStorage;
use crate::crm::pricing;
use crate::error::{CrmError, Result};
use crate::models::{
    FilterOption, FunnelStage, LeadReportRow, LeadSourceReport, LeadSourceReportRow,
    LeadSourceSummary, LeadStatus, QuotationReportRow, ReportFilterOptions, ReportFilters,
    ReportQuery, ReportRows, StatusOption, TeamMemberSummary, TeamPerformance, TeamStatusCount,
    TrendPoint, TERMINAL_LEAD_STATUSES,
};

/// Shared lead predicate; bound by `bind_lead_filters` as $1..$7.
const LEAD_FILTER: &str = r#"
    WHERE ($1::TIMESTAMPTZ IS NULL OR l.created_at >= $1)
      AND ($2::TIMESTAMPTZ IS NULL OR l.created_at < $2)
      AND (cardinality($3::BIGINT[]) = 0 OR l.lead_source_id = ANY($3))
      AND (cardinality($4::BIGINT[]) = 0 OR l.assigned_to = ANY($4))
      AND (cardinality($5::TEXT[]) = 0 OR l.status = ANY($5))
      AND (cardinality($6::BIGINT[]) = 0 OR l.company_id = ANY($6))
      AND (cardinality($7::BIGINT[]) = 0 OR l.branch_id = ANY($7))
"#;

const EMPLOYEE_NAME: &str = "NULLIF(TRIM(CONCAT(e.first_name, ' ', e.last_name)), '')";

fn parse_ids(field: &str, raw: Option<&str>) -> Result<Vec<i64>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| CrmError::validation(format!("Invalid {} id: {}", field, s)))
        })
        .collect()
}

fn parse_date(field: &str, raw: Option<&str>) -> Result<Option<NaiveDate>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| CrmError::validation(format!("Invalid {} date, expected YYYY-MM-DD", field))),
    }
}

pub(crate) fn report_filters(query: &ReportQuery) -> Result<ReportFilters> {
    let from = parse_date("from", query.from.as_deref())?;
    let to = parse_date("to", query.to.as_deref())?;
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(CrmError::validation("from must not be after to"));
        }
    }

    let statuses = match query.statuses.as_deref() {
        None => Vec::new(),
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| super::leads::parse_status(s).map(|st| st.as_str().to_string()))
            .collect::<Result<_>>()?,
    };

    let midnight = |d: NaiveDate| d.and_time(NaiveTime::MIN).and_utc();
    Ok(ReportFilters {
        from: from.map(midnight),
        until: to
            .and_then(|d| d.checked_add_days(Days::new(1)))
            .map(midnight),
        lead_source_ids: parse_ids("lead source", query.lead_sources.as_deref())?,
        employee_ids: parse_ids("employee", query.employees.as_deref())?,
        statuses,
        company_ids: parse_ids("company", query.companies.as_deref())?,
        branch_ids: parse_ids("branch", query.branches.as_deref())?,
    })
}

/// `CLOSED_WON` -> `Closed Won`.
pub(crate) fn status_label(status: &str) -> String {
    status
        .split('_')
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn funnel_position(status: &str) -> usize {
    LeadStatus::ALL
        .iter()
        .position(|s| s.as_str() == status)
        .unwrap_or(LeadStatus::ALL.len())
}

/// Pipeline order, then source name.
pub(crate) fn sort_funnel(stages: &mut [FunnelStage]) {
    stages.sort_by(|a, b| {
        funnel_position(&a.status)
            .cmp(&funnel_position(&b.status))
            .then_with(|| a.lead_source_name.cmp(&b.lead_source_name))
    });
}

pub(crate) fn summarize_sources(rows: &[LeadSourceReportRow]) -> Vec<LeadSourceSummary> {
    let mut by_source: BTreeMap<&str, (i64, i64, i64)> = BTreeMap::new();
    for row in rows {
        let entry = by_source.entry(row.lead_source_name.as_str()).or_default();
        entry.0 += 1;
        if row.status == LeadStatus::ClosedWon.as_str() {
            entry.1 += 1;
        } else if row.status == LeadStatus::ClosedLost.as_str() {
            entry.2 += 1;
        }
    }
    let mut summary: Vec<LeadSourceSummary> = by_source
        .into_iter()
        .map(|(name, (total, won, lost))| LeadSourceSummary {
            lead_source_name: name.to_string(),
            total,
            won,
            lost,
            conversion_rate: pricing::rate(won, total),
        })
        .collect();
    summary.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.lead_source_name.cmp(&b.lead_source_name)));
    summary
}

/// Folds per-status counts into one line per employee, in input order.
pub(crate) fn team_summary(rows: &[TeamStatusCount]) -> Vec<TeamMemberSummary> {
    let mut members: Vec<TeamMemberSummary> = Vec::new();
    for row in rows {
        let idx = match members.iter().position(|m| m.employee_id == row.employee_id) {
            Some(idx) => idx,
            None => {
                members.push(TeamMemberSummary {
                    employee_id: row.employee_id,
                    employee_name: row.employee_name.clone(),
                    total: 0,
                    active: 0,
                    won: 0,
                    lost: 0,
                    conversion_rate: 0.0,
                });
                members.len() - 1
            }
        };
        let member = &mut members[idx];
        member.total += row.count;
        if row.status == LeadStatus::ClosedWon.as_str() {
            member.won += row.count;
        } else if row.status == LeadStatus::ClosedLost.as_str() {
            member.lost += row.count;
        }
        if !TERMINAL_LEAD_STATUSES.contains(&row.status.as_str()) {
            member.active += row.count;
        }
    }
    for member in &mut members {
        member.conversion_rate = pricing::rate(member.won, member.total);
    }
    members
}

fn bind_lead_filters<'q, O>(
    query: QueryAs<'q, Postgres, O, PgArguments>,
    filters: &'q ReportFilters,
) -> QueryAs<'q, Postgres, O, PgArguments> {
    query
        .bind(filters.from)
        .bind(filters.until)
        .bind(&filters.lead_source_ids)
        .bind(&filters.employee_ids)
        .bind(&filters.statuses)
        .bind(&filters.company_ids)
        .bind(&filters.branch_ids)
}

impl PgStorage {
    pub async fn lead_source_report(&self, filters: &ReportFilters) -> Result<LeadSourceReport> {
        let sql = format!(
            r#"
            SELECT l.id, l.lead_number, l.client_name, l.status, l.created_at, l.updated_at,
                   l.lead_source_id, COALESCE(s.name, 'Not specified') AS lead_source_name,
                   l.assigned_to, {} AS employee_name
            FROM leads l
            LEFT JOIN lead_sources s ON s.id = l.lead_source_id
            LEFT JOIN employees e ON e.id = l.assigned_to
            {}
            ORDER BY l.created_at DESC, l.id DESC
            "#,
            EMPLOYEE_NAME, LEAD_FILTER
        );
        let leads = self
            .timed(bind_lead_filters(sqlx::query_as::<_, LeadSourceReportRow>(&sql), filters).fetch_all(&self.pool))
            .await?;
        Ok(LeadSourceReport {
            summary: summarize_sources(&leads),
            leads,
        })
    }

    pub async fn conversion_funnel(&self, filters: &ReportFilters) -> Result<Vec<FunnelStage>> {
        let sql = format!(
            r#"
            SELECT l.status, l.lead_source_id,
                   COALESCE(s.name, 'Not specified') AS lead_source_name, COUNT(*) AS count
            FROM leads l
            LEFT JOIN lead_sources s ON s.id = l.lead_source_id
            {}
            GROUP BY l.status, l.lead_source_id, s.name
            "#,
            LEAD_FILTER
        );
        let mut stages = self
            .timed(bind_lead_filters(sqlx::query_as::<_, FunnelStage>(&sql), filters).fetch_all(&self.pool))
            .await?;
        sort_funnel(&mut stages);
        Ok(stages)
    }

    pub async fn team_performance(&self, filters: &ReportFilters) -> Result<TeamPerformance> {
        let sql = format!(
            r#"
            SELECT e.id AS employee_id, CONCAT(e.first_name, ' ', e.last_name) AS employee_name,
                   l.status, COUNT(*) AS count
            FROM leads l
            JOIN employees e ON e.id = l.assigned_to
            {}
            GROUP BY e.id, e.first_name, e.last_name, l.status
            ORDER BY e.first_name, e.last_name, e.id, l.status
            "#,
            LEAD_FILTER
        );
        let by_status = self
            .timed(bind_lead_filters(sqlx::query_as::<_, TeamStatusCount>(&sql), filters).fetch_all(&self.pool))
            .await?;
        Ok(TeamPerformance {
            members: team_summary(&by_status),
            by_status,
        })
    }

    /// Daily lead counts (UTC days) by status and source.
    pub async fn lead_trends(&self, filters: &ReportFilters) -> Result<Vec<TrendPoint>> {
        let sql = format!(
            r#"
            SELECT (l.created_at AT TIME ZONE 'UTC')::DATE AS date, l.status,
                   COALESCE(s.name, 'Not specified') AS lead_source_name, COUNT(*) AS count
            FROM leads l
            LEFT JOIN lead_sources s ON s.id = l.lead_source_id
            {}
            GROUP BY 1, 2, 3
            ORDER BY 1, 2, 3
            "#,
            LEAD_FILTER
        );
        let rows = self
            .timed(bind_lead_filters(sqlx::query_as::<_, TrendPoint>(&sql), filters).fetch_all(&self.pool))
            .await?;
        Ok(rows)
    }

    pub async fn report_filter_options(&self) -> Result<ReportFilterOptions> {
        let options = move |sql: &'static str| async move {
            self.timed(sqlx::query_as::<_, FilterOption>(sql).fetch_all(&self.pool))
                .await
        };
        let (lead_sources, employees, companies, branches) = tokio::try_join!(
            options("SELECT id, name FROM lead_sources ORDER BY name"),
            options(
                "SELECT id, CONCAT(first_name, ' ', last_name) AS name FROM employees \
                 WHERE status = 'active' ORDER BY first_name, last_name"
            ),
            options("SELECT id, name FROM companies ORDER BY name"),
            options("SELECT id, name FROM branches ORDER BY name"),
        )?;
        Ok(ReportFilterOptions {
            lead_sources,
            employees,
            companies,
            branches,
            statuses: LeadStatus::ALL
                .iter()
                .map(|s| StatusOption {
                    id: s.as_str(),
                    name: status_label(s.as_str()),
                })
                .collect(),
        })
    }

    pub async fn leads_report(&self, filters: &ReportFilters) -> Result<ReportRows<LeadReportRow>> {
        let sql = format!(
            r#"
            SELECT l.id, l.lead_number, l.client_name, l.client_email, l.client_phone, l.status,
                   l.estimated_value, l.created_at, {} AS assigned_to_name,
                   b.name AS branch_name, c.name AS company_name
            FROM leads l
            LEFT JOIN employees e ON e.id = l.assigned_to
            LEFT JOIN branches b ON b.id = l.branch_id
            LEFT JOIN companies c ON c.id = l.company_id
            {}
            ORDER BY l.created_at DESC, l.id DESC
            "#,
            EMPLOYEE_NAME, LEAD_FILTER
        );
        let data = self
            .timed(bind_lead_filters(sqlx::query_as::<_, LeadReportRow>(&sql), filters).fetch_all(&self.pool))
            .await?;
        Ok(ReportRows {
            count: data.len(),
            total_value: data.iter().filter_map(|l| l.estimated_value).sum(),
            data,
        })
    }

    /// Date range and creator only; the lead-specific filters do not apply.
    pub async fn quotations_report(&self, filters: &ReportFilters) -> Result<ReportRows<QuotationReportRow>> {
        let sql = format!(
            r#"
            SELECT q.id, q.quotation_number, q.client_name, q.total_amount, q.status,
                   q.workflow_status, q.created_at, {} AS created_by_name, l.lead_number
            FROM quotations q
            LEFT JOIN employees e ON e.id = q.created_by
            LEFT JOIN leads l ON l.id = q.lead_id
            WHERE ($1::TIMESTAMPTZ IS NULL OR q.created_at >= $1)
              AND ($2::TIMESTAMPTZ IS NULL OR q.created_at < $2)
              AND (cardinality($3::BIGINT[]) = 0 OR q.created_by = ANY($3))
            ORDER BY q.created_at DESC, q.id DESC
            "#,
            EMPLOYEE_NAME
        );
        let data = self
            .timed(
                sqlx::query_as::<_, QuotationReportRow>(&sql)
                    .bind(filters.from)
                    .bind(filters.until)
                    .bind(&filters.employee_ids)
                    .fetch_all(&self.pool),
            )
            .await?;
        Ok(ReportRows {
            count: data.len(),
            total_value: data.iter().map(|q| q.total_amount).sum(),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LeadInput;
    use crate::storage::postgres::test_storage;
    use chrono::{TimeZone, Utc};

    fn query(f: impl FnOnce(&mut ReportQuery)) -> ReportQuery {
        let mut q = ReportQuery::default();
        f(&mut q);
        q
    }

    fn stage(status: &str, source: &str) -> FunnelStage {
        FunnelStage {
            status: status.to_string(),
            lead_source_id: None,
            lead_source_name: source.to_string(),
            count: 1,
        }
    }

    fn team_row(id: i64, status: &str, count: i64) -> TeamStatusCount {
        TeamStatusCount {
            employee_id: id,
            employee_name: format!("Employee {}", id),
            status: status.to_string(),
            count,
        }
    }

    #[test]
    fn test_report_filters() {
        assert_eq!(report_filters(&ReportQuery::default()).unwrap(), ReportFilters::default());

        let f = report_filters(&query(|q| {
            q.from = Some("2024-03-01".into());
            q.to = Some("2024-03-31".into());
            q.employees = Some("3, 7,".into());
            q.statuses = Some("new,closed_won".into());
            q.branches = Some("".into());
        }))
        .unwrap();
        assert_eq!(f.from, Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()));
        // `to` covers the whole day
        assert_eq!(f.until, Some(Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()));
        assert_eq!(f.employee_ids, vec![3, 7]);
        assert_eq!(f.statuses, vec!["NEW".to_string(), "CLOSED_WON".to_string()]);
        assert!(f.branch_ids.is_empty());
    }

    #[test]
    fn test_report_filters_rejects_bad_input() {
        let err = report_filters(&query(|q| q.companies = Some("1,x".into()))).unwrap_err();
        assert_eq!(err.to_string(), "Invalid company id: x");

        let err = report_filters(&query(|q| q.from = Some("01/03/2024".into()))).unwrap_err();
        assert_eq!(err.to_string(), "Invalid from date, expected YYYY-MM-DD");

        let err = report_filters(&query(|q| {
            q.from = Some("2024-05-02".into());
            q.to = Some("2024-05-01".into());
        }))
        .unwrap_err();
        assert_eq!(err.to_string(), "from must not be after to");

        assert!(report_filters(&query(|q| q.statuses = Some("WON".into()))).is_err());
    }

    #[test]
    fn test_status_label() {
        assert_eq!(status_label("CLOSED_WON"), "Closed Won");
        assert_eq!(status_label("NEW"), "New");
    }

    #[test]
    fn test_funnel_follows_pipeline_order() {
        let mut stages = vec![
            stage("CLOSED_WON", "Instagram"),
            stage("NEW", "Website"),
            stage("QUALIFIED", "Instagram"),
            stage("NEW", "Instagram"),
        ];
        sort_funnel(&mut stages);
        let order: Vec<(&str, &str)> = stages
            .iter()
            .map(|s| (s.status.as_str(), s.lead_source_name.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("NEW", "Instagram"),
                ("NEW", "Website"),
                ("QUALIFIED", "Instagram"),
                ("CLOSED_WON", "Instagram"),
            ]
        );
    }

    #[test]
    fn test_team_summary() {
        let rows = vec![
            team_row(2, "CLOSED_WON", 3),
            team_row(2, "CONTACTED", 5),
            team_row(2, "CLOSED_LOST", 2),
            team_row(9, "NEW", 4),
        ];
        let members = team_summary(&rows);
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].employee_id, 2);
        assert_eq!(members[0].total, 10);
        assert_eq!(members[0].active, 5);
        assert_eq!(members[0].won, 3);
        assert_eq!(members[0].lost, 2);
        assert_eq!(members[0].conversion_rate, 30.0);
        assert_eq!(members[1].conversion_rate, 0.0);
    }

    #[tokio::test]
    async fn test_reports_apply_filters() {
        let Some(storage) = test_storage().await else {
            return;
        };
        let sources = storage.list_lead_sources().await.unwrap();
        let Some(source) = sources.first() else {
            return;
        };
        let lead = storage
            .create_lead(
                &LeadInput {
                    client_name: "Report Couple".into(),
                    client_email: None,
                    client_phone: None,
                    company_id: None,
                    branch_id: None,
                    assigned_to: None,
                    lead_source_id: Some(source.id),
                    estimated_value: Some(120000.0),
                    notes: None,
                },
                None,
            )
            .await
            .unwrap();

        let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
        let filters = report_filters(&query(|q| {
            q.from = Some(today.clone());
            q.to = Some(today.clone());
            q.lead_sources = Some(source.id.to_string());
            q.statuses = Some("UNASSIGNED".into());
        }))
        .unwrap();

        let report = storage.leads_report(&filters).await.unwrap();
        assert!(report.data.iter().any(|l| l.id == lead.id));
        assert!(report.data.iter().all(|l| l.status == "UNASSIGNED"));
        assert_eq!(report.count, report.data.len());

        let by_source = storage.lead_source_report(&filters).await.unwrap();
        assert!(by_source.leads.iter().all(|l| l.lead_source_id == Some(source.id)));
        assert_eq!(by_source.summary.len(), 1);

        let funnel = storage.conversion_funnel(&filters).await.unwrap();
        assert!(funnel.iter().all(|s| s.status == "UNASSIGNED"));

        let trends = storage.lead_trends(&filters).await.unwrap();
        assert!(trends.iter().all(|t| t.date == Utc::now().date_naive()));

        // A window ending yesterday excludes the lead.
        let yesterday = (Utc::now().date_naive() - Days::new(1)).format("%Y-%m-%d").to_string();
        let before = report_filters(&query(|q| q.to = Some(yesterday))).unwrap();
        let report = storage.leads_report(&before).await.unwrap();
        assert!(report.data.iter().all(|l| l.id != lead.id));

        let options = storage.report_filter_options().await.unwrap();
        assert_eq!(options.statuses.len(), LeadStatus::ALL.len());
        assert!(options.lead_sources.iter().any(|s| s.id == source.id));

        let quotations = storage.quotations_report(&ReportFilters::default()).await.unwrap();
        assert_eq!(quotations.count, quotations.data.len());
    }
}
