//! HTTP API server: router, middleware, background maintenance and the
//! Prometheus listener.

pub mod handlers;
pub mod metrics_http;
mod middleware;
pub mod state;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tokio::net::TcpListener;

use handlers::{
    access, auth, leads, notifications, org, partners, quotations, reports, system, tasks,
};
use middleware::{admission_middleware, metrics_middleware};
pub use state::{AppState, ServiceMetrics};

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(3600);

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(system::health))
        // Auth
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        // Organization
        .route("/api/companies", get(org::list_companies).post(org::create_company))
        .route("/api/companies/stats", get(org::company_stats))
        .route(
            "/api/companies/:id",
            get(org::get_company).put(org::update_company).delete(org::delete_company),
        )
        .route("/api/companies/:id/branches", get(org::company_branches))
        .route("/api/branches", get(org::list_branches).post(org::create_branch))
        .route("/api/branches/:id", put(org::update_branch).delete(org::delete_branch))
        .route("/api/departments", get(org::list_departments).post(org::create_department))
        .route("/api/designations", get(org::list_designations).post(org::create_designation))
        .route("/api/employees", get(org::list_employees).post(org::create_employee))
        .route(
            "/api/employees/:id",
            get(org::get_employee).put(org::update_employee).delete(org::delete_employee),
        )
        .route(
            "/api/employees/:id/companies",
            get(org::list_employee_companies).post(org::add_employee_company),
        )
        .route("/api/employees/:id/primary-company", post(org::set_primary_company))
        .route(
            "/api/employee-companies/:id",
            put(org::update_employee_company).delete(org::delete_employee_company),
        )
        // Vendors and suppliers
        .route("/api/vendors", get(partners::list_vendors).post(partners::create_vendor))
        .route("/api/vendors/stats", get(partners::vendor_stats))
        .route("/api/vendors/categories", get(partners::vendor_categories))
        .route(
            "/api/vendors/:id",
            get(partners::get_vendor).put(partners::update_vendor).delete(partners::delete_vendor),
        )
        .route("/api/suppliers", get(partners::list_suppliers).post(partners::create_supplier))
        .route("/api/suppliers/stats", get(partners::supplier_stats))
        .route(
            "/api/suppliers/:id",
            get(partners::get_supplier).put(partners::update_supplier).delete(partners::delete_supplier),
        )
        // Roles, menu and accounts
        .route("/api/roles", get(access::list_roles).post(access::create_role))
        .route(
            "/api/roles/:id",
            get(access::get_role).put(access::update_role).delete(access::delete_role),
        )
        .route(
            "/api/roles/:id/permissions",
            get(access::get_role_permissions).put(access::update_role_permissions),
        )
        .route("/api/menu", get(access::menu))
        .route("/api/menu/changes", get(access::menu_changes))
        .route("/api/menu/tracking", post(access::update_menu_tracking))
        .route("/api/accounts", get(access::list_accounts).post(access::create_account))
        .route("/api/accounts/available-employees", get(access::available_employees))
        .route("/api/accounts/:id/active", put(access::set_account_active))
        .route("/api/accounts/:id/password", put(access::reset_password))
        // Leads and follow-ups
        .route("/api/leads", get(leads::list_leads).post(leads::create_lead))
        .route("/api/leads/analytics", get(leads::lead_analytics))
        .route("/api/leads/bulk-reassign", post(leads::bulk_reassign_leads))
        .route("/api/leads/workload/:employee_id", get(leads::employee_workload))
        .route("/api/leads/:id", get(leads::get_lead))
        .route("/api/leads/:id/status", put(leads::update_lead_status))
        .route("/api/leads/:id/assign", post(leads::assign_lead))
        .route("/api/leads/:id/reassign", post(leads::reassign_lead))
        .route("/api/lead-sources", get(leads::lead_sources))
        .route("/api/followups", get(leads::list_followups).post(leads::create_followup))
        .route("/api/followups/upcoming", get(leads::upcoming_followups))
        .route("/api/followups/stats", get(leads::followup_stats))
        .route("/api/followups/migrate", post(leads::migrate_followups))
        .route("/api/followups/:id", get(leads::get_followup).delete(leads::delete_followup))
        .route("/api/followups/:id/status", put(leads::update_followup_status))
        // Catalogue and quotations
        .route("/api/services", get(quotations::list_services).post(quotations::create_service))
        .route(
            "/api/services/:id",
            put(quotations::update_service).delete(quotations::delete_service),
        )
        .route(
            "/api/deliverables",
            get(quotations::list_deliverables).post(quotations::create_deliverable),
        )
        .route(
            "/api/deliverables/:id",
            put(quotations::update_deliverable).delete(quotations::delete_deliverable),
        )
        .route(
            "/api/quotations",
            get(quotations::list_quotations).post(quotations::create_quotation),
        )
        .route("/api/quotations/recalculate", post(quotations::recalculate_totals))
        .route("/api/quotations/analytics", get(quotations::quotation_analytics))
        .route("/api/quotations/pending-approvals", get(quotations::pending_approvals))
        .route("/api/quotations/pending-confirmations", get(quotations::pending_confirmations))
        .route("/api/quotations/workflow-analytics", get(quotations::workflow_analytics))
        .route("/api/quotations/slug/:slug", get(quotations::get_quotation_by_slug))
        .route("/api/quotations/:id", get(quotations::get_quotation))
        .route("/api/quotations/:id/status", put(quotations::update_quotation_status))
        .route("/api/quotations/:id/submit", post(quotations::submit_for_approval))
        .route("/api/quotations/:id/approve", post(quotations::approve))
        .route("/api/quotations/:id/reject", post(quotations::reject))
        .route("/api/quotations/:id/client-confirmation", post(quotations::client_confirmation))
        .route("/api/quotations/:id/payment", post(quotations::payment))
        .route("/api/quotations/:id/confirm", post(quotations::confirm))
        .route("/api/quotations/:id/cancel", post(quotations::cancel))
        // Tasks and calls
        .route("/api/tasks", get(tasks::list_tasks))
        .route("/api/tasks/generate", post(tasks::generate_tasks))
        .route("/api/tasks/analytics", get(tasks::task_analytics))
        .route("/api/tasks/:id/status", put(tasks::update_task_status))
        .route("/api/calls/transcriptions", post(tasks::ingest_transcription))
        .route("/api/calls/summary", get(tasks::call_summary))
        .route("/api/calls/:call_id", get(tasks::get_call))
        // Notifications
        .route(
            "/api/notifications",
            get(notifications::list_notifications).post(notifications::create_notification),
        )
        .route("/api/notifications/read-all", put(notifications::mark_all_read))
        .route("/api/notifications/expired", delete(notifications::cleanup_expired))
        .route("/api/notifications/:id/read", put(notifications::mark_read))
        // Reports
        .route("/api/reports/filter-options", get(reports::filter_options))
        .route("/api/reports/lead-sources", get(reports::lead_sources))
        .route("/api/reports/conversion-funnel", get(reports::conversion_funnel))
        .route("/api/reports/team-performance", get(reports::team_performance))
        .route("/api/reports/trends", get(reports::trends))
        .route("/api/reports/leads", get(reports::leads))
        .route("/api/reports/quotations", get(reports::quotations))
        // Dashboard, chat, activities
        .route("/api/dashboard/stats", get(system::dashboard_stats))
        .route("/api/chat", post(system::chat))
        .route("/api/activities", get(system::activities))
        .layer(from_fn_with_state(state.clone(), admission_middleware))
        .layer(from_fn_with_state(state.clone(), metrics_middleware))
        .with_state(state)
}

/// Periodic housekeeping: overdue quotation reminders, expired notifications,
/// stale rate-limit windows.
async fn run_maintenance(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }

        match state.storage.notify_overdue_quotations().await {
            Ok(0) => {}
            Ok(n) => tracing::info!(count = n, "Overdue quotation reminders sent"),
            Err(e) => tracing::warn!("Overdue quotation check failed: {}", e),
        }
        match state.storage.cleanup_expired_notifications().await {
            Ok(0) => {}
            Ok(n) => tracing::info!(count = n, "Expired notifications removed"),
            Err(e) => tracing::warn!("Notification cleanup failed: {}", e),
        }
        let now = Instant::now();
        let pruned = state.rate_limiter.prune(now) + state.notification_limiter.prune(now);
        tracing::debug!(pruned, "Rate limit windows pruned");
    }
}

/// Serve the API until the shutdown token fires, then drain in-flight requests.
pub async fn run_server(state: Arc<AppState>) -> anyhow::Result<()> {
    let bind = state.config.server.bind.clone();
    let listener = TcpListener::bind(&bind).await?;
    tracing::info!("API listening on http://{}", bind);

    tokio::spawn(metrics_http::serve_metrics(
        state.config.server.metrics_bind.clone(),
        state.metrics.clone(),
        state.shutdown.clone(),
    ));
    tokio::spawn(run_maintenance(state.clone()));

    let shutdown = state.shutdown.clone();
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("API server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{issue_token, Session};
    use crate::config::CrmConfig;
    use crate::storage::postgres::unreachable_storage;
    use tokio_util::sync::CancellationToken;

    fn test_state(config: CrmConfig) -> Arc<AppState> {
        let mut config = config;
        config.llm.enabled = false;
        Arc::new(AppState::new(config, unreachable_storage(), CancellationToken::new()).unwrap())
    }

    async fn spawn(state: Arc<AppState>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn admin_token(state: &AppState) -> String {
        let session = Session {
            account_id: 1,
            employee_id: 1,
            username: "admin".into(),
            role_id: 1,
            role_title: "Administrator".into(),
            is_admin: true,
        };
        issue_token(&session, state.jwt_secret(), 1).unwrap()
    }

    #[tokio::test]
    async fn test_protected_routes_require_session() {
        let base = spawn(test_state(CrmConfig::default())).await;
        let resp = reqwest::get(format!("{}/api/leads", base)).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Authentication required");
    }

    #[tokio::test]
    async fn test_me_returns_session_from_bearer_token() {
        let state = test_state(CrmConfig::default());
        let token = admin_token(&state);
        let base = spawn(state).await;

        let body: serde_json::Value = reqwest::Client::new()
            .get(format!("{}/api/auth/me", base))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["username"], "admin");
        assert_eq!(body["data"]["is_admin"], true);
    }

    #[tokio::test]
    async fn test_bad_json_is_validation_error() {
        let state = test_state(CrmConfig::default());
        let token = admin_token(&state);
        let base = spawn(state.clone()).await;

        let resp = reqwest::Client::new()
            .post(format!("{}/api/chat", base))
            .bearer_auth(&token)
            .header("content-type", "application/json")
            .body("{\"question\":\"hi\"}")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let snap = state.metrics.snapshot();
        assert_eq!(snap["errors"]["validation"], 1);
    }

    #[tokio::test]
    async fn test_chat_without_model_apologises() {
        let state = test_state(CrmConfig::default());
        let token = admin_token(&state);
        let base = spawn(state).await;

        let body: serde_json::Value = reqwest::Client::new()
            .post(format!("{}/api/chat", base))
            .bearer_auth(&token)
            .json(&serde_json::json!({ "query": "How are leads doing?" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["confidence"], 0.0);
    }

    #[tokio::test]
    async fn test_report_filters_validated_before_query() {
        let state = test_state(CrmConfig::default());
        let token = admin_token(&state);
        let base = spawn(state).await;

        let resp = reqwest::Client::new()
            .get(format!("{}/api/reports/leads?employees=3,seven", base))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "Invalid employee id: seven");

        let resp = reqwest::get(format!("{}/api/reports/filter-options", base))
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_vendor_input_validated_before_query() {
        let state = test_state(CrmConfig::default());
        let token = admin_token(&state);
        let base = spawn(state).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{}/api/vendors", base))
            .bearer_auth(&token)
            .json(&serde_json::json!({ "name": "  ", "category": "decor" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "Vendor name is required");

        let resp = client
            .put(format!("{}/api/suppliers/4", base))
            .bearer_auth(&token)
            .json(&serde_json::json!({ "supplier_code": "SUP-1", "name": "Print House", "status": "archived" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "Invalid status: archived");
    }

    #[tokio::test]
    async fn test_health_reports_unreachable_database() {
        let base = spawn(test_state(CrmConfig::default())).await;
        let resp = reqwest::get(format!("{}/api/health", base)).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["data"]["status"], "unhealthy");
        assert_eq!(body["data"]["llm"]["enabled"], false);
    }

    #[tokio::test]
    async fn test_rate_limit_per_client() {
        let mut config = CrmConfig::default();
        config.server.rate_limit_per_minute = 2;
        let base = spawn(test_state(config)).await;
        let client = reqwest::Client::new();

        let mut statuses = Vec::new();
        for _ in 0..3 {
            let resp = client
                .get(format!("{}/api/auth/me", base))
                .header("x-forwarded-for", "203.0.113.9")
                .send()
                .await
                .unwrap();
            statuses.push(resp.status());
        }
        assert_eq!(statuses[0], reqwest::StatusCode::UNAUTHORIZED);
        assert_eq!(statuses[2], reqwest::StatusCode::TOO_MANY_REQUESTS);

        let other = client
            .get(format!("{}/api/auth/me", base))
            .header("x-forwarded-for", "198.51.100.4")
            .send()
            .await
            .unwrap();
        assert_eq!(other.status(), reqwest::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_clears_cookie() {
        let base = spawn(test_state(CrmConfig::default())).await;
        let resp = reqwest::Client::new()
            .post(format!("{}/api/auth/logout", base))
            .send()
            .await
            .unwrap();
        let cookie = resp.headers()["set-cookie"].to_str().unwrap().to_string();
        assert!(cookie.starts_with("auth_token=;"));
        assert!(cookie.contains("Max-Age=0"));
    }
}
