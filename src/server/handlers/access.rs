//! Roles, menu permissions and user accounts. Writes are administrator-only.

use std::sync::Arc;

use axum::extract::State;
use serde::{Deserialize, Serialize};

use super::common::{audit, ok, require_admin, ApiJson, ApiPath, ApiResponse};
use crate::auth::Session;
use crate::crm::menu::{MenuChanges, MenuNode};
use crate::models::{
    AvailableEmployee, CreateAccountInput, PermissionUpdate, Role, RoleInput, RoleMenuPermission,
    UserAccount,
};
use crate::server::state::AppState;

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

pub async fn list_roles(
    State(state): State<Arc<AppState>>,
    _session: Session,
) -> ApiResponse<Vec<Role>> {
    ok(state.storage.list_roles().await?)
}

pub async fn get_role(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiPath(id): ApiPath<i64>,
) -> ApiResponse<Role> {
    ok(state.storage.get_role(id).await?)
}

pub async fn create_role(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiJson(input): ApiJson<RoleInput>,
) -> ApiResponse<Role> {
    require_admin(&session)?;
    let role = state.storage.create_role(&input).await?;
    audit(&state, &session, "CREATE", "role", role.id, format!("Created role {}", role.title)).await;
    ok(role)
}

pub async fn update_role(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<RoleInput>,
) -> ApiResponse<Role> {
    require_admin(&session)?;
    let role = state.storage.update_role(id, &input).await?;
    audit(&state, &session, "UPDATE", "role", id, format!("Updated role {}", role.title)).await;
    ok(role)
}

pub async fn delete_role(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
) -> ApiResponse<&'static str> {
    require_admin(&session)?;
    state.storage.delete_role(id).await?;
    audit(&state, &session, "DELETE", "role", id, format!("Deleted role {}", id)).await;
    ok("Role deleted")
}

pub async fn get_role_permissions(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiPath(role_id): ApiPath<i64>,
) -> ApiResponse<Vec<RoleMenuPermission>> {
    ok(state.storage.get_role_permissions(role_id).await?)
}

#[derive(Debug, Deserialize)]
pub struct PermissionsRequest {
    pub permissions: Vec<PermissionUpdate>,
}

#[derive(Debug, Serialize)]
pub struct PermissionsUpdated {
    pub updated: usize,
}

pub async fn update_role_permissions(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(role_id): ApiPath<i64>,
    ApiJson(request): ApiJson<PermissionsRequest>,
) -> ApiResponse<PermissionsUpdated> {
    require_admin(&session)?;
    let updated = state
        .storage
        .update_role_permissions(role_id, &request.permissions)
        .await?;
    audit(
        &state,
        &session,
        "UPDATE",
        "role_permissions",
        role_id,
        format!("Replaced {} menu permissions", updated),
    )
    .await;
    ok(PermissionsUpdated { updated })
}

// ---------------------------------------------------------------------------
// Menu
// ---------------------------------------------------------------------------

pub async fn menu(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> ApiResponse<Vec<MenuNode>> {
    ok(state
        .storage
        .menu_for_role(session.role_id, session.is_admin)
        .await?)
}

pub async fn menu_changes(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> ApiResponse<MenuChanges> {
    require_admin(&session)?;
    ok(state.storage.menu_changes().await?)
}

#[derive(Debug, Serialize)]
pub struct TrackingUpdated {
    pub tracked: usize,
}

pub async fn update_menu_tracking(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> ApiResponse<TrackingUpdated> {
    require_admin(&session)?;
    let tracked = state.storage.update_menu_tracking().await?;
    ok(TrackingUpdated { tracked })
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> ApiResponse<Vec<UserAccount>> {
    require_admin(&session)?;
    ok(state.storage.list_accounts().await?)
}

pub async fn available_employees(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> ApiResponse<Vec<AvailableEmployee>> {
    require_admin(&session)?;
    ok(state.storage.available_employees().await?)
}

pub async fn create_account(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiJson(input): ApiJson<CreateAccountInput>,
) -> ApiResponse<UserAccount> {
    require_admin(&session)?;
    ok(state
        .storage
        .create_account(&input, Some(session.actor()))
        .await?)
}

#[derive(Debug, Deserialize)]
pub struct ActiveRequest {
    pub is_active: bool,
}

pub async fn set_account_active(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
    ApiJson(request): ApiJson<ActiveRequest>,
) -> ApiResponse<UserAccount> {
    require_admin(&session)?;
    let account = state.storage.set_account_active(id, request.is_active).await?;
    let verb = if request.is_active { "Activated" } else { "Deactivated" };
    audit(&state, &session, "UPDATE", "user_account", id, format!("{} account {}", verb, account.username)).await;
    ok(account)
}

#[derive(Debug, Deserialize)]
pub struct PasswordRequest {
    pub password: String,
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
    ApiJson(request): ApiJson<PasswordRequest>,
) -> ApiResponse<&'static str> {
    require_admin(&session)?;
    state.storage.reset_password(id, &request.password).await?;
    audit(&state, &session, "UPDATE", "user_account", id, "Password reset".to_string()).await;
    ok("Password updated")
}
