use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ADMIN_ROLE_ID: i64 = 1;
pub const ADMIN_ROLE_TITLE: &str = "Administrator";
pub const SALES_HEAD_ROLE: &str = "Sales Head";
pub const SALES_REP_ROLE: &str = "Sales Representative";
pub const CONFIRMATION_ROLE: &str = "Confirmation Team";

pub fn is_admin_role(role_id: Option<i64>, role_title: Option<&str>) -> bool {
    role_title == Some(ADMIN_ROLE_TITLE) || role_id == Some(ADMIN_ROLE_ID)
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Role {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub user_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleInput {
    pub title: String,
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MenuItem {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    pub path: Option<String>,
    pub icon: Option<String>,
    pub is_visible: bool,
    pub sort_order: i32,
}

/// Flags a role holds on one menu item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionFlags {
    pub can_view: bool,
    pub can_add: bool,
    pub can_edit: bool,
    pub can_delete: bool,
}

/// A menu item together with the role's flags on it. Missing permission rows read as all false.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RoleMenuPermission {
    pub menu_item_id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    pub path: Option<String>,
    pub sort_order: i32,
    pub can_view: bool,
    pub can_add: bool,
    pub can_edit: bool,
    pub can_delete: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PermissionUpdate {
    pub menu_item_id: i64,
    #[serde(default)]
    pub can_view: bool,
    #[serde(default)]
    pub can_add: bool,
    #[serde(default)]
    pub can_edit: bool,
    #[serde(default)]
    pub can_delete: bool,
}

/// Account joined with employee and role, as listed by the admin screens.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserAccount {
    pub id: i64,
    pub employee_id: i64,
    pub role_id: i64,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub employee_name: Option<String>,
    pub role_title: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Row used by login: includes the hash, never serialized.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LoginRecord {
    pub id: i64,
    pub employee_id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub role_id: i64,
    pub role_title: Option<String>,
    pub employee_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAccountInput {
    pub employee_id: i64,
    pub role_id: i64,
    pub password: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AvailableEmployee {
    pub id: i64,
    pub employee_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// Snapshot of a menu item kept for change detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MenuItemState {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    pub path: Option<String>,
    pub icon: Option<String>,
    pub is_visible: bool,
    pub sort_order: i32,
}

impl From<&MenuItem> for MenuItemState {
    fn from(item: &MenuItem) -> Self {
        Self {
            id: item.id,
            parent_id: item.parent_id,
            name: item.name.clone(),
            path: item.path.clone(),
            icon: item.icon.clone(),
            is_visible: item.is_visible,
            sort_order: item.sort_order,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackedMenuItem {
    pub menu_item_id: i64,
    pub state: MenuItemState,
    pub state_hash: String,
}
