//! Roles, role menu permissions, menu items and menu change tracking.

use std::collections::HashMap;

use sqlx::Row;

use super::PgStorage;
use crate::crm::menu::{self, MenuChanges, MenuNode};
use crate::error::{CrmError, Result};
use crate::models::{
    MenuItem, MenuItemState, PermissionFlags, PermissionUpdate, Role, RoleInput,
    RoleMenuPermission, TrackedMenuItem,
};

const ROLE_SELECT: &str = r#"
    SELECT r.id, r.title, r.description, r.is_active,
           (SELECT COUNT(*) FROM (
                SELECT e.id FROM employees e WHERE e.role_id = r.id AND e.status = 'active'
                UNION
                SELECT a.employee_id FROM user_accounts a WHERE a.role_id = r.id AND a.is_active
            ) holders) AS user_count,
           r.created_at, r.updated_at
    FROM roles r
"#;

impl PgStorage {
    // -----------------------------------------------------------------------
    // Roles
    // -----------------------------------------------------------------------

    pub async fn list_roles(&self) -> Result<Vec<Role>> {
        let sql = format!("{} ORDER BY r.id", ROLE_SELECT);
        let rows = self
            .timed(sqlx::query_as::<_, Role>(&sql).fetch_all(&self.pool))
            .await?;
        Ok(rows)
    }

    pub async fn get_role(&self, id: i64) -> Result<Role> {
        let sql = format!("{} WHERE r.id = $1", ROLE_SELECT);
        self.timed(sqlx::query_as::<_, Role>(&sql).bind(id).fetch_optional(&self.pool))
            .await?
            .ok_or_else(|| CrmError::not_found("Role not found"))
    }

    async fn role_title_taken(&self, title: &str, except_id: Option<i64>) -> Result<bool> {
        let taken: bool = self
            .timed(
                sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM roles WHERE LOWER(title) = LOWER($1) AND ($2::BIGINT IS NULL OR id <> $2))",
                )
                .bind(title.trim())
                .bind(except_id)
                .fetch_one(&self.pool),
            )
            .await?;
        Ok(taken)
    }

    /// New roles start with view access on the first top-level menu item.
    pub async fn create_role(&self, input: &RoleInput) -> Result<Role> {
        if input.title.trim().is_empty() {
            return Err(CrmError::validation("Role title is required"));
        }
        if self.role_title_taken(&input.title, None).await? {
            return Err(CrmError::Conflict("Role title already exists".into()));
        }

        let mut tx = self.begin().await?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO roles (title, description, is_active) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(input.title.trim())
        .bind(&input.description)
        .bind(input.is_active)
        .fetch_one(&mut *tx)
        .await?;

        let first_menu: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM menu_items WHERE parent_id IS NULL ORDER BY sort_order, id LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(menu_item_id) = first_menu {
            sqlx::query(
                r#"
                INSERT INTO role_menu_permissions (role_id, menu_item_id, can_view, can_add, can_edit, can_delete)
                VALUES ($1, $2, true, false, false, false)
                "#,
            )
            .bind(id)
            .bind(menu_item_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::info!(role_id = id, title = %input.title.trim(), "Role created");
        self.get_role(id).await
    }

    pub async fn update_role(&self, id: i64, input: &RoleInput) -> Result<Role> {
        if input.title.trim().is_empty() {
            return Err(CrmError::validation("Role title is required"));
        }
        if self.role_title_taken(&input.title, Some(id)).await? {
            return Err(CrmError::Conflict("Role title already exists".into()));
        }
        let updated = self
            .timed(
                sqlx::query(
                    "UPDATE roles SET title = $2, description = $3, is_active = $4, updated_at = now() WHERE id = $1",
                )
                .bind(id)
                .bind(input.title.trim())
                .bind(&input.description)
                .bind(input.is_active)
                .execute(&self.pool),
            )
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(CrmError::not_found("Role not found"));
        }
        self.get_role(id).await
    }

    /// Refused while active employees or accounts hold the role. An employee
    /// holding it through both is counted once.
    pub async fn delete_role(&self, id: i64) -> Result<()> {
        let mut tx = self.begin().await?;
        let sql = format!("{} WHERE r.id = $1 FOR UPDATE OF r", ROLE_SELECT);
        let role = sqlx::query_as::<_, Role>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CrmError::not_found("Role not found"))?;
        if role.user_count > 0 {
            return Err(CrmError::Conflict(format!(
                "Cannot delete role. It has {} active users assigned.",
                role.user_count
            )));
        }

        sqlx::query("DELETE FROM role_menu_permissions WHERE role_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(role_id = id, "Role deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Permissions
    // -----------------------------------------------------------------------

    /// Every menu item with the role's flags. Items without a row read as all false.
    pub async fn get_role_permissions(&self, role_id: i64) -> Result<Vec<RoleMenuPermission>> {
        let rows = self
            .timed(
                sqlx::query_as::<_, RoleMenuPermission>(
                    r#"
                    SELECT m.id AS menu_item_id, m.parent_id, m.name, m.path, m.sort_order,
                           COALESCE(p.can_view, false) AS can_view,
                           COALESCE(p.can_add, false) AS can_add,
                           COALESCE(p.can_edit, false) AS can_edit,
                           COALESCE(p.can_delete, false) AS can_delete
                    FROM menu_items m
                    LEFT JOIN role_menu_permissions p ON p.menu_item_id = m.id AND p.role_id = $1
                    ORDER BY m.sort_order, m.id
                    "#,
                )
                .bind(role_id)
                .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows)
    }

    /// Replace all of a role's permission rows in one transaction.
    pub async fn update_role_permissions(
        &self,
        role_id: i64,
        permissions: &[PermissionUpdate],
    ) -> Result<usize> {
        self.get_role(role_id).await?;

        let mut tx = self.begin().await?;
        sqlx::query("DELETE FROM role_menu_permissions WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;

        let mut written = 0;
        for p in permissions
            .iter()
            .filter(|p| p.can_view || p.can_add || p.can_edit || p.can_delete)
        {
            sqlx::query(
                r#"
                INSERT INTO role_menu_permissions (role_id, menu_item_id, can_view, can_add, can_edit, can_delete)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(role_id)
            .bind(p.menu_item_id)
            .bind(p.can_view)
            .bind(p.can_add)
            .bind(p.can_edit)
            .bind(p.can_delete)
            .execute(&mut *tx)
            .await?;
            written += 1;
        }
        tx.commit().await?;

        tracing::info!(role_id, rows = written, "Role permissions replaced");
        Ok(written)
    }

    async fn permission_map(&self, role_id: i64) -> Result<HashMap<i64, PermissionFlags>> {
        let rows = self
            .timed(
                sqlx::query(
                    "SELECT menu_item_id, can_view, can_add, can_edit, can_delete FROM role_menu_permissions WHERE role_id = $1",
                )
                .bind(role_id)
                .fetch_all(&self.pool),
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.get::<i64, _>("menu_item_id"),
                    PermissionFlags {
                        can_view: row.get("can_view"),
                        can_add: row.get("can_add"),
                        can_edit: row.get("can_edit"),
                        can_delete: row.get("can_delete"),
                    },
                )
            })
            .collect())
    }

    // -----------------------------------------------------------------------
    // Menu
    // -----------------------------------------------------------------------

    pub async fn list_menu_items(&self) -> Result<Vec<MenuItem>> {
        let rows = self
            .timed(
                sqlx::query_as::<_, MenuItem>(
                    "SELECT id, parent_id, name, path, icon, is_visible, sort_order FROM menu_items ORDER BY sort_order, id",
                )
                .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows)
    }

    pub async fn menu_for_role(&self, role_id: i64, is_admin: bool) -> Result<Vec<MenuNode>> {
        let items = self.list_menu_items().await?;
        let permissions = if is_admin {
            HashMap::new()
        } else {
            self.permission_map(role_id).await?
        };
        Ok(menu::resolve_menu(&items, &permissions, is_admin))
    }

    async fn tracked_menu_items(&self) -> Result<Vec<TrackedMenuItem>> {
        let rows = self
            .timed(
                sqlx::query("SELECT menu_item_id, last_known_state, state_hash FROM menu_items_tracking")
                    .fetch_all(&self.pool),
            )
            .await?;

        let mut tracked = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: serde_json::Value = row.get("last_known_state");
            match serde_json::from_value::<MenuItemState>(raw) {
                Ok(state) => tracked.push(TrackedMenuItem {
                    menu_item_id: row.get("menu_item_id"),
                    state,
                    state_hash: row.get("state_hash"),
                }),
                Err(e) => tracing::warn!("Skipping unreadable menu snapshot: {}", e),
            }
        }
        Ok(tracked)
    }

    pub async fn menu_changes(&self) -> Result<MenuChanges> {
        let current = self.list_menu_items().await?;
        let tracked = self.tracked_menu_items().await?;
        Ok(menu::detect_changes(&current, &tracked))
    }

    /// Replace every snapshot with the current menu state.
    pub async fn update_menu_tracking(&self) -> Result<usize> {
        let current = self.list_menu_items().await?;

        let mut tx = self.begin().await?;
        sqlx::query("DELETE FROM menu_items_tracking")
            .execute(&mut *tx)
            .await?;
        for item in &current {
            let state = MenuItemState::from(item);
            let hash = menu::fingerprint(&state);
            sqlx::query(
                "INSERT INTO menu_items_tracking (menu_item_id, last_known_state, state_hash) VALUES ($1, $2, $3)",
            )
            .bind(item.id)
            .bind(sqlx::types::Json(&state))
            .bind(&hash)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(current.len())
    }
}
