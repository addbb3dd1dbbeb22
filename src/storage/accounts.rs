//! User accounts: creation from employees, activation, password resets and login lookups.

use super::PgStorage;
use crate::auth::{self, MIN_PASSWORD_LEN};
use crate::error::{CrmError, Result};
use crate::models::{
    AvailableEmployee, CreateAccountInput, LoginRecord, NewActivity, UserAccount, ADMIN_ROLE_ID,
};

const ACCOUNT_SELECT: &str = r#"
    SELECT a.id, a.employee_id, a.role_id, a.username, a.email, a.is_active, a.last_login,
           NULLIF(TRIM(CONCAT(e.first_name, ' ', e.last_name)), '') AS employee_name,
           r.title AS role_title, a.created_at
    FROM user_accounts a
    LEFT JOIN employees e ON e.id = a.employee_id
    LEFT JOIN roles r ON r.id = a.role_id
"#;

/// Username derived from the email's local part, else `user_{employee_id}`.
pub(crate) fn default_username(email: &str, employee_id: i64) -> String {
    let local = email.split('@').next().unwrap_or("").trim();
    if local.is_empty() {
        format!("user_{}", employee_id)
    } else {
        local.to_lowercase()
    }
}

impl PgStorage {
    pub async fn list_accounts(&self) -> Result<Vec<UserAccount>> {
        let sql = format!("{} ORDER BY a.username", ACCOUNT_SELECT);
        let rows = self
            .timed(sqlx::query_as::<_, UserAccount>(&sql).fetch_all(&self.pool))
            .await?;
        Ok(rows)
    }

    pub async fn get_account(&self, id: i64) -> Result<UserAccount> {
        let sql = format!("{} WHERE a.id = $1", ACCOUNT_SELECT);
        self.timed(sqlx::query_as::<_, UserAccount>(&sql).bind(id).fetch_optional(&self.pool))
            .await?
            .ok_or_else(|| CrmError::not_found("Account not found"))
    }

    /// Active employees with an email address and no account yet.
    pub async fn available_employees(&self) -> Result<Vec<AvailableEmployee>> {
        let rows = self
            .timed(
                sqlx::query_as::<_, AvailableEmployee>(
                    r#"
                    SELECT e.id, e.employee_id, e.first_name, e.last_name, e.email
                    FROM employees e
                    LEFT JOIN user_accounts a ON a.employee_id = e.id
                    WHERE e.status = 'active'
                      AND e.email IS NOT NULL AND e.email <> ''
                      AND a.id IS NULL
                    ORDER BY e.first_name, e.last_name
                    "#,
                )
                .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows)
    }

    pub async fn create_account(
        &self,
        input: &CreateAccountInput,
        actor: Option<(i64, &str)>,
    ) -> Result<UserAccount> {
        let employee = self
            .find_employee(input.employee_id)
            .await?
            .ok_or_else(|| CrmError::not_found("Employee not found"))?;

        let email = employee
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| CrmError::validation("Employee does not have an email address"))?
            .to_string();

        let has_account: bool = self
            .timed(
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM user_accounts WHERE employee_id = $1)")
                    .bind(input.employee_id)
                    .fetch_one(&self.pool),
            )
            .await?;
        if has_account {
            return Err(CrmError::Conflict("Employee already has an account".into()));
        }

        let role_exists: bool = self
            .timed(
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM roles WHERE id = $1)")
                    .bind(input.role_id)
                    .fetch_one(&self.pool),
            )
            .await?;
        if !role_exists {
            return Err(CrmError::not_found("Role not found"));
        }

        auth::validate_password(&input.password)?;

        let username = input
            .username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| default_username(&email, employee.id));

        let password_hash = auth::hash_password(&input.password).await?;

        let id: i64 = self
            .timed(
                sqlx::query_scalar(
                    r#"
                    INSERT INTO user_accounts (employee_id, role_id, username, email, password_hash, is_active)
                    VALUES ($1, $2, $3, $4, $5, true)
                    RETURNING id
                    "#,
                )
                .bind(employee.id)
                .bind(input.role_id)
                .bind(&username)
                .bind(&email)
                .bind(&password_hash)
                .fetch_one(&self.pool),
            )
            .await?;

        let (actor_id, actor_name) = actor.unwrap_or((0, "system"));
        self.log_activity(NewActivity {
            user_id: (actor_id > 0).then_some(actor_id),
            user_name: actor_name.to_string(),
            action_type: "CREATE",
            entity_type: "user_account",
            entity_id: id.to_string(),
            description: format!("Created account {} for {}", username, employee.full_name()),
        })
        .await;

        tracing::info!(account_id = id, username = %username, "User account created");
        self.get_account(id).await
    }

    /// Administrator account for first-run setup. `email` fills in the
    /// employee's address when given.
    pub async fn bootstrap_admin(
        &self,
        employee_id: i64,
        email: Option<&str>,
        username: &str,
        password: &str,
    ) -> Result<UserAccount> {
        if let Some(email) = email.map(str::trim).filter(|e| !e.is_empty()) {
            if !email.contains('@') {
                return Err(CrmError::validation("Invalid email address"));
            }
            let updated = self
                .timed(
                    sqlx::query("UPDATE employees SET email = $2, updated_at = now() WHERE id = $1")
                        .bind(employee_id)
                        .bind(email)
                        .execute(&self.pool),
                )
                .await?
                .rows_affected();
            if updated == 0 {
                return Err(CrmError::not_found("Employee not found"));
            }
        }

        self.create_account(
            &CreateAccountInput {
                employee_id,
                role_id: ADMIN_ROLE_ID,
                password: password.to_string(),
                username: Some(username.to_string()),
            },
            None,
        )
        .await
    }

    pub async fn set_account_active(&self, id: i64, is_active: bool) -> Result<UserAccount> {
        let updated = self
            .timed(
                sqlx::query("UPDATE user_accounts SET is_active = $2, updated_at = now() WHERE id = $1")
                    .bind(id)
                    .bind(is_active)
                    .execute(&self.pool),
            )
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(CrmError::not_found("Account not found"));
        }
        self.get_account(id).await
    }

    pub async fn reset_password(&self, id: i64, password: &str) -> Result<()> {
        auth::validate_password(password)?;
        let hash = auth::hash_password(password).await?;
        let updated = self
            .timed(
                sqlx::query("UPDATE user_accounts SET password_hash = $2, updated_at = now() WHERE id = $1")
                    .bind(id)
                    .bind(&hash)
                    .execute(&self.pool),
            )
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(CrmError::not_found("Account not found"));
        }
        Ok(())
    }

    /// Login lookup by username, or by email when the identifier contains `@`.
    pub async fn find_login(&self, identifier: &str) -> Result<Option<LoginRecord>> {
        let column = if identifier.contains('@') {
            "LOWER(a.email)"
        } else {
            "LOWER(a.username)"
        };
        let sql = format!(
            r#"
            SELECT a.id, a.employee_id, a.username, a.email, a.password_hash, a.is_active,
                   a.role_id, r.title AS role_title,
                   NULLIF(TRIM(CONCAT(e.first_name, ' ', e.last_name)), '') AS employee_name
            FROM user_accounts a
            LEFT JOIN roles r ON r.id = a.role_id
            LEFT JOIN employees e ON e.id = a.employee_id
            WHERE {} = LOWER($1)
            "#,
            column
        );
        let row = self
            .timed(
                sqlx::query_as::<_, LoginRecord>(&sql)
                    .bind(identifier.trim())
                    .fetch_optional(&self.pool),
            )
            .await?;
        Ok(row)
    }

    pub async fn record_login(&self, account_id: i64) -> Result<()> {
        self.timed(
            sqlx::query("UPDATE user_accounts SET last_login = now() WHERE id = $1")
                .bind(account_id)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmployeeInput;
    use crate::storage::postgres::test_storage;

    #[test]
    fn test_default_username() {
        assert_eq!(default_username("Priya.S@ooak.in", 4), "priya.s");
        assert_eq!(default_username("@ooak.in", 4), "user_4");
        assert_eq!(default_username("", 9), "user_9");
    }

    #[test]
    fn test_min_password_len() {
        assert_eq!(MIN_PASSWORD_LEN, 8);
    }

    async fn employee_with_email(storage: &PgStorage, email: Option<String>) -> i64 {
        storage
            .create_employee(&EmployeeInput {
                first_name: "Test".into(),
                last_name: "User".into(),
                email,
                phone: None,
                job_title: None,
                department_id: None,
                designation_id: None,
                home_branch_id: None,
                primary_company_id: None,
                role_id: Some(3),
                status: "active".into(),
                hire_date: None,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_account_creation_rules() {
        let Some(storage) = test_storage().await else {
            return;
        };
        let tag = uuid::Uuid::new_v4().simple().to_string();

        let no_email = employee_with_email(&storage, None).await;
        let err = storage
            .create_account(
                &CreateAccountInput {
                    employee_id: no_email,
                    role_id: 3,
                    password: "longenough".into(),
                    username: None,
                },
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Employee does not have an email address");

        let employee = employee_with_email(&storage, Some(format!("{}@ooak.in", tag))).await;
        let input = CreateAccountInput {
            employee_id: employee,
            role_id: 3,
            password: "longenough".into(),
            username: None,
        };
        let account = storage.create_account(&input, None).await.unwrap();
        assert_eq!(account.username, tag);
        assert!(account.is_active);

        let err = storage.create_account(&input, None).await.unwrap_err();
        assert_eq!(err.to_string(), "Employee already has an account");

        let toggled = storage.set_account_active(account.id, false).await.unwrap();
        assert!(!toggled.is_active);
        let reloaded = storage.get_account(account.id).await.unwrap();
        assert!(!reloaded.is_active);

        storage.delete_employee(employee).await.unwrap();
        storage.delete_employee(no_email).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let Some(storage) = test_storage().await else {
            return;
        };
        let tag = uuid::Uuid::new_v4().simple().to_string();
        let first = employee_with_email(&storage, Some(format!("a{}@ooak.in", tag))).await;
        let second = employee_with_email(&storage, Some(format!("b{}@ooak.in", tag))).await;

        let username = format!("dup{}", &tag[..8]);
        storage
            .create_account(
                &CreateAccountInput {
                    employee_id: first,
                    role_id: 3,
                    password: "longenough".into(),
                    username: Some(username.clone()),
                },
                None,
            )
            .await
            .unwrap();
        let err = storage
            .create_account(
                &CreateAccountInput {
                    employee_id: second,
                    role_id: 3,
                    password: "longenough".into(),
                    username: Some(username),
                },
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);

        storage.delete_employee(first).await.unwrap();
        storage.delete_employee(second).await.unwrap();
    }
}
