//! Companies, branches, departments, designations, employees and their company allocations.

use chrono::{Datelike, Utc};
use sqlx::{Postgres, Row, Transaction};

use super::PgStorage;
use crate::error::{CrmError, Result};
use crate::models::{
    Branch, BranchInput, Company, CompanyInput, CompanyStats, Department, Designation, Employee,
    EmployeeCompany, EmployeeCompanyInput, EmployeeInput, EMPLOYEE_STATUSES,
};

const EMPLOYEE_SELECT: &str = r#"
    SELECT e.id, e.employee_id, e.first_name, e.last_name, e.email, e.phone, e.job_title,
           e.department_id, d.name AS department_name,
           e.designation_id, g.name AS designation_name,
           e.home_branch_id, b.name AS home_branch_name,
           e.primary_company_id, c.name AS primary_company_name,
           e.role_id, e.status, e.hire_date, e.created_at, e.updated_at
    FROM employees e
    LEFT JOIN departments d ON d.id = e.department_id
    LEFT JOIN designations g ON g.id = e.designation_id
    LEFT JOIN branches b ON b.id = e.home_branch_id
    LEFT JOIN companies c ON c.id = e.primary_company_id
"#;

const BRANCH_SELECT: &str = r#"
    SELECT b.id, b.company_id, c.name AS company_name, b.name, b.address, b.phone, b.email,
           b.is_remote, b.status, b.created_at, b.updated_at
    FROM branches b
    LEFT JOIN companies c ON c.id = b.company_id
"#;

const ALLOCATION_SELECT: &str = r#"
    SELECT ec.id, ec.employee_id, ec.company_id, c.name AS company_name,
           ec.branch_id, b.name AS branch_name, ec.allocation_percentage, ec.is_primary,
           ec.created_at
    FROM employee_companies ec
    LEFT JOIN companies c ON c.id = ec.company_id
    LEFT JOIN branches b ON b.id = ec.branch_id
"#;

/// `EMP-{yy}-{nnnn}`
pub(crate) fn format_employee_id(year: i32, sequence: i64) -> String {
    format!("EMP-{:02}-{:04}", year.rem_euclid(100), sequence)
}

fn require_non_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CrmError::validation(format!("{} is required", field)));
    }
    Ok(())
}

impl PgStorage {
    // -----------------------------------------------------------------------
    // Companies
    // -----------------------------------------------------------------------

    pub async fn list_companies(&self) -> Result<Vec<Company>> {
        let rows = self
            .timed(sqlx::query_as::<_, Company>("SELECT * FROM companies ORDER BY name").fetch_all(&self.pool))
            .await?;
        Ok(rows)
    }

    pub async fn get_company(&self, id: i64) -> Result<Company> {
        self.timed(
            sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool),
        )
        .await?
        .ok_or_else(|| CrmError::not_found("Company not found"))
    }

    async fn company_code_taken(&self, code: &str, except_id: Option<i64>) -> Result<bool> {
        let taken: bool = self
            .timed(
                sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM companies WHERE LOWER(company_code) = LOWER($1) AND ($2::BIGINT IS NULL OR id <> $2))",
                )
                .bind(code)
                .bind(except_id)
                .fetch_one(&self.pool),
            )
            .await?;
        Ok(taken)
    }

    pub async fn create_company(&self, input: &CompanyInput) -> Result<Company> {
        require_non_empty(&input.name, "Company name")?;
        require_non_empty(&input.company_code, "Company code")?;
        if self.company_code_taken(&input.company_code, None).await? {
            return Err(CrmError::Conflict("Company code already exists".into()));
        }

        let company = self
            .timed(
                sqlx::query_as::<_, Company>(
                    r#"
                    INSERT INTO companies (name, company_code, address, phone, email, website, tax_id)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    RETURNING *
                    "#,
                )
                .bind(input.name.trim())
                .bind(input.company_code.trim())
                .bind(&input.address)
                .bind(&input.phone)
                .bind(&input.email)
                .bind(&input.website)
                .bind(&input.tax_id)
                .fetch_one(&self.pool),
            )
            .await?;

        tracing::info!(company_id = company.id, code = %company.company_code, "Company created");
        Ok(company)
    }

    pub async fn update_company(&self, id: i64, input: &CompanyInput) -> Result<Company> {
        require_non_empty(&input.name, "Company name")?;
        require_non_empty(&input.company_code, "Company code")?;
        if self.company_code_taken(&input.company_code, Some(id)).await? {
            return Err(CrmError::Conflict("Company code already exists".into()));
        }

        self.timed(
            sqlx::query_as::<_, Company>(
                r#"
                UPDATE companies
                SET name = $2, company_code = $3, address = $4, phone = $5, email = $6,
                    website = $7, tax_id = $8, updated_at = now()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(id)
            .bind(input.name.trim())
            .bind(input.company_code.trim())
            .bind(&input.address)
            .bind(&input.phone)
            .bind(&input.email)
            .bind(&input.website)
            .bind(&input.tax_id)
            .fetch_optional(&self.pool),
        )
        .await?
        .ok_or_else(|| CrmError::not_found("Company not found"))
    }

    /// Refused while branches or employees still reference the company.
    pub async fn delete_company(&self, id: i64) -> Result<()> {
        let mut tx = self.begin().await?;

        let branches: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM branches WHERE company_id = $1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if branches > 0 {
            return Err(CrmError::Conflict(format!(
                "Cannot delete company. It has {} associated branches.",
                branches
            )));
        }

        let employees: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM employees WHERE primary_company_id = $1",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if employees > 0 {
            return Err(CrmError::Conflict(format!(
                "Cannot delete company. It has {} associated employees.",
                employees
            )));
        }

        sqlx::query("DELETE FROM employee_companies WHERE company_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM companies WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(CrmError::not_found("Company not found"));
        }

        tx.commit().await?;
        tracing::info!(company_id = id, "Company deleted");
        Ok(())
    }

    pub async fn company_stats(&self) -> Result<CompanyStats> {
        let row = self
            .timed(
                sqlx::query(
                    r#"
                    SELECT
                        (SELECT COUNT(*) FROM companies) AS total_companies,
                        (SELECT COUNT(*) FROM branches) AS total_branches,
                        (SELECT COUNT(*) FROM companies
                         WHERE created_at >= date_trunc('month', now())) AS created_this_month
                    "#,
                )
                .fetch_one(&self.pool),
            )
            .await?;

        Ok(CompanyStats {
            total_companies: row.get("total_companies"),
            total_branches: row.get("total_branches"),
            created_this_month: row.get("created_this_month"),
        })
    }

    // -----------------------------------------------------------------------
    // Branches
    // -----------------------------------------------------------------------

    pub async fn list_branches(&self, company_id: Option<i64>) -> Result<Vec<Branch>> {
        let sql = format!(
            "{} WHERE ($1::BIGINT IS NULL OR b.company_id = $1) ORDER BY c.name, b.name",
            BRANCH_SELECT
        );
        let rows = self
            .timed(sqlx::query_as::<_, Branch>(&sql).bind(company_id).fetch_all(&self.pool))
            .await?;
        Ok(rows)
    }

    pub async fn get_branch(&self, id: i64) -> Result<Branch> {
        let sql = format!("{} WHERE b.id = $1", BRANCH_SELECT);
        self.timed(sqlx::query_as::<_, Branch>(&sql).bind(id).fetch_optional(&self.pool))
            .await?
            .ok_or_else(|| CrmError::not_found("Branch not found"))
    }

    fn validate_branch(input: &BranchInput) -> Result<()> {
        require_non_empty(&input.name, "Branch name")?;
        if !matches!(input.status.as_str(), "active" | "inactive") {
            return Err(CrmError::validation("Branch status must be active or inactive"));
        }
        Ok(())
    }

    pub async fn create_branch(&self, input: &BranchInput) -> Result<Branch> {
        Self::validate_branch(input)?;
        self.get_company(input.company_id).await?;

        let id: i64 = self
            .timed(
                sqlx::query_scalar(
                    r#"
                    INSERT INTO branches (company_id, name, address, phone, email, is_remote, status)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    RETURNING id
                    "#,
                )
                .bind(input.company_id)
                .bind(input.name.trim())
                .bind(&input.address)
                .bind(&input.phone)
                .bind(&input.email)
                .bind(input.is_remote)
                .bind(&input.status)
                .fetch_one(&self.pool),
            )
            .await?;

        self.get_branch(id).await
    }

    pub async fn update_branch(&self, id: i64, input: &BranchInput) -> Result<Branch> {
        Self::validate_branch(input)?;
        let updated = self
            .timed(
                sqlx::query(
                    r#"
                    UPDATE branches
                    SET company_id = $2, name = $3, address = $4, phone = $5, email = $6,
                        is_remote = $7, status = $8, updated_at = now()
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(input.company_id)
                .bind(input.name.trim())
                .bind(&input.address)
                .bind(&input.phone)
                .bind(&input.email)
                .bind(input.is_remote)
                .bind(&input.status)
                .execute(&self.pool),
            )
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(CrmError::not_found("Branch not found"));
        }
        self.get_branch(id).await
    }

    pub async fn delete_branch(&self, id: i64) -> Result<()> {
        let deleted = self
            .timed(sqlx::query("DELETE FROM branches WHERE id = $1").bind(id).execute(&self.pool))
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(CrmError::not_found("Branch not found"));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Departments and designations
    // -----------------------------------------------------------------------

    pub async fn list_departments(&self) -> Result<Vec<Department>> {
        let rows = self
            .timed(
                sqlx::query_as::<_, Department>(
                    "SELECT id, name, description, created_at FROM departments ORDER BY name",
                )
                .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows)
    }

    pub async fn create_department(&self, name: &str, description: Option<&str>) -> Result<Department> {
        require_non_empty(name, "Department name")?;
        let row = self
            .timed(
                sqlx::query_as::<_, Department>(
                    "INSERT INTO departments (name, description) VALUES ($1, $2) RETURNING id, name, description, created_at",
                )
                .bind(name.trim())
                .bind(description)
                .fetch_one(&self.pool),
            )
            .await?;
        Ok(row)
    }

    pub async fn list_designations(&self, department_id: Option<i64>) -> Result<Vec<Designation>> {
        let rows = self
            .timed(
                sqlx::query_as::<_, Designation>(
                    r#"
                    SELECT g.id, g.name, g.department_id, d.name AS department_name,
                           g.description, g.created_at
                    FROM designations g
                    LEFT JOIN departments d ON d.id = g.department_id
                    WHERE ($1::BIGINT IS NULL OR g.department_id = $1)
                    ORDER BY g.name
                    "#,
                )
                .bind(department_id)
                .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows)
    }

    pub async fn create_designation(
        &self,
        name: &str,
        department_id: Option<i64>,
        description: Option<&str>,
    ) -> Result<Designation> {
        require_non_empty(name, "Designation name")?;
        let id: i64 = self
            .timed(
                sqlx::query_scalar(
                    "INSERT INTO designations (name, department_id, description) VALUES ($1, $2, $3) RETURNING id",
                )
                .bind(name.trim())
                .bind(department_id)
                .bind(description)
                .fetch_one(&self.pool),
            )
            .await?;

        let rows = self.list_designations(department_id).await?;
        rows.into_iter()
            .find(|d| d.id == id)
            .ok_or_else(|| CrmError::not_found("Designation not found"))
    }

    // -----------------------------------------------------------------------
    // Employees
    // -----------------------------------------------------------------------

    pub async fn list_employees(&self, department_id: Option<i64>) -> Result<Vec<Employee>> {
        let sql = format!(
            "{} WHERE ($1::BIGINT IS NULL OR e.department_id = $1) ORDER BY e.first_name, e.last_name",
            EMPLOYEE_SELECT
        );
        let rows = self
            .timed(sqlx::query_as::<_, Employee>(&sql).bind(department_id).fetch_all(&self.pool))
            .await?;
        Ok(rows)
    }

    pub async fn find_employee(&self, id: i64) -> Result<Option<Employee>> {
        let sql = format!("{} WHERE e.id = $1", EMPLOYEE_SELECT);
        let row = self
            .timed(sqlx::query_as::<_, Employee>(&sql).bind(id).fetch_optional(&self.pool))
            .await?;
        Ok(row)
    }

    pub async fn get_employee(&self, id: i64) -> Result<Employee> {
        self.find_employee(id)
            .await?
            .ok_or_else(|| CrmError::not_found("Employee not found"))
    }

    async fn next_employee_id(&self) -> Result<String> {
        let year = Utc::now().year();
        let prefix = format!("EMP-{:02}-", year.rem_euclid(100));
        let highest: Option<i32> = self
            .timed(
                sqlx::query_scalar(
                    r#"
                    SELECT MAX(CAST(SUBSTRING(employee_id FROM 8) AS INTEGER))
                    FROM employees
                    WHERE employee_id LIKE $1 || '%' AND SUBSTRING(employee_id FROM 8) ~ '^[0-9]+$'
                    "#,
                )
                .bind(&prefix)
                .fetch_one(&self.pool),
            )
            .await?;
        Ok(format_employee_id(year, highest.unwrap_or(0) as i64 + 1))
    }

    fn validate_employee(input: &EmployeeInput) -> Result<()> {
        require_non_empty(&input.first_name, "First name")?;
        if !EMPLOYEE_STATUSES.contains(&input.status.as_str()) {
            return Err(CrmError::validation(format!(
                "Invalid employee status. Must be one of: {}",
                EMPLOYEE_STATUSES.join(", ")
            )));
        }
        Ok(())
    }

    pub async fn create_employee(&self, input: &EmployeeInput) -> Result<Employee> {
        Self::validate_employee(input)?;
        let employee_id = self.next_employee_id().await?;

        let id: i64 = self
            .timed(
                sqlx::query_scalar(
                    r#"
                    INSERT INTO employees (employee_id, first_name, last_name, email, phone, job_title,
                        department_id, designation_id, home_branch_id, primary_company_id, role_id,
                        status, hire_date)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                    RETURNING id
                    "#,
                )
                .bind(&employee_id)
                .bind(input.first_name.trim())
                .bind(input.last_name.trim())
                .bind(&input.email)
                .bind(&input.phone)
                .bind(&input.job_title)
                .bind(input.department_id)
                .bind(input.designation_id)
                .bind(input.home_branch_id)
                .bind(input.primary_company_id)
                .bind(input.role_id)
                .bind(&input.status)
                .bind(input.hire_date)
                .fetch_one(&self.pool),
            )
            .await?;

        tracing::info!(id, employee_id = %employee_id, "Employee created");
        self.get_employee(id).await
    }

    pub async fn update_employee(&self, id: i64, input: &EmployeeInput) -> Result<Employee> {
        Self::validate_employee(input)?;
        let updated = self
            .timed(
                sqlx::query(
                    r#"
                    UPDATE employees
                    SET first_name = $2, last_name = $3, email = $4, phone = $5, job_title = $6,
                        department_id = $7, designation_id = $8, home_branch_id = $9,
                        primary_company_id = $10, role_id = $11, status = $12, hire_date = $13,
                        updated_at = now()
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(input.first_name.trim())
                .bind(input.last_name.trim())
                .bind(&input.email)
                .bind(&input.phone)
                .bind(&input.job_title)
                .bind(input.department_id)
                .bind(input.designation_id)
                .bind(input.home_branch_id)
                .bind(input.primary_company_id)
                .bind(input.role_id)
                .bind(&input.status)
                .bind(input.hire_date)
                .execute(&self.pool),
            )
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(CrmError::not_found("Employee not found"));
        }
        self.get_employee(id).await
    }

    /// Removes the employee's company allocations and the employee in one transaction.
    pub async fn delete_employee(&self, id: i64) -> Result<()> {
        let mut tx = self.begin().await?;
        sqlx::query("DELETE FROM employee_companies WHERE employee_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM employees WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(CrmError::not_found("Employee not found"));
        }
        tx.commit().await?;
        tracing::info!(employee = id, "Employee deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Company allocations
    // -----------------------------------------------------------------------

    pub async fn list_employee_companies(&self, employee_id: i64) -> Result<Vec<EmployeeCompany>> {
        let sql = format!(
            "{} WHERE ec.employee_id = $1 ORDER BY ec.is_primary DESC, c.name",
            ALLOCATION_SELECT
        );
        let rows = self
            .timed(sqlx::query_as::<_, EmployeeCompany>(&sql).bind(employee_id).fetch_all(&self.pool))
            .await?;
        Ok(rows)
    }

    async fn get_employee_company(&self, id: i64) -> Result<EmployeeCompany> {
        let sql = format!("{} WHERE ec.id = $1", ALLOCATION_SELECT);
        self.timed(sqlx::query_as::<_, EmployeeCompany>(&sql).bind(id).fetch_optional(&self.pool))
            .await?
            .ok_or_else(|| CrmError::not_found("Company allocation not found"))
    }

    /// Row lock on the employee; serialises allocation changes for that employee.
    async fn lock_employee(tx: &mut Transaction<'static, Postgres>, employee_id: i64) -> Result<()> {
        sqlx::query_scalar::<_, i64>("SELECT id FROM employees WHERE id = $1 FOR UPDATE")
            .bind(employee_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| CrmError::not_found("Employee not found"))?;
        Ok(())
    }

    async fn allocated_percentage(
        tx: &mut Transaction<'static, Postgres>,
        employee_id: i64,
        except_id: Option<i64>,
    ) -> Result<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(allocation_percentage), 0)::BIGINT
            FROM employee_companies
            WHERE employee_id = $1 AND ($2::BIGINT IS NULL OR id <> $2)
            "#,
        )
        .bind(employee_id)
        .bind(except_id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(total)
    }

    fn validate_allocation(percentage: i32, already_allocated: i64) -> Result<()> {
        if !(0..=100).contains(&percentage) {
            return Err(CrmError::validation("Allocation percentage must be between 0 and 100"));
        }
        if already_allocated + percentage as i64 > 100 {
            return Err(CrmError::validation("Total allocation would exceed 100%"));
        }
        Ok(())
    }

    pub async fn add_employee_company(
        &self,
        employee_id: i64,
        input: &EmployeeCompanyInput,
    ) -> Result<EmployeeCompany> {
        let mut tx = self.begin().await?;
        Self::lock_employee(&mut tx, employee_id).await?;
        let allocated = Self::allocated_percentage(&mut tx, employee_id, None).await?;
        Self::validate_allocation(input.allocation_percentage, allocated)?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO employee_companies (employee_id, company_id, branch_id, allocation_percentage, is_primary)
            VALUES ($1, $2, $3, $4, false)
            RETURNING id
            "#,
        )
        .bind(employee_id)
        .bind(input.company_id)
        .bind(input.branch_id)
        .bind(input.allocation_percentage)
        .fetch_one(&mut *tx)
        .await?;

        if input.is_primary {
            Self::mark_primary(&mut tx, employee_id, input.company_id).await?;
        }
        tx.commit().await?;
        self.get_employee_company(id).await
    }

    pub async fn update_employee_company(
        &self,
        id: i64,
        input: &EmployeeCompanyInput,
    ) -> Result<EmployeeCompany> {
        let existing = self.get_employee_company(id).await?;
        let mut tx = self.begin().await?;
        Self::lock_employee(&mut tx, existing.employee_id).await?;
        let allocated = Self::allocated_percentage(&mut tx, existing.employee_id, Some(id)).await?;
        Self::validate_allocation(input.allocation_percentage, allocated)?;

        let updated = sqlx::query(
            r#"
            UPDATE employee_companies
            SET company_id = $2, branch_id = $3, allocation_percentage = $4, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(input.company_id)
        .bind(input.branch_id)
        .bind(input.allocation_percentage)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if updated == 0 {
            return Err(CrmError::not_found("Company allocation not found"));
        }

        if input.is_primary {
            Self::mark_primary(&mut tx, existing.employee_id, input.company_id).await?;
        }
        tx.commit().await?;
        self.get_employee_company(id).await
    }

    pub async fn delete_employee_company(&self, id: i64) -> Result<()> {
        let existing = self.get_employee_company(id).await?;
        let mut tx = self.begin().await?;
        Self::lock_employee(&mut tx, existing.employee_id).await?;
        sqlx::query("DELETE FROM employee_companies WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if existing.is_primary {
            sqlx::query(
                "UPDATE employees SET primary_company_id = NULL, updated_at = now() WHERE id = $1 AND primary_company_id = $2",
            )
            .bind(existing.employee_id)
            .bind(existing.company_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Clears the other primaries and points `employees.primary_company_id` at the company.
    pub async fn set_primary_company(&self, employee_id: i64, company_id: i64) -> Result<()> {
        let mut tx = self.begin().await?;
        Self::lock_employee(&mut tx, employee_id).await?;
        Self::mark_primary(&mut tx, employee_id, company_id).await?;
        tx.commit().await?;
        tracing::info!(employee = employee_id, company = company_id, "Primary company set");
        Ok(())
    }

    async fn mark_primary(
        tx: &mut Transaction<'static, Postgres>,
        employee_id: i64,
        company_id: i64,
    ) -> Result<()> {
        let has_allocation: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM employee_companies WHERE employee_id = $1 AND company_id = $2)",
        )
        .bind(employee_id)
        .bind(company_id)
        .fetch_one(&mut **tx)
        .await?;
        if !has_allocation {
            return Err(CrmError::not_found("Company allocation not found"));
        }

        sqlx::query(
            r#"
            UPDATE employee_companies
            SET is_primary = (company_id = $2), updated_at = now()
            WHERE employee_id = $1
            "#,
        )
        .bind(employee_id)
        .bind(company_id)
        .execute(&mut **tx)
        .await?;

        sqlx::query("UPDATE employees SET primary_company_id = $2, updated_at = now() WHERE id = $1")
            .bind(employee_id)
            .bind(company_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::postgres::test_storage;

    // -------------------------------------------------------------------------
    // Pure helpers
    // -------------------------------------------------------------------------

    #[test]
    fn test_employee_id_format() {
        assert_eq!(format_employee_id(2024, 1), "EMP-24-0001");
        assert_eq!(format_employee_id(2031, 123), "EMP-31-0123");
        assert_eq!(format_employee_id(2000, 10000), "EMP-00-10000");
    }

    #[test]
    fn test_allocation_limits() {
        assert!(PgStorage::validate_allocation(40, 60).is_ok());
        let err = PgStorage::validate_allocation(41, 60).unwrap_err();
        assert_eq!(err.to_string(), "Total allocation would exceed 100%");
        assert!(PgStorage::validate_allocation(101, 0).is_err());
        assert!(PgStorage::validate_allocation(-1, 0).is_err());
    }

    // -------------------------------------------------------------------------
    // Database (requires OOAK_TEST_DATABASE_URL)
    // -------------------------------------------------------------------------

    fn company_input(code: &str) -> CompanyInput {
        CompanyInput {
            name: format!("Company {}", code),
            company_code: code.to_string(),
            address: None,
            phone: None,
            email: None,
            website: None,
            tax_id: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_company_code_rejected() {
        let Some(storage) = test_storage().await else {
            return;
        };
        let code = format!("T{}", uuid::Uuid::new_v4().simple());
        let company = storage.create_company(&company_input(&code)).await.unwrap();

        let err = storage
            .create_company(&company_input(&code.to_lowercase()))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Company code already exists");

        storage.delete_company(company.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_company_with_branches_not_deleted() {
        let Some(storage) = test_storage().await else {
            return;
        };
        let code = format!("B{}", uuid::Uuid::new_v4().simple());
        let company = storage.create_company(&company_input(&code)).await.unwrap();
        let branch = storage
            .create_branch(&BranchInput {
                company_id: company.id,
                name: "Main".into(),
                address: None,
                phone: None,
                email: None,
                is_remote: false,
                status: "active".into(),
            })
            .await
            .unwrap();

        let err = storage.delete_company(company.id).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot delete company. It has 1 associated branches."
        );

        storage.delete_branch(branch.id).await.unwrap();
        storage.delete_company(company.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_employee_allocation_and_primary() {
        let Some(storage) = test_storage().await else {
            return;
        };
        let code = format!("E{}", uuid::Uuid::new_v4().simple());
        let company = storage.create_company(&company_input(&code)).await.unwrap();
        let employee = storage
            .create_employee(&EmployeeInput {
                first_name: "Asha".into(),
                last_name: "Rao".into(),
                email: None,
                phone: None,
                job_title: None,
                department_id: None,
                designation_id: None,
                home_branch_id: None,
                primary_company_id: None,
                role_id: None,
                status: "active".into(),
                hire_date: None,
            })
            .await
            .unwrap();
        assert!(employee.employee_id.starts_with("EMP-"));

        let allocation = storage
            .add_employee_company(
                employee.id,
                &EmployeeCompanyInput {
                    company_id: company.id,
                    branch_id: None,
                    allocation_percentage: 80,
                    is_primary: true,
                },
            )
            .await
            .unwrap();
        assert!(allocation.is_primary);
        let reloaded = storage.get_employee(employee.id).await.unwrap();
        assert_eq!(reloaded.primary_company_id, Some(company.id));

        storage.delete_employee(employee.id).await.unwrap();
        storage.delete_company(company.id).await.unwrap();
    }
    #[tokio::test]
    async fn test_concurrent_allocations_stay_within_limit() {
        let Some(storage) = test_storage().await else {
            return;
        };
        let first = storage
            .create_company(&company_input(&format!("A{}", uuid::Uuid::new_v4().simple())))
            .await
            .unwrap();
        let second = storage
            .create_company(&company_input(&format!("B{}", uuid::Uuid::new_v4().simple())))
            .await
            .unwrap();
        let employee = storage
            .create_employee(&EmployeeInput {
                first_name: "Kiran".into(),
                last_name: "Das".into(),
                email: None,
                phone: None,
                job_title: None,
                department_id: None,
                designation_id: None,
                home_branch_id: None,
                primary_company_id: None,
                role_id: None,
                status: "active".into(),
                hire_date: None,
            })
            .await
            .unwrap();

        let sixty = |company_id| EmployeeCompanyInput {
            company_id,
            branch_id: None,
            allocation_percentage: 60,
            is_primary: false,
        };
        let (first_input, second_input) = (sixty(first.id), sixty(second.id));
        let (a, b) = tokio::join!(
            storage.add_employee_company(employee.id, &first_input),
            storage.add_employee_company(employee.id, &second_input),
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        let rejected = a.err().or(b.err()).unwrap();
        assert_eq!(rejected.to_string(), "Total allocation would exceed 100%");

        let allocations = storage.list_employee_companies(employee.id).await.unwrap();
        let total: i32 = allocations.iter().map(|a| a.allocation_percentage).sum();
        assert_eq!(total, 60);

        let over = storage
            .add_employee_company(
                employee.id,
                &EmployeeCompanyInput {
                    company_id: second.id,
                    branch_id: None,
                    allocation_percentage: 50,
                    is_primary: true,
                },
            )
            .await;
        assert!(over.is_err());
        let reloaded = storage.get_employee(employee.id).await.unwrap();
        assert_eq!(reloaded.primary_company_id, None);
        assert_eq!(storage.list_employee_companies(employee.id).await.unwrap().len(), 1);

        storage.delete_employee(employee.id).await.unwrap();
        storage.delete_company(first.id).await.unwrap();
        storage.delete_company(second.id).await.unwrap();
    }
}
