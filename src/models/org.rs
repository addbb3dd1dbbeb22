use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub company_code: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub tax_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompanyInput {
    pub name: String,
    pub company_code: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub tax_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompanyStats {
    pub total_companies: i64,
    pub total_branches: i64,
    pub created_this_month: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Branch {
    pub id: i64,
    pub company_id: i64,
    pub company_name: Option<String>,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub is_remote: bool,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BranchInput {
    pub company_id: i64,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub is_remote: bool,
    #[serde(default = "default_active")]
    pub status: String,
}

fn default_active() -> String {
    "active".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Department {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Designation {
    pub id: i64,
    pub name: String,
    pub department_id: Option<i64>,
    pub department_name: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Employee row joined with its department, designation, branch and company names.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Employee {
    pub id: i64,
    pub employee_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub job_title: Option<String>,
    pub department_id: Option<i64>,
    pub department_name: Option<String>,
    pub designation_id: Option<i64>,
    pub designation_name: Option<String>,
    pub home_branch_id: Option<i64>,
    pub home_branch_name: Option<String>,
    pub primary_company_id: Option<i64>,
    pub primary_company_name: Option<String>,
    pub role_id: Option<i64>,
    pub status: String,
    pub hire_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Employee {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmployeeInput {
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub job_title: Option<String>,
    pub department_id: Option<i64>,
    pub designation_id: Option<i64>,
    pub home_branch_id: Option<i64>,
    pub primary_company_id: Option<i64>,
    pub role_id: Option<i64>,
    #[serde(default = "default_active")]
    pub status: String,
    pub hire_date: Option<NaiveDate>,
}

pub const EMPLOYEE_STATUSES: &[&str] = &["active", "inactive", "on_leave", "terminated"];

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmployeeCompany {
    pub id: i64,
    pub employee_id: i64,
    pub company_id: i64,
    pub company_name: Option<String>,
    pub branch_id: Option<i64>,
    pub branch_name: Option<String>,
    pub allocation_percentage: i32,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmployeeCompanyInput {
    pub company_id: i64,
    pub branch_id: Option<i64>,
    pub allocation_percentage: i32,
    #[serde(default)]
    pub is_primary: bool,
}

/// Lightweight candidate used by task assignment.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EmployeeCandidate {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub job_title: Option<String>,
    pub department_name: Option<String>,
    pub designation_name: Option<String>,
    pub open_tasks: i64,
}

impl EmployeeCandidate {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}
