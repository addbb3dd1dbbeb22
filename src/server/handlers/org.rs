use std::sync::Arc;

use axum::extract::State;
use serde::Deserialize;

use super::common::{audit, ok, ApiJson, ApiPath, ApiQuery, ApiResponse};
use crate::auth::Session;
use crate::error::CrmError;
use crate::models::{
    Branch, BranchInput, Company, CompanyInput, CompanyStats, Department, Designation, Employee,
    EmployeeCompany, EmployeeCompanyInput, EmployeeInput,
};
use crate::server::state::AppState;

// ---------------------------------------------------------------------------
// Companies
// ---------------------------------------------------------------------------

pub async fn list_companies(
    State(state): State<Arc<AppState>>,
    _session: Session,
) -> ApiResponse<Vec<Company>> {
    ok(state.storage.list_companies().await?)
}

pub async fn get_company(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiPath(id): ApiPath<i64>,
) -> ApiResponse<Company> {
    ok(state.storage.get_company(id).await?)
}

pub async fn create_company(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiJson(input): ApiJson<CompanyInput>,
) -> ApiResponse<Company> {
    let company = state.storage.create_company(&input).await?;
    audit(&state, &session, "CREATE", "company", company.id, format!("Created company {}", company.name)).await;
    ok(company)
}

pub async fn update_company(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<CompanyInput>,
) -> ApiResponse<Company> {
    let company = state.storage.update_company(id, &input).await?;
    audit(&state, &session, "UPDATE", "company", id, format!("Updated company {}", company.name)).await;
    ok(company)
}

pub async fn delete_company(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
) -> ApiResponse<&'static str> {
    state.storage.delete_company(id).await?;
    audit(&state, &session, "DELETE", "company", id, format!("Deleted company {}", id)).await;
    ok("Company deleted")
}

pub async fn company_branches(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiPath(id): ApiPath<i64>,
) -> ApiResponse<Vec<Branch>> {
    state.storage.get_company(id).await?;
    ok(state.storage.list_branches(Some(id)).await?)
}

pub async fn company_stats(
    State(state): State<Arc<AppState>>,
    _session: Session,
) -> ApiResponse<CompanyStats> {
    ok(state.storage.company_stats().await?)
}

// ---------------------------------------------------------------------------
// Branches
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct BranchQuery {
    pub company_id: Option<i64>,
}

pub async fn list_branches(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiQuery(query): ApiQuery<BranchQuery>,
) -> ApiResponse<Vec<Branch>> {
    ok(state.storage.list_branches(query.company_id).await?)
}

pub async fn create_branch(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiJson(input): ApiJson<BranchInput>,
) -> ApiResponse<Branch> {
    let branch = state.storage.create_branch(&input).await?;
    audit(&state, &session, "CREATE", "branch", branch.id, format!("Created branch {}", branch.name)).await;
    ok(branch)
}

pub async fn update_branch(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<BranchInput>,
) -> ApiResponse<Branch> {
    let branch = state.storage.update_branch(id, &input).await?;
    audit(&state, &session, "UPDATE", "branch", id, format!("Updated branch {}", branch.name)).await;
    ok(branch)
}

pub async fn delete_branch(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
) -> ApiResponse<&'static str> {
    state.storage.delete_branch(id).await?;
    audit(&state, &session, "DELETE", "branch", id, format!("Deleted branch {}", id)).await;
    ok("Branch deleted")
}

// ---------------------------------------------------------------------------
// Departments and designations
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DepartmentRequest {
    pub name: String,
    pub description: Option<String>,
}

pub async fn list_departments(
    State(state): State<Arc<AppState>>,
    _session: Session,
) -> ApiResponse<Vec<Department>> {
    ok(state.storage.list_departments().await?)
}

pub async fn create_department(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiJson(request): ApiJson<DepartmentRequest>,
) -> ApiResponse<Department> {
    let department = state
        .storage
        .create_department(&request.name, request.description.as_deref())
        .await?;
    audit(&state, &session, "CREATE", "department", department.id, format!("Created department {}", department.name)).await;
    ok(department)
}

#[derive(Debug, Default, Deserialize)]
pub struct DesignationQuery {
    pub department_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct DesignationRequest {
    pub name: String,
    pub department_id: Option<i64>,
    pub description: Option<String>,
}

pub async fn list_designations(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiQuery(query): ApiQuery<DesignationQuery>,
) -> ApiResponse<Vec<Designation>> {
    ok(state.storage.list_designations(query.department_id).await?)
}

pub async fn create_designation(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiJson(request): ApiJson<DesignationRequest>,
) -> ApiResponse<Designation> {
    let designation = state
        .storage
        .create_designation(&request.name, request.department_id, request.description.as_deref())
        .await?;
    audit(&state, &session, "CREATE", "designation", designation.id, format!("Created designation {}", designation.name)).await;
    ok(designation)
}

// ---------------------------------------------------------------------------
// Employees
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct EmployeeQuery {
    pub department_id: Option<i64>,
}

pub async fn list_employees(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiQuery(query): ApiQuery<EmployeeQuery>,
) -> ApiResponse<Vec<Employee>> {
    ok(state.storage.list_employees(query.department_id).await?)
}

pub async fn get_employee(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiPath(id): ApiPath<i64>,
) -> ApiResponse<Employee> {
    ok(state.storage.get_employee(id).await?)
}

pub async fn create_employee(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiJson(input): ApiJson<EmployeeInput>,
) -> ApiResponse<Employee> {
    let employee = state.storage.create_employee(&input).await?;
    audit(&state, &session, "CREATE", "employee", employee.id, format!("Created employee {}", employee.full_name())).await;
    ok(employee)
}

pub async fn update_employee(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<EmployeeInput>,
) -> ApiResponse<Employee> {
    let employee = state.storage.update_employee(id, &input).await?;
    audit(&state, &session, "UPDATE", "employee", id, format!("Updated employee {}", employee.full_name())).await;
    ok(employee)
}

pub async fn delete_employee(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
) -> ApiResponse<&'static str> {
    state.storage.delete_employee(id).await?;
    audit(&state, &session, "DELETE", "employee", id, format!("Deleted employee {}", id)).await;
    ok("Employee deleted")
}

// ---------------------------------------------------------------------------
// Company allocations
// ---------------------------------------------------------------------------

pub async fn list_employee_companies(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiPath(employee_id): ApiPath<i64>,
) -> ApiResponse<Vec<EmployeeCompany>> {
    ok(state.storage.list_employee_companies(employee_id).await?)
}

pub async fn add_employee_company(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(employee_id): ApiPath<i64>,
    ApiJson(input): ApiJson<EmployeeCompanyInput>,
) -> ApiResponse<EmployeeCompany> {
    let allocation = state.storage.add_employee_company(employee_id, &input).await?;
    audit(
        &state,
        &session,
        "CREATE",
        "employee_company",
        allocation.id,
        format!("Allocated employee {} to company {}", employee_id, input.company_id),
    )
    .await;
    ok(allocation)
}

pub async fn update_employee_company(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<EmployeeCompanyInput>,
) -> ApiResponse<EmployeeCompany> {
    let allocation = state.storage.update_employee_company(id, &input).await?;
    audit(&state, &session, "UPDATE", "employee_company", id, format!("Updated allocation {}", id)).await;
    ok(allocation)
}

pub async fn delete_employee_company(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
) -> ApiResponse<&'static str> {
    state.storage.delete_employee_company(id).await?;
    audit(&state, &session, "DELETE", "employee_company", id, format!("Removed allocation {}", id)).await;
    ok("Allocation removed")
}

#[derive(Debug, Deserialize)]
pub struct PrimaryCompanyRequest {
    pub company_id: i64,
}

pub async fn set_primary_company(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(employee_id): ApiPath<i64>,
    ApiJson(request): ApiJson<PrimaryCompanyRequest>,
) -> ApiResponse<Vec<EmployeeCompany>> {
    if request.company_id <= 0 {
        return Err(CrmError::validation("Invalid company ID"));
    }
    state
        .storage
        .set_primary_company(employee_id, request.company_id)
        .await?;
    audit(
        &state,
        &session,
        "UPDATE",
        "employee",
        employee_id,
        format!("Primary company set to {}", request.company_id),
    )
    .await;
    ok(state.storage.list_employee_companies(employee_id).await?)
}
