//! Typed repository layer over PostgreSQL. `postgres` owns the pool; every other
//! module adds an `impl PgStorage` block for one business area.

pub mod postgres;

mod accounts;
mod activities;
mod calls;
mod catalog;
mod dashboard;
mod followups;
mod leads;
mod menus;
mod notifications;
mod org;
mod partners;
mod quotations;
mod reports;
mod tasks;

pub use calls::{CallDetail, CallIngestResult};
pub use dashboard::{DashboardStats, DepartmentCount, EntityCount, GrowthTrend};
pub use postgres::{DatabaseHealth, PgStorage, QueryMetrics, StorageError};
pub(crate) use reports::report_filters;
