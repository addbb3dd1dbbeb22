//! HTTP handlers, grouped by business area. Every handler returns the
//! `{ success, data }` envelope or a `CrmError`.

pub mod access;
pub mod auth;
pub mod common;
pub mod leads;
pub mod notifications;
pub mod org;
pub mod partners;
pub mod quotations;
pub mod reports;
pub mod system;
pub mod tasks;
