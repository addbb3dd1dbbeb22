use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const PARTNER_STATUSES: [&str; 2] = ["active", "inactive"];

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Vendor {
    pub id: i64,
    pub name: String,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub category: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create/replace body for a vendor. `status` defaults to `active`.
#[derive(Debug, Clone, Deserialize)]
pub struct VendorInput {
    pub name: String,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Supplier {
    pub id: i64,
    pub supplier_code: String,
    pub name: String,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub category: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupplierInput {
    pub supplier_code: String,
    pub name: String,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VendorQuery {
    pub category: Option<String>,
    #[serde(default)]
    pub active_only: bool,
}

/// Headcount of a vendor or supplier table. Week and month are trailing 7 and 30 days.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PartnerStats {
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
    pub created_today: i64,
    pub created_this_week: i64,
    pub created_this_month: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}
