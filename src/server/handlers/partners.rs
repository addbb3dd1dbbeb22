use std::sync::Arc;

use axum::extract::State;
use serde::Deserialize;

use super::common::{audit, ok, ApiJson, ApiPath, ApiQuery, ApiResponse};
use crate::auth::Session;
use crate::models::{
    CategoryCount, PartnerStats, Supplier, SupplierInput, Vendor, VendorInput, VendorQuery,
};
use crate::server::state::AppState;

// ---------------------------------------------------------------------------
// Vendors
// ---------------------------------------------------------------------------

pub async fn list_vendors(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiQuery(query): ApiQuery<VendorQuery>,
) -> ApiResponse<Vec<Vendor>> {
    ok(state.storage.list_vendors(&query).await?)
}

pub async fn get_vendor(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiPath(id): ApiPath<i64>,
) -> ApiResponse<Vendor> {
    ok(state.storage.get_vendor(id).await?)
}

pub async fn create_vendor(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiJson(input): ApiJson<VendorInput>,
) -> ApiResponse<Vendor> {
    let vendor = state.storage.create_vendor(&input).await?;
    audit(&state, &session, "CREATE", "vendor", vendor.id, format!("Created vendor {}", vendor.name)).await;
    ok(vendor)
}

pub async fn update_vendor(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<VendorInput>,
) -> ApiResponse<Vendor> {
    let vendor = state.storage.update_vendor(id, &input).await?;
    audit(&state, &session, "UPDATE", "vendor", id, format!("Updated vendor {}", vendor.name)).await;
    ok(vendor)
}

pub async fn delete_vendor(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
) -> ApiResponse<&'static str> {
    state.storage.delete_vendor(id).await?;
    audit(&state, &session, "DELETE", "vendor", id, format!("Deleted vendor {}", id)).await;
    ok("Vendor deleted")
}

pub async fn vendor_stats(State(state): State<Arc<AppState>>, _session: Session) -> ApiResponse<PartnerStats> {
    ok(state.storage.vendor_stats().await?)
}

pub async fn vendor_categories(
    State(state): State<Arc<AppState>>,
    _session: Session,
) -> ApiResponse<Vec<CategoryCount>> {
    ok(state.storage.vendor_categories().await?)
}

// ---------------------------------------------------------------------------
// Suppliers
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct SupplierQuery {
    #[serde(default)]
    pub active_only: bool,
}

pub async fn list_suppliers(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiQuery(query): ApiQuery<SupplierQuery>,
) -> ApiResponse<Vec<Supplier>> {
    ok(state.storage.list_suppliers(query.active_only).await?)
}

pub async fn get_supplier(
    State(state): State<Arc<AppState>>,
    _session: Session,
    ApiPath(id): ApiPath<i64>,
) -> ApiResponse<Supplier> {
    ok(state.storage.get_supplier(id).await?)
}

pub async fn create_supplier(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiJson(input): ApiJson<SupplierInput>,
) -> ApiResponse<Supplier> {
    let supplier = state.storage.create_supplier(&input).await?;
    audit(
        &state,
        &session,
        "CREATE",
        "supplier",
        supplier.id,
        format!("Created supplier {} ({})", supplier.name, supplier.supplier_code),
    )
    .await;
    ok(supplier)
}

pub async fn update_supplier(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<SupplierInput>,
) -> ApiResponse<Supplier> {
    let supplier = state.storage.update_supplier(id, &input).await?;
    audit(&state, &session, "UPDATE", "supplier", id, format!("Updated supplier {}", supplier.name)).await;
    ok(supplier)
}

pub async fn delete_supplier(
    State(state): State<Arc<AppState>>,
    session: Session,
    ApiPath(id): ApiPath<i64>,
) -> ApiResponse<&'static str> {
    state.storage.delete_supplier(id).await?;
    audit(&state, &session, "DELETE", "supplier", id, format!("Deleted supplier {}", id)).await;
    ok("Supplier deleted")
}

pub async fn supplier_stats(State(state): State<Arc<AppState>>, _session: Session) -> ApiResponse<PartnerStats> {
    ok(state.storage.supplier_stats().await?)
}
