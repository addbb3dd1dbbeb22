//! Vendors and suppliers: the outside businesses events are sourced from.

use super::PgStorage;
use crate::error::{CrmError, Result};
use crate::models::{
    CategoryCount, PartnerStats, Supplier, SupplierInput, Vendor, VendorInput, VendorQuery,
    PARTNER_STATUSES,
};

/// Trimmed required field, or a validation error naming it.
fn required<'a>(value: &'a str, field: &str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CrmError::validation(format!("{} is required", field)));
    }
    Ok(value)
}

/// Blank optional text is stored as NULL.
fn optional(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn partner_status(status: Option<&str>) -> Result<&'static str> {
    let status = status.map(str::trim).unwrap_or("active");
    PARTNER_STATUSES
        .iter()
        .copied()
        .find(|s| s.eq_ignore_ascii_case(status))
        .ok_or_else(|| CrmError::validation(format!("Invalid status: {}", status)))
}

fn stats_sql(table: &str) -> String {
    format!(
        r#"
        SELECT
            COUNT(*) AS total,
            COUNT(*) FILTER (WHERE status = 'active') AS active,
            COUNT(*) FILTER (WHERE status = 'inactive') AS inactive,
            COUNT(*) FILTER (WHERE created_at >= date_trunc('day', now())) AS created_today,
            COUNT(*) FILTER (WHERE created_at >= now() - INTERVAL '7 days') AS created_this_week,
            COUNT(*) FILTER (WHERE created_at >= now() - INTERVAL '30 days') AS created_this_month
        FROM {}
        "#,
        table
    )
}

impl PgStorage {
    // -----------------------------------------------------------------------
    // Vendors
    // -----------------------------------------------------------------------

    pub async fn list_vendors(&self, query: &VendorQuery) -> Result<Vec<Vendor>> {
        let category = query.category.as_deref().map(str::trim).filter(|c| !c.is_empty());
        let rows = self
            .timed(
                sqlx::query_as::<_, Vendor>(
                    r#"
                    SELECT * FROM vendors
                    WHERE ($1::TEXT IS NULL OR category = $1)
                      AND (NOT $2 OR status = 'active')
                    ORDER BY name
                    "#,
                )
                .bind(category)
                .bind(query.active_only || category.is_some())
                .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows)
    }

    pub async fn get_vendor(&self, id: i64) -> Result<Vendor> {
        self.timed(sqlx::query_as::<_, Vendor>("SELECT * FROM vendors WHERE id = $1").bind(id).fetch_optional(&self.pool))
            .await?
            .ok_or_else(|| CrmError::not_found("Vendor not found"))
    }

    async fn vendor_name_taken(&self, name: &str, except_id: Option<i64>) -> Result<bool> {
        let taken: bool = self
            .timed(
                sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM vendors WHERE LOWER(name) = LOWER($1) AND ($2::BIGINT IS NULL OR id <> $2))",
                )
                .bind(name)
                .bind(except_id)
                .fetch_one(&self.pool),
            )
            .await?;
        Ok(taken)
    }

    pub async fn create_vendor(&self, input: &VendorInput) -> Result<Vendor> {
        let name = required(&input.name, "Vendor name")?;
        let status = partner_status(input.status.as_deref())?;
        if self.vendor_name_taken(name, None).await? {
            return Err(CrmError::Conflict("Vendor with this name already exists".into()));
        }

        let vendor = self
            .timed(
                sqlx::query_as::<_, Vendor>(
                    r#"
                    INSERT INTO vendors (name, contact_person, email, phone, address, category, status)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    RETURNING *
                    "#,
                )
                .bind(name)
                .bind(optional(&input.contact_person))
                .bind(optional(&input.email))
                .bind(optional(&input.phone))
                .bind(optional(&input.address))
                .bind(optional(&input.category))
                .bind(status)
                .fetch_one(&self.pool),
            )
            .await?;

        tracing::info!(vendor_id = vendor.id, "Vendor created");
        Ok(vendor)
    }

    pub async fn update_vendor(&self, id: i64, input: &VendorInput) -> Result<Vendor> {
        let name = required(&input.name, "Vendor name")?;
        let status = partner_status(input.status.as_deref())?;
        if self.vendor_name_taken(name, Some(id)).await? {
            return Err(CrmError::Conflict("Vendor with this name already exists".into()));
        }

        self.timed(
            sqlx::query_as::<_, Vendor>(
                r#"
                UPDATE vendors
                SET name = $2, contact_person = $3, email = $4, phone = $5, address = $6,
                    category = $7, status = $8, updated_at = now()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(id)
            .bind(name)
            .bind(optional(&input.contact_person))
            .bind(optional(&input.email))
            .bind(optional(&input.phone))
            .bind(optional(&input.address))
            .bind(optional(&input.category))
            .bind(status)
            .fetch_optional(&self.pool),
        )
        .await?
        .ok_or_else(|| CrmError::not_found("Vendor not found"))
    }

    pub async fn delete_vendor(&self, id: i64) -> Result<()> {
        let result = self
            .timed(sqlx::query("DELETE FROM vendors WHERE id = $1").bind(id).execute(&self.pool))
            .await?;
        if result.rows_affected() == 0 {
            return Err(CrmError::not_found("Vendor not found"));
        }
        Ok(())
    }

    pub async fn vendor_stats(&self) -> Result<PartnerStats> {
        let stats = self
            .timed(sqlx::query_as::<_, PartnerStats>(&stats_sql("vendors")).fetch_one(&self.pool))
            .await?;
        Ok(stats)
    }

    pub async fn vendor_categories(&self) -> Result<Vec<CategoryCount>> {
        let rows = self
            .timed(
                sqlx::query_as::<_, CategoryCount>(
                    r#"
                    SELECT category, COUNT(*) AS count
                    FROM vendors
                    WHERE category IS NOT NULL
                    GROUP BY category
                    ORDER BY count DESC, category
                    "#,
                )
                .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows)
    }

    // -----------------------------------------------------------------------
    // Suppliers
    // -----------------------------------------------------------------------

    pub async fn list_suppliers(&self, active_only: bool) -> Result<Vec<Supplier>> {
        let rows = self
            .timed(
                sqlx::query_as::<_, Supplier>(
                    "SELECT * FROM suppliers WHERE (NOT $1 OR status = 'active') ORDER BY name",
                )
                .bind(active_only)
                .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows)
    }

    pub async fn get_supplier(&self, id: i64) -> Result<Supplier> {
        self.timed(sqlx::query_as::<_, Supplier>("SELECT * FROM suppliers WHERE id = $1").bind(id).fetch_optional(&self.pool))
            .await?
            .ok_or_else(|| CrmError::not_found("Supplier not found"))
    }

    async fn supplier_code_taken(&self, code: &str, except_id: Option<i64>) -> Result<bool> {
        let taken: bool = self
            .timed(
                sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM suppliers WHERE supplier_code = $1 AND ($2::BIGINT IS NULL OR id <> $2))",
                )
                .bind(code)
                .bind(except_id)
                .fetch_one(&self.pool),
            )
            .await?;
        Ok(taken)
    }

    pub async fn create_supplier(&self, input: &SupplierInput) -> Result<Supplier> {
        let code = required(&input.supplier_code, "Supplier code")?;
        let name = required(&input.name, "Supplier name")?;
        let status = partner_status(input.status.as_deref())?;
        if self.supplier_code_taken(code, None).await? {
            return Err(CrmError::Conflict("Supplier code already exists".into()));
        }

        let supplier = self
            .timed(
                sqlx::query_as::<_, Supplier>(
                    r#"
                    INSERT INTO suppliers (supplier_code, name, contact_person, email, phone, address, category, status)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    RETURNING *
                    "#,
                )
                .bind(code)
                .bind(name)
                .bind(optional(&input.contact_person))
                .bind(optional(&input.email))
                .bind(optional(&input.phone))
                .bind(optional(&input.address))
                .bind(optional(&input.category))
                .bind(status)
                .fetch_one(&self.pool),
            )
            .await?;

        tracing::info!(supplier_id = supplier.id, code = %supplier.supplier_code, "Supplier created");
        Ok(supplier)
    }

    pub async fn update_supplier(&self, id: i64, input: &SupplierInput) -> Result<Supplier> {
        let code = required(&input.supplier_code, "Supplier code")?;
        let name = required(&input.name, "Supplier name")?;
        let status = partner_status(input.status.as_deref())?;
        if self.supplier_code_taken(code, Some(id)).await? {
            return Err(CrmError::Conflict("Supplier code already exists".into()));
        }

        self.timed(
            sqlx::query_as::<_, Supplier>(
                r#"
                UPDATE suppliers
                SET supplier_code = $2, name = $3, contact_person = $4, email = $5, phone = $6,
                    address = $7, category = $8, status = $9, updated_at = now()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(id)
            .bind(code)
            .bind(name)
            .bind(optional(&input.contact_person))
            .bind(optional(&input.email))
            .bind(optional(&input.phone))
            .bind(optional(&input.address))
            .bind(optional(&input.category))
            .bind(status)
            .fetch_optional(&self.pool),
        )
        .await?
        .ok_or_else(|| CrmError::not_found("Supplier not found"))
    }

    pub async fn delete_supplier(&self, id: i64) -> Result<()> {
        let result = self
            .timed(sqlx::query("DELETE FROM suppliers WHERE id = $1").bind(id).execute(&self.pool))
            .await?;
        if result.rows_affected() == 0 {
            return Err(CrmError::not_found("Supplier not found"));
        }
        Ok(())
    }

    pub async fn supplier_stats(&self) -> Result<PartnerStats> {
        let stats = self
            .timed(sqlx::query_as::<_, PartnerStats>(&stats_sql("suppliers")).fetch_one(&self.pool))
            .await?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::postgres::test_storage;

    #[test]
    fn test_partner_status() {
        assert_eq!(partner_status(None).unwrap(), "active");
        assert_eq!(partner_status(Some(" Inactive ")).unwrap(), "inactive");
        let err = partner_status(Some("archived")).unwrap_err();
        assert_eq!(err.to_string(), "Invalid status: archived");
    }

    #[test]
    fn test_required_and_optional_fields() {
        assert_eq!(required("  Lumen Lights ", "Vendor name").unwrap(), "Lumen Lights");
        let err = required("   ", "Vendor name").unwrap_err();
        assert_eq!(err.to_string(), "Vendor name is required");

        assert_eq!(optional(&Some("  ".into())), None);
        assert_eq!(optional(&Some(" decor ".into())), Some("decor"));
        assert_eq!(optional(&None), None);
    }

    fn vendor_input(name: &str, category: &str) -> VendorInput {
        VendorInput {
            name: name.to_string(),
            contact_person: Some("Asha".into()),
            email: None,
            phone: Some("  ".into()),
            address: None,
            category: Some(category.to_string()),
            status: None,
        }
    }

    #[tokio::test]
    async fn test_vendor_names_unique_ignoring_case() {
        let Some(storage) = test_storage().await else {
            return;
        };
        let tag = uuid::Uuid::new_v4().simple().to_string();
        let category = format!("cat-{}", tag);
        let vendor = storage.create_vendor(&vendor_input(&format!("Florals {}", tag), &category)).await.unwrap();
        assert_eq!(vendor.status, "active");
        assert_eq!(vendor.phone, None);

        let err = storage
            .create_vendor(&vendor_input(&format!("FLORALS {}", tag), &category))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Vendor with this name already exists");

        // Renaming to its own name is not a clash.
        let mut input = vendor_input(&format!("Florals {}", tag), &category);
        input.status = Some("inactive".into());
        let updated = storage.update_vendor(vendor.id, &input).await.unwrap();
        assert_eq!(updated.status, "inactive");

        // Category listing only returns active vendors.
        let listed = storage
            .list_vendors(&VendorQuery { category: Some(category.clone()), active_only: false })
            .await
            .unwrap();
        assert!(listed.is_empty());

        let categories = storage.vendor_categories().await.unwrap();
        assert!(categories.iter().any(|c| c.category == category && c.count == 1));

        storage.delete_vendor(vendor.id).await.unwrap();
        let err = storage.get_vendor(vendor.id).await.unwrap_err();
        assert_eq!(err.to_string(), "Vendor not found");
    }

    #[tokio::test]
    async fn test_supplier_code_unique() {
        let Some(storage) = test_storage().await else {
            return;
        };
        let code = format!("S{}", uuid::Uuid::new_v4().simple());
        let input = SupplierInput {
            supplier_code: code.clone(),
            name: "Print House".into(),
            contact_person: None,
            email: Some("orders@printhouse.test".into()),
            phone: None,
            address: None,
            category: Some("albums".into()),
            status: None,
        };
        let supplier = storage.create_supplier(&input).await.unwrap();

        let err = storage.create_supplier(&input).await.unwrap_err();
        assert_eq!(err.to_string(), "Supplier code already exists");

        let stats = storage.supplier_stats().await.unwrap();
        assert!(stats.total >= 1);
        assert!(stats.created_today >= 1);
        assert!(stats.created_this_week >= stats.created_today);
        assert_eq!(stats.total, stats.active + stats.inactive);

        storage.delete_supplier(supplier.id).await.unwrap();
        let err = storage.delete_supplier(supplier.id).await.unwrap_err();
        assert_eq!(err.to_string(), "Supplier not found");
    }
}
