//! Service and deliverable catalogue used by quotation pricing.

use super::PgStorage;
use crate::error::{CrmError, Result};
use crate::models::{Deliverable, DeliverableInput, Service, ServiceInput};

const SERVICE_STATUSES: [&str; 2] = ["Active", "Inactive"];

fn validate_prices(prices: [f64; 3]) -> Result<()> {
    if prices.iter().any(|p| !p.is_finite() || *p < 0.0) {
        return Err(CrmError::validation("Prices must be non-negative numbers"));
    }
    Ok(())
}

pub(crate) fn validate_service(input: &ServiceInput) -> Result<()> {
    if input.servicename.trim().is_empty() {
        return Err(CrmError::validation("Service name is required"));
    }
    if !SERVICE_STATUSES.contains(&input.status.as_str()) {
        return Err(CrmError::validation("Status must be Active or Inactive"));
    }
    validate_prices([input.basic_price, input.premium_price, input.elite_price])
}

pub(crate) fn validate_deliverable(input: &DeliverableInput) -> Result<()> {
    if input.deliverable_name.trim().is_empty() {
        return Err(CrmError::validation("Deliverable name is required"));
    }
    validate_prices([
        input.basic_total_price,
        input.premium_total_price,
        input.elite_total_price,
    ])
}

impl PgStorage {
    // -----------------------------------------------------------------------
    // Services
    // -----------------------------------------------------------------------

    pub async fn list_services(&self, active_only: bool) -> Result<Vec<Service>> {
        let rows = self
            .timed(
                sqlx::query_as::<_, Service>(
                    r#"
                    SELECT id, servicename, category, description, basic_price, premium_price,
                           elite_price, status
                    FROM services
                    WHERE NOT $1::BOOLEAN OR status = 'Active'
                    ORDER BY category NULLS LAST, servicename
                    "#,
                )
                .bind(active_only)
                .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows)
    }

    pub async fn create_service(&self, input: &ServiceInput) -> Result<Service> {
        validate_service(input)?;
        let row = self
            .timed(
                sqlx::query_as::<_, Service>(
                    r#"
                    INSERT INTO services (servicename, category, description, basic_price, premium_price, elite_price, status)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    RETURNING id, servicename, category, description, basic_price, premium_price, elite_price, status
                    "#,
                )
                .bind(input.servicename.trim())
                .bind(&input.category)
                .bind(&input.description)
                .bind(input.basic_price)
                .bind(input.premium_price)
                .bind(input.elite_price)
                .bind(&input.status)
                .fetch_one(&self.pool),
            )
            .await?;
        tracing::info!(service_id = row.id, name = %row.servicename, "Service created");
        Ok(row)
    }

    pub async fn update_service(&self, id: i64, input: &ServiceInput) -> Result<Service> {
        validate_service(input)?;
        self.timed(
            sqlx::query_as::<_, Service>(
                r#"
                UPDATE services
                SET servicename = $2, category = $3, description = $4, basic_price = $5,
                    premium_price = $6, elite_price = $7, status = $8, updated_at = now()
                WHERE id = $1
                RETURNING id, servicename, category, description, basic_price, premium_price, elite_price, status
                "#,
            )
            .bind(id)
            .bind(input.servicename.trim())
            .bind(&input.category)
            .bind(&input.description)
            .bind(input.basic_price)
            .bind(input.premium_price)
            .bind(input.elite_price)
            .bind(&input.status)
            .fetch_optional(&self.pool),
        )
        .await?
        .ok_or_else(|| CrmError::not_found("Service not found"))
    }

    pub async fn delete_service(&self, id: i64) -> Result<()> {
        let deleted = self
            .timed(sqlx::query("DELETE FROM services WHERE id = $1").bind(id).execute(&self.pool))
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(CrmError::not_found("Service not found"));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Deliverables
    // -----------------------------------------------------------------------

    pub async fn list_deliverables(&self, active_only: bool) -> Result<Vec<Deliverable>> {
        let rows = self
            .timed(
                sqlx::query_as::<_, Deliverable>(
                    r#"
                    SELECT id, deliverable_name, deliverable_cat, deliverable_type, process_name,
                           basic_total_price, premium_total_price, elite_total_price, is_active
                    FROM deliverables
                    WHERE NOT $1::BOOLEAN OR is_active
                    ORDER BY deliverable_cat, deliverable_name
                    "#,
                )
                .bind(active_only)
                .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows)
    }

    pub async fn create_deliverable(&self, input: &DeliverableInput) -> Result<Deliverable> {
        validate_deliverable(input)?;
        let row = self
            .timed(
                sqlx::query_as::<_, Deliverable>(
                    r#"
                    INSERT INTO deliverables
                        (deliverable_name, deliverable_cat, deliverable_type, process_name,
                         basic_total_price, premium_total_price, elite_total_price, is_active)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    RETURNING id, deliverable_name, deliverable_cat, deliverable_type, process_name,
                              basic_total_price, premium_total_price, elite_total_price, is_active
                    "#,
                )
                .bind(input.deliverable_name.trim())
                .bind(&input.deliverable_cat)
                .bind(&input.deliverable_type)
                .bind(&input.process_name)
                .bind(input.basic_total_price)
                .bind(input.premium_total_price)
                .bind(input.elite_total_price)
                .bind(input.is_active)
                .fetch_one(&self.pool),
            )
            .await?;
        tracing::info!(deliverable_id = row.id, name = %row.deliverable_name, "Deliverable created");
        Ok(row)
    }

    pub async fn update_deliverable(&self, id: i64, input: &DeliverableInput) -> Result<Deliverable> {
        validate_deliverable(input)?;
        self.timed(
            sqlx::query_as::<_, Deliverable>(
                r#"
                UPDATE deliverables
                SET deliverable_name = $2, deliverable_cat = $3, deliverable_type = $4,
                    process_name = $5, basic_total_price = $6, premium_total_price = $7,
                    elite_total_price = $8, is_active = $9, updated_at = now()
                WHERE id = $1
                RETURNING id, deliverable_name, deliverable_cat, deliverable_type, process_name,
                          basic_total_price, premium_total_price, elite_total_price, is_active
                "#,
            )
            .bind(id)
            .bind(input.deliverable_name.trim())
            .bind(&input.deliverable_cat)
            .bind(&input.deliverable_type)
            .bind(&input.process_name)
            .bind(input.basic_total_price)
            .bind(input.premium_total_price)
            .bind(input.elite_total_price)
            .bind(input.is_active)
            .fetch_optional(&self.pool),
        )
        .await?
        .ok_or_else(|| CrmError::not_found("Deliverable not found"))
    }

    pub async fn delete_deliverable(&self, id: i64) -> Result<()> {
        let deleted = self
            .timed(sqlx::query("DELETE FROM deliverables WHERE id = $1").bind(id).execute(&self.pool))
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(CrmError::not_found("Deliverable not found"));
        }
        Ok(())
    }
}
