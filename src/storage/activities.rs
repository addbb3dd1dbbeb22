use super::PgStorage;
use crate::error::Result;
use crate::models::{Activity, NewActivity};

impl PgStorage {
    /// Append to the audit log. Failures are logged, never surfaced to the caller.
    pub async fn log_activity(&self, activity: NewActivity) {
        let result = self
            .timed(
                sqlx::query(
                    r#"
                    INSERT INTO activities (user_id, user_name, action_type, entity_type, entity_id, description)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(activity.user_id)
                .bind(&activity.user_name)
                .bind(activity.action_type)
                .bind(activity.entity_type)
                .bind(&activity.entity_id)
                .bind(&activity.description)
                .execute(&self.pool),
            )
            .await;

        if let Err(e) = result {
            tracing::warn!(
                entity_type = activity.entity_type,
                entity_id = %activity.entity_id,
                "Failed to record activity: {}",
                e
            );
        }
    }

    pub async fn recent_activities(&self, limit: i64) -> Result<Vec<Activity>> {
        let rows = self
            .timed(
                sqlx::query_as::<_, Activity>(
                    "SELECT * FROM activities ORDER BY created_at DESC, id DESC LIMIT $1",
                )
                .bind(limit.clamp(1, 200))
                .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use crate::models::NewActivity;
    use crate::storage::postgres::test_storage;

    #[tokio::test]
    async fn test_activity_roundtrip() {
        let Some(storage) = test_storage().await else {
            return;
        };
        let marker = uuid::Uuid::new_v4().to_string();
        storage
            .log_activity(NewActivity {
                user_id: None,
                user_name: "system".into(),
                action_type: "CREATE",
                entity_type: "lead",
                entity_id: marker.clone(),
                description: "Created lead".into(),
            })
            .await;

        let recent = storage.recent_activities(50).await.unwrap();
        assert!(recent.iter().any(|a| a.entity_id == marker));
    }
}
