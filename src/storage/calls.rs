//! Call transcriptions and their stored analysis.

use chrono::Utc;
use serde::Serialize;
use sqlx::types::Json;
use uuid::Uuid;

use super::PgStorage;
use crate::crm::call_analysis::{self, AnalysisSource, CallInsights};
use crate::error::{CrmError, Result};
use crate::llm::LanguageModel;
use crate::models::{
    CallAnalysis, CallAnalyticsRow, CallSummary, CallSummaryFilter, CallTranscription, Task,
    TranscriptionInput,
};

#[derive(Debug, Clone, Serialize)]
pub struct CallIngestResult {
    pub transcription_id: Uuid,
    pub call_id: String,
    pub analysis: CallAnalysis,
    pub analysis_source: AnalysisSource,
    pub insights: CallInsights,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallDetail {
    pub transcription: CallTranscription,
    pub analytics: Option<CallAnalyticsRow>,
}

fn validate_transcription(input: &TranscriptionInput) -> Result<()> {
    let required = [
        ("call_id", &input.call_id),
        ("client_name", &input.client_name),
        ("sales_agent", &input.sales_agent),
        ("phone_number", &input.phone_number),
        ("transcript", &input.transcript),
    ];
    if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
        return Err(CrmError::validation(format!("{} is required", field)));
    }
    if !(0.0..=1.0).contains(&input.confidence_score) {
        return Err(CrmError::validation("confidence_score must be between 0 and 1"));
    }
    if input.duration < 0 {
        return Err(CrmError::validation("duration cannot be negative"));
    }
    Ok(())
}

impl PgStorage {
    /// Store a transcription, analyse it, store the analysis and raise any
    /// follow-up tasks.
    pub async fn ingest_transcription(
        &self,
        input: &TranscriptionInput,
        model: Option<&dyn LanguageModel>,
    ) -> Result<CallIngestResult> {
        validate_transcription(input)?;

        let (analysis, source) = call_analysis::analyze(input, model).await;
        let transcription_id = Uuid::new_v4();

        let mut tx = self.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO call_transcriptions
                (id, call_id, task_id, lead_id, client_name, sales_agent, phone_number, duration,
                 recording_url, transcript, confidence_score, language)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(transcription_id)
        .bind(&input.call_id)
        .bind(input.task_id)
        .bind(input.lead_id)
        .bind(&input.client_name)
        .bind(&input.sales_agent)
        .bind(&input.phone_number)
        .bind(input.duration)
        .bind(&input.recording_url)
        .bind(&input.transcript)
        .bind(input.confidence_score)
        .bind(&input.language)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO call_analytics
                (id, call_id, overall_sentiment, sentiment_score, client_sentiment, agent_sentiment,
                 call_intent, key_topics, business_outcomes, action_items, agent_performance,
                 client_behavior, forbidden_words_detected, compliance_issues, risk_level,
                 talk_time_ratio, interruptions, silent_periods, call_quality_score,
                 quote_discussed, budget_mentioned, timeline_discussed, next_steps_agreed,
                 follow_up_required)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21, $22, $23, $24)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.call_id)
        .bind(analysis.overall_sentiment.as_str())
        .bind(analysis.sentiment_score)
        .bind(analysis.client_sentiment.as_str())
        .bind(analysis.agent_sentiment.as_str())
        .bind(&analysis.call_intent)
        .bind(&analysis.key_topics)
        .bind(&analysis.business_outcomes)
        .bind(&analysis.action_items)
        .bind(Json(&analysis.agent_performance))
        .bind(Json(&analysis.client_behavior))
        .bind(&analysis.forbidden_words_detected)
        .bind(&analysis.compliance_issues)
        .bind(analysis.risk_level.as_str())
        .bind(analysis.talk_time_ratio)
        .bind(analysis.interruptions)
        .bind(analysis.silent_periods)
        .bind(analysis.call_quality_score)
        .bind(analysis.quote_discussed)
        .bind(analysis.budget_mentioned)
        .bind(analysis.timeline_discussed)
        .bind(analysis.next_steps_agreed)
        .bind(analysis.follow_up_required)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let new_tasks = {
            let mut rng = rand::thread_rng();
            call_analysis::followup_tasks(input, &analysis, Utc::now(), &mut rng)
        };
        let mut tasks = Vec::with_capacity(new_tasks.len());
        for task in &new_tasks {
            match self.insert_task(task).await {
                Ok(task) => tasks.push(task),
                Err(e) => tracing::warn!(call_id = %input.call_id, "Call follow-up task not created: {}", e),
            }
        }

        tracing::info!(
            call_id = %input.call_id,
            source = ?source,
            sentiment = analysis.overall_sentiment.as_str(),
            risk = analysis.risk_level.as_str(),
            tasks = tasks.len(),
            "Call analysed"
        );

        Ok(CallIngestResult {
            transcription_id,
            call_id: input.call_id.clone(),
            insights: call_analysis::insights(&analysis),
            analysis,
            analysis_source: source,
            tasks,
        })
    }

    pub async fn get_call(&self, call_id: &str) -> Result<CallDetail> {
        let transcription = self
            .timed(
                sqlx::query_as::<_, CallTranscription>(
                    r#"
                    SELECT id, call_id, task_id, lead_id, client_name, sales_agent, phone_number,
                           duration, recording_url, transcript, confidence_score, language, created_at
                    FROM call_transcriptions WHERE call_id = $1
                    "#,
                )
                .bind(call_id)
                .fetch_optional(&self.pool),
            )
            .await?
            .ok_or_else(|| CrmError::not_found("Call not found"))?;

        let analytics = self
            .timed(
                sqlx::query_as::<_, CallAnalyticsRow>(
                    r#"
                    SELECT id, call_id, overall_sentiment, sentiment_score, client_sentiment,
                           agent_sentiment, call_intent, key_topics, business_outcomes, action_items,
                           agent_performance, client_behavior, forbidden_words_detected,
                           compliance_issues, risk_level, talk_time_ratio, interruptions,
                           silent_periods, call_quality_score, quote_discussed, budget_mentioned,
                           timeline_discussed, next_steps_agreed, follow_up_required, created_at
                    FROM call_analytics WHERE call_id = $1
                    "#,
                )
                .bind(call_id)
                .fetch_optional(&self.pool),
            )
            .await?;

        Ok(CallDetail {
            transcription,
            analytics,
        })
    }

    pub async fn call_summary(&self, filter: &CallSummaryFilter) -> Result<CallSummary> {
        let row: (i64, f64, f64, f64, i64, i64, i64, i64, i64) = self
            .timed(
                sqlx::query_as(
                    r#"
                    SELECT COUNT(*),
                           COALESCE(AVG(a.sentiment_score), 0)::DOUBLE PRECISION,
                           COALESCE(AVG(a.call_quality_score), 0)::DOUBLE PRECISION,
                           COALESCE(AVG(t.duration), 0)::DOUBLE PRECISION,
                           COUNT(*) FILTER (WHERE a.risk_level = 'high'),
                           COUNT(*) FILTER (WHERE a.follow_up_required),
                           COUNT(*) FILTER (WHERE a.overall_sentiment = 'positive'),
                           COUNT(*) FILTER (WHERE a.overall_sentiment = 'neutral'),
                           COUNT(*) FILTER (WHERE a.overall_sentiment = 'negative')
                    FROM call_transcriptions t
                    JOIN call_analytics a ON a.call_id = t.call_id
                    WHERE ($1::TIMESTAMPTZ IS NULL OR t.created_at >= $1)
                      AND ($2::TIMESTAMPTZ IS NULL OR t.created_at <= $2)
                      AND ($3::TEXT IS NULL OR t.sales_agent = $3)
                      AND ($4::TEXT IS NULL OR t.client_name ILIKE '%' || $4 || '%')
                    "#,
                )
                .bind(filter.from)
                .bind(filter.to)
                .bind(&filter.agent)
                .bind(&filter.client)
                .fetch_one(&self.pool),
            )
            .await?;

        Ok(CallSummary {
            total_calls: row.0,
            avg_sentiment_score: (row.1 * 100.0).round() / 100.0,
            avg_quality_score: (row.2 * 100.0).round() / 100.0,
            avg_duration_secs: row.3.round(),
            high_risk_calls: row.4,
            follow_ups_required: row.5,
            positive: row.6,
            neutral: row.7,
            negative: row.8,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;
    use crate::storage::postgres::test_storage;

    fn input(call_id: &str, transcript: &str) -> TranscriptionInput {
        TranscriptionInput {
            call_id: call_id.to_string(),
            task_id: None,
            lead_id: None,
            client_name: "Meera Shah".into(),
            sales_agent: "Vikas".into(),
            phone_number: "+91 9000000000".into(),
            duration: 420,
            recording_url: None,
            transcript: transcript.to_string(),
            confidence_score: 0.9,
            language: "en".into(),
        }
    }

    #[test]
    fn test_validate_transcription() {
        assert!(validate_transcription(&input("c1", "Agent: hello")).is_ok());
        assert_eq!(
            validate_transcription(&input("c1", "  ")).unwrap_err().to_string(),
            "transcript is required"
        );
        let mut bad = input("c1", "Agent: hi");
        bad.confidence_score = 1.5;
        assert!(validate_transcription(&bad).is_err());
    }

    #[tokio::test]
    async fn test_ingest_and_fetch_call() {
        let Some(storage) = test_storage().await else {
            return;
        };
        let call_id = format!("call-{}", Uuid::new_v4());
        let transcript = "Agent: Here is the quote for the wedding package.\n\
                          Client: The price looks fine, what is the budget for drone?\n\
                          Agent: This is a guaranteed best price ever.";
        let result = storage
            .ingest_transcription(&input(&call_id, transcript), None)
            .await
            .unwrap();
        assert_eq!(result.analysis_source, AnalysisSource::Heuristic);
        assert!(!result.analysis.forbidden_words_detected.is_empty());
        assert!(result
            .tasks
            .iter()
            .any(|t| t.category == "call_followup"));

        let detail = storage.get_call(&call_id).await.unwrap();
        assert_eq!(detail.transcription.duration, 420);
        let analytics = detail.analytics.unwrap();
        assert_eq!(analytics.risk_level, result.analysis.risk_level.as_str());

        let err = storage
            .ingest_transcription(&input(&call_id, transcript), None)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_ingest_survives_failing_model() {
        let Some(storage) = test_storage().await else {
            return;
        };
        let model = ScriptedModel::failing();
        let call_id = format!("call-{}", Uuid::new_v4());
        let result = storage
            .ingest_transcription(&input(&call_id, "Agent: hi\nClient: hello"), Some(&model))
            .await
            .unwrap();
        assert_eq!(result.analysis_source, AnalysisSource::Heuristic);

        let summary = storage
            .call_summary(&CallSummaryFilter {
                client: Some("meera".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(summary.total_calls >= 1);
    }

    #[tokio::test]
    async fn test_get_missing_call() {
        let Some(storage) = test_storage().await else {
            return;
        };
        assert!(matches!(
            storage.get_call("no-such-call").await.unwrap_err(),
            CrmError::NotFound(_)
        ));
    }
}
