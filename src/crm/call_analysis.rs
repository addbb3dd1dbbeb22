//! Call transcript analysis.
//!
//! A keyword baseline is always computed. When a model is configured its JSON
//! answer refines the sentiment, topic and behaviour fields; conversation
//! metrics and compliance always come from the transcript itself.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};

use super::task_rules::task_number;
use crate::llm::{extract_json, GenerateOptions, LanguageModel};
use crate::models::{
    AgentPerformance, CallAnalysis, ClientBehavior, Level, NewTask, Sentiment, TaskPriority,
    TranscriptionInput,
};

pub const FORBIDDEN_PHRASES: [&str; 7] = [
    "guaranteed",
    "promise",
    "definitely will",
    "best price ever",
    "limited time only",
    "must decide now",
    "final offer",
];

const POSITIVE_WORDS: [&str; 10] = [
    "great", "excellent", "happy", "love", "perfect", "wonderful", "amazing", "beautiful",
    "thank you", "sounds good",
];
const NEGATIVE_WORDS: [&str; 9] = [
    "expensive", "unhappy", "disappointed", "problem", "cancel", "too much", "not interested",
    "worried", "bad",
];
const BUYING_SIGNALS: [&str; 6] = [
    "book", "confirm", "advance", "when can we", "sounds good", "let's go ahead",
];
const OBJECTIONS: [&str; 5] = [
    "expensive", "too costly", "think about it", "other photographer", "not sure",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConversationMetrics {
    pub talk_time_ratio: f64,
    pub interruptions: i32,
    pub silent_periods: i32,
    pub quality_score: f64,
}

/// Line counts by the speaker label that opens each line.
pub fn conversation_metrics(transcript: &str, agent_name: &str) -> ConversationMetrics {
    let agent_label = format!("{}:", agent_name.trim().to_lowercase());
    let (mut agent, mut client) = (0usize, 0usize);
    for line in transcript.lines().map(|l| l.trim().to_lowercase()) {
        if line.is_empty() {
            continue;
        }
        if line.starts_with("agent:") || (agent_label.len() > 1 && line.starts_with(&agent_label)) {
            agent += 1;
        } else if line.starts_with("client:") || line.starts_with("customer:") {
            client += 1;
        }
    }
    let ratio = agent as f64 / client.max(1) as f64;
    ConversationMetrics {
        talk_time_ratio: ratio,
        interruptions: 0,
        silent_periods: 0,
        quality_score: (8.0 - (2.0 - ratio).abs()).clamp(6.0, 8.5),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Compliance {
    pub forbidden_words: Vec<String>,
    pub issues: Vec<String>,
    pub risk_level: Level,
}

pub fn compliance(transcript: &str) -> Compliance {
    let lower = transcript.to_lowercase();
    let forbidden_words: Vec<String> = FORBIDDEN_PHRASES
        .iter()
        .filter(|p| lower.contains(*p))
        .map(|p| p.to_string())
        .collect();
    let issues = if forbidden_words.is_empty() {
        Vec::new()
    } else {
        vec!["Potentially misleading language detected".to_string()]
    };
    let risk_level = match forbidden_words.len() {
        0 => Level::Low,
        1 | 2 => Level::Medium,
        _ => Level::High,
    };
    Compliance {
        forbidden_words,
        issues,
        risk_level,
    }
}

fn count_hits(text: &str, words: &[&str]) -> usize {
    words.iter().filter(|w| text.contains(*w)).count()
}

fn keyword_score(text: &str) -> f64 {
    let pos = count_hits(text, &POSITIVE_WORDS) as f64;
    let neg = count_hits(text, &NEGATIVE_WORDS) as f64;
    if pos + neg == 0.0 {
        0.0
    } else {
        (pos - neg) / (pos + neg)
    }
}

fn sentiment_of(score: f64) -> Sentiment {
    if score > 0.2 {
        Sentiment::Positive
    } else if score < -0.2 {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    }
}

fn speaker_text(transcript: &str, labels: &[&str]) -> String {
    transcript
        .lines()
        .map(|l| l.to_lowercase())
        .filter(|l| labels.iter().any(|label| l.contains(label)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Transcript-only analysis.
pub fn baseline(input: &TranscriptionInput) -> CallAnalysis {
    let lower = input.transcript.to_lowercase();
    let metrics = conversation_metrics(&input.transcript, &input.sales_agent);
    let compliance = compliance(&input.transcript);

    let agent_label = format!("{}:", input.sales_agent.trim().to_lowercase());
    let client_text = speaker_text(&input.transcript, &["client:", "customer:"]);
    let agent_text = speaker_text(&input.transcript, &["agent:", agent_label.as_str()]);

    let score = keyword_score(&lower);
    let buying_signals: Vec<String> = BUYING_SIGNALS
        .iter()
        .filter(|s| lower.contains(*s))
        .map(|s| s.to_string())
        .collect();
    let objections: Vec<String> = OBJECTIONS
        .iter()
        .filter(|s| lower.contains(*s))
        .map(|s| s.to_string())
        .collect();

    let interest_level = match buying_signals.len() {
        0 | 1 => Level::Medium,
        _ => Level::High,
    };

    let quote_discussed = ["quote", "quotation", "package", "price"]
        .iter()
        .any(|k| lower.contains(k));
    let budget_mentioned = ["budget", "afford", "₹", "lakh", "rupees"]
        .iter()
        .any(|k| lower.contains(k));
    let timeline_discussed = ["timeline", "date", "month", "schedule"]
        .iter()
        .any(|k| lower.contains(k));
    let next_steps_agreed = ["next step", "will send", "send you", "call you back", "meet on"]
        .iter()
        .any(|k| lower.contains(k));

    let mut key_topics = Vec::new();
    for (topic, keys) in [
        ("pricing", &["price", "package", "quote", "budget"][..]),
        ("wedding", &["wedding", "bride", "groom"][..]),
        ("pre_wedding", &["pre-wedding", "pre wedding"][..]),
        ("scheduling", &["date", "schedule", "timeline"][..]),
        ("deliverables", &["album", "video", "drone", "photos"][..]),
    ] {
        if keys.iter().any(|k| lower.contains(k)) {
            key_topics.push(topic.to_string());
        }
    }

    let call_intent = if quote_discussed {
        "pricing_inquiry"
    } else if lower.contains("book") {
        "booking"
    } else {
        "general_inquiry"
    };

    CallAnalysis {
        overall_sentiment: sentiment_of(score),
        sentiment_score: score,
        client_sentiment: sentiment_of(keyword_score(&client_text)),
        agent_sentiment: sentiment_of(keyword_score(&agent_text)),
        call_intent: call_intent.to_string(),
        key_topics,
        business_outcomes: Vec::new(),
        action_items: Vec::new(),
        agent_performance: AgentPerformance::default(),
        client_behavior: ClientBehavior {
            engagement_level: Level::Medium,
            interest_level,
            objections,
            buying_signals,
        },
        forbidden_words_detected: compliance.forbidden_words,
        compliance_issues: compliance.issues,
        risk_level: compliance.risk_level,
        talk_time_ratio: metrics.talk_time_ratio,
        interruptions: metrics.interruptions,
        silent_periods: metrics.silent_periods,
        call_quality_score: metrics.quality_score,
        quote_discussed,
        budget_mentioned,
        timeline_discussed,
        next_steps_agreed,
        follow_up_required: true,
    }
}

pub fn analysis_prompt(input: &TranscriptionInput) -> String {
    format!(
        "You are an expert call analytics assistant for OOAK Photography (wedding and event photography).\n\n\
         ANALYSIS REQUIREMENTS:\n\
         1. SENTIMENT: overall, client and agent sentiment (positive|negative|neutral) and a sentiment_score from -1.0 to 1.0\n\
         2. INTENT: primary call purpose as call_intent\n\
         3. TOPICS: key_topics, business_outcomes, action_items\n\
         4. BEHAVIOUR: agent_performance (professionalism, responsiveness, knowledge, closing_effectiveness on 1-10) and \
         client_behavior (engagement_level, interest_level as high|medium|low, objections, buying_signals)\n\
         5. FLAGS: quote_discussed, budget_mentioned, timeline_discussed, next_steps_agreed, follow_up_required\n\n\
         CONTEXT:\n- Client: {}\n- Agent: {}\n- Duration: {} seconds\n\n\
         Return a single JSON object with exactly these fields.\n\n\
         CALL TRANSCRIPT:\n{}\n",
        input.client_name, input.sales_agent, input.duration, input.transcript
    )
}

fn str_list(v: &Value) -> Option<Vec<String>> {
    v.as_array().map(|items| {
        items
            .iter()
            .filter_map(|i| i.as_str().map(str::to_string))
            .collect()
    })
}

fn score(v: &Value, keys: &[&str], fallback: f64) -> f64 {
    keys.iter()
        .find_map(|k| v.get(*k).and_then(Value::as_f64))
        .map(|s| s.clamp(1.0, 10.0))
        .unwrap_or(fallback)
}

/// Overlay a model's JSON answer onto the baseline. Missing or malformed
/// fields keep the baseline value.
pub fn merge_model_answer(mut analysis: CallAnalysis, answer: &Value) -> CallAnalysis {
    if let Some(s) = answer.get("overall_sentiment").and_then(Value::as_str) {
        analysis.overall_sentiment = Sentiment::parse(s);
    }
    if let Some(s) = answer.get("sentiment_score").and_then(Value::as_f64) {
        analysis.sentiment_score = s.clamp(-1.0, 1.0);
    }
    if let Some(s) = answer.get("client_sentiment").and_then(Value::as_str) {
        analysis.client_sentiment = Sentiment::parse(s);
    }
    if let Some(s) = answer.get("agent_sentiment").and_then(Value::as_str) {
        analysis.agent_sentiment = Sentiment::parse(s);
    }
    if let Some(s) = answer.get("call_intent").and_then(Value::as_str) {
        if !s.trim().is_empty() {
            analysis.call_intent = s.trim().to_string();
        }
    }
    if let Some(list) = answer.get("key_topics").and_then(str_list) {
        analysis.key_topics = list;
    }
    if let Some(list) = answer.get("business_outcomes").and_then(str_list) {
        analysis.business_outcomes = list;
    }
    if let Some(list) = answer.get("action_items").and_then(str_list) {
        analysis.action_items = list;
    }

    if let Some(perf) = answer.get("agent_performance") {
        let base = analysis.agent_performance;
        analysis.agent_performance = AgentPerformance {
            professionalism: score(perf, &["professionalism", "professionalism_score"], base.professionalism),
            responsiveness: score(perf, &["responsiveness", "responsiveness_score"], base.responsiveness),
            knowledge: score(perf, &["knowledge", "knowledge_score"], base.knowledge),
            closing_effectiveness: score(perf, &["closing_effectiveness"], base.closing_effectiveness),
        };
    }

    if let Some(behavior) = answer.get("client_behavior") {
        let cb = &mut analysis.client_behavior;
        if let Some(s) = behavior.get("engagement_level").and_then(Value::as_str) {
            cb.engagement_level = Level::parse(s);
        }
        if let Some(s) = behavior.get("interest_level").and_then(Value::as_str) {
            cb.interest_level = Level::parse(s);
        }
        if let Some(list) = behavior
            .get("objections")
            .or_else(|| behavior.get("objection_handling"))
            .and_then(str_list)
        {
            cb.objections = list;
        }
        if let Some(list) = behavior.get("buying_signals").and_then(str_list) {
            cb.buying_signals = list;
        }
    }

    for (key, flag) in [
        ("quote_discussed", &mut analysis.quote_discussed),
        ("budget_mentioned", &mut analysis.budget_mentioned),
        ("timeline_discussed", &mut analysis.timeline_discussed),
        ("next_steps_agreed", &mut analysis.next_steps_agreed),
        ("follow_up_required", &mut analysis.follow_up_required),
    ] {
        if let Some(b) = answer.get(key).and_then(Value::as_bool) {
            *flag = b;
        }
    }
    analysis
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSource {
    Heuristic,
    Model,
}

/// Baseline analysis, refined by the model when one is available and answers with JSON.
pub async fn analyze(
    input: &TranscriptionInput,
    model: Option<&dyn LanguageModel>,
) -> (CallAnalysis, AnalysisSource) {
    let analysis = baseline(input);
    let Some(model) = model else {
        return (analysis, AnalysisSource::Heuristic);
    };

    let options = GenerateOptions {
        temperature: 0.2,
        max_tokens: 1500,
        json: true,
    };
    match model.generate(&analysis_prompt(input), options).await {
        Ok(text) => match extract_json(&text) {
            Some(answer) => (merge_model_answer(analysis, &answer), AnalysisSource::Model),
            None => {
                tracing::warn!(call_id = %input.call_id, "model answer was not JSON, keeping heuristic analysis");
                (analysis, AnalysisSource::Heuristic)
            }
        },
        Err(e) => {
            tracing::warn!(call_id = %input.call_id, error = %e, "model analysis failed, keeping heuristic analysis");
            (analysis, AnalysisSource::Heuristic)
        }
    }
}

/// Tasks raised by a call that needs follow-up.
pub fn followup_tasks<R: Rng>(
    input: &TranscriptionInput,
    analysis: &CallAnalysis,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Vec<NewTask> {
    if !analysis.follow_up_required {
        return Vec::new();
    }
    let client = &input.client_name;
    let mut specs: Vec<(&str, String, String, TaskPriority, i64, f64, &str, String)> = Vec::new();

    if analysis.quote_discussed && !analysis.next_steps_agreed {
        specs.push((
            "quotation_follow_up",
            format!("Follow up on quote discussion - {}", client),
            "Client discussed quotation during call but no next steps were agreed. Follow up to clarify requirements and provide formal quote.".to_string(),
            TaskPriority::High,
            24,
            75000.0,
            "Quote Follow-up • Client Engagement • Revenue Opportunity",
            format!(
                "Call analysis indicates quote discussion without closure. Client sentiment: {}. Immediate follow-up required.",
                analysis.client_sentiment.as_str()
            ),
        ));
    }
    if analysis.client_behavior.interest_level == Level::High
        && analysis.overall_sentiment == Sentiment::Positive
    {
        specs.push((
            "lead_follow_up",
            format!("High-interest client follow-up - {}", client),
            "Client showed high interest during call with positive sentiment. Schedule detailed consultation or send portfolio.".to_string(),
            TaskPriority::Urgent,
            12,
            125000.0,
            "High-Potential Conversion • Immediate Opportunity • Revenue Priority",
            format!(
                "Call analysis shows high client interest ({}) with positive sentiment ({}). Priority follow-up required.",
                analysis.client_behavior.interest_level.as_str(),
                analysis.overall_sentiment.as_str()
            ),
        ));
    }
    if !analysis.compliance_issues.is_empty() || analysis.risk_level == Level::High {
        let issues = analysis.compliance_issues.join(", ");
        specs.push((
            "compliance_review",
            format!("Call compliance review - {}", client),
            format!(
                "Call analysis detected compliance issues that need management review. Issues: {}",
                issues
            ),
            TaskPriority::Urgent,
            4,
            0.0,
            "Compliance Risk Management • Legal Protection • Quality Assurance",
            format!(
                "Compliance issues detected: {}. Risk level: {}. Immediate management review required.",
                issues,
                analysis.risk_level.as_str()
            ),
        ));
    }

    specs
        .into_iter()
        .map(
            |(task_type, title, description, priority, hours, value, impact, reasoning)| NewTask {
                task_number: task_number(now, rng),
                title,
                description,
                priority,
                status: "PENDING".to_string(),
                due_date: now + Duration::hours(hours),
                category: "call_followup".to_string(),
                assigned_to_employee_id: None,
                assigned_by: "call_analytics".to_string(),
                lead_id: input.lead_id,
                quotation_id: None,
                client_name: Some(client.clone()),
                business_impact: impact.to_string(),
                ai_reasoning: reasoning,
                estimated_value: value,
                estimated_hours: 1.0,
                automation_source: Some(format!("call_{}_{}", input.call_id, task_type)),
                metadata: json!({
                    "call_id": input.call_id,
                    "task_type": task_type,
                    "sales_agent": input.sales_agent,
                    "sentiment": analysis.overall_sentiment.as_str(),
                    "risk_level": analysis.risk_level.as_str(),
                    "ai_generated": true,
                }),
            },
        )
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallInsights {
    pub agent_effectiveness: f64,
    pub client_satisfaction_indicator: i32,
    pub conversion_probability: f64,
    pub call_quality: f64,
    pub compliance_status: Level,
    pub follow_up_priority: i32,
}

pub fn conversion_probability(analysis: &CallAnalysis) -> f64 {
    let mut p = 0.5;
    if analysis.client_sentiment == Sentiment::Positive {
        p += 0.2;
    }
    if analysis.overall_sentiment == Sentiment::Positive {
        p += 0.1;
    }
    if analysis.client_behavior.interest_level == Level::High {
        p += 0.2;
    }
    if analysis.budget_mentioned {
        p += 0.1;
    }
    if analysis.timeline_discussed {
        p += 0.1;
    }
    if analysis.next_steps_agreed {
        p += 0.15;
    }
    p += analysis.client_behavior.buying_signals.len() as f64 * 0.05;
    p -= analysis.client_behavior.objections.len() as f64 * 0.05;
    p.clamp(0.05, 0.95)
}

pub fn insights(analysis: &CallAnalysis) -> CallInsights {
    let perf = analysis.agent_performance;
    CallInsights {
        agent_effectiveness: (perf.professionalism
            + perf.responsiveness
            + perf.knowledge
            + perf.closing_effectiveness)
            / 4.0,
        client_satisfaction_indicator: match analysis.client_sentiment {
            Sentiment::Positive => 1,
            Sentiment::Negative => -1,
            Sentiment::Neutral => 0,
        },
        conversion_probability: conversion_probability(analysis),
        call_quality: analysis.call_quality_score,
        compliance_status: analysis.risk_level,
        follow_up_priority: i32::from(analysis.follow_up_required),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn input(transcript: &str) -> TranscriptionInput {
        TranscriptionInput {
            call_id: "call-1".into(),
            task_id: None,
            lead_id: Some(4),
            client_name: "Kavya".into(),
            sales_agent: "Vikas".into(),
            phone_number: "+91 9000000000".into(),
            duration: 320,
            recording_url: None,
            transcript: transcript.into(),
            confidence_score: 0.8,
            language: "en".into(),
        }
    }

    // -------------------------------------------------------------------------
    // Heuristics
    // -------------------------------------------------------------------------

    #[test]
    fn test_conversation_metrics() {
        let t = "Agent: hello\nVikas: the package\nClient: ok\n\nAgent: more\nCustomer: fine";
        let m = conversation_metrics(t, "Vikas");
        assert_eq!(m.talk_time_ratio, 1.5);
        assert_eq!(m.quality_score, 7.5);

        let m = conversation_metrics("Agent: a\nAgent: b\nAgent: c\nAgent: d\nAgent: e\nAgent: f", "x");
        // ratio 6 against zero client lines, quality floored
        assert_eq!(m.talk_time_ratio, 6.0);
        assert_eq!(m.quality_score, 6.0);

        let m = conversation_metrics("Agent: a\nAgent: b\nClient: c", "x");
        assert_eq!(m.quality_score, 8.0);

        // A quoted label mid-line does not change the speaker.
        let m = conversation_metrics(
            "Agent: hi\nClient: the last agent: said drone was free\nClient: ok",
            "x",
        );
        assert_eq!(m.talk_time_ratio, 0.5);
    }

    #[test]
    fn test_compliance_levels() {
        assert_eq!(compliance("a normal call").risk_level, Level::Low);
        let c = compliance("I promise it is GUARANTEED");
        assert_eq!(c.risk_level, Level::Medium);
        assert_eq!(c.forbidden_words, vec!["guaranteed", "promise"]);
        assert_eq!(c.issues, vec!["Potentially misleading language detected"]);
        let c = compliance("guaranteed, promise, final offer, must decide now");
        assert_eq!(c.risk_level, Level::High);
    }

    #[test]
    fn test_baseline_flags_and_sentiment() {
        let a = baseline(&input(
            "Agent: Our premium package price is 1.25 lakh\nClient: That sounds good, we love it. Can we book for next month?\nAgent: I will send you the quote",
        ));
        assert!(a.quote_discussed);
        assert!(a.budget_mentioned);
        assert!(a.timeline_discussed);
        assert!(a.next_steps_agreed);
        assert_eq!(a.overall_sentiment, Sentiment::Positive);
        assert_eq!(a.client_sentiment, Sentiment::Positive);
        assert_eq!(a.client_behavior.interest_level, Level::High);
        assert!(a.follow_up_required);
        assert_eq!(a.agent_performance, AgentPerformance::default());
        assert!(a.key_topics.contains(&"pricing".to_string()));
    }

    #[test]
    fn test_baseline_neutral_defaults() {
        let a = baseline(&input("Agent: Hello\nClient: Hi"));
        assert_eq!(a.overall_sentiment, Sentiment::Neutral);
        assert_eq!(a.sentiment_score, 0.0);
        assert_eq!(a.client_behavior.engagement_level, Level::Medium);
        assert_eq!(a.call_intent, "general_inquiry");
    }

    // -------------------------------------------------------------------------
    // Model refinement
    // -------------------------------------------------------------------------

    #[test]
    fn test_merge_model_answer() {
        let base = baseline(&input("Agent: Hello\nClient: Hi"));
        let answer = json!({
            "overall_sentiment": "negative",
            "sentiment_score": -3.0,
            "call_intent": "complaint",
            "agent_performance": { "professionalism_score": 9, "knowledge": 12 },
            "client_behavior": { "interest_level": "low", "objection_handling": ["price"] },
            "next_steps_agreed": true,
            "key_topics": "not a list",
        });
        let merged = merge_model_answer(base.clone(), &answer);
        assert_eq!(merged.overall_sentiment, Sentiment::Negative);
        assert_eq!(merged.sentiment_score, -1.0);
        assert_eq!(merged.call_intent, "complaint");
        assert_eq!(merged.agent_performance.professionalism, 9.0);
        assert_eq!(merged.agent_performance.knowledge, 10.0);
        assert_eq!(merged.agent_performance.responsiveness, 7.0);
        assert_eq!(merged.client_behavior.interest_level, Level::Low);
        assert_eq!(merged.client_behavior.objections, vec!["price"]);
        assert!(merged.next_steps_agreed);
        assert_eq!(merged.key_topics, base.key_topics);
        assert_eq!(merged.risk_level, base.risk_level);
    }

    #[tokio::test]
    async fn test_analyze_with_and_without_model() {
        let call = input("Agent: Hello\nClient: Hi");

        let (_, source) = analyze(&call, None).await;
        assert_eq!(source, AnalysisSource::Heuristic);

        let failing = ScriptedModel::failing();
        let (a, source) = analyze(&call, Some(&failing)).await;
        assert_eq!(source, AnalysisSource::Heuristic);
        assert_eq!(a, baseline(&call));

        let model = ScriptedModel::replying(r#"{"overall_sentiment":"positive","sentiment_score":0.6}"#);
        let (a, source) = analyze(&call, Some(&model)).await;
        assert_eq!(source, AnalysisSource::Model);
        assert_eq!(a.overall_sentiment, Sentiment::Positive);
        assert!(model.prompts.lock().unwrap()[0].contains("CALL TRANSCRIPT:\nAgent: Hello"));

        let prose = ScriptedModel::replying("I cannot help with that");
        let (_, source) = analyze(&call, Some(&prose)).await;
        assert_eq!(source, AnalysisSource::Heuristic);
    }

    // -------------------------------------------------------------------------
    // Tasks and insights
    // -------------------------------------------------------------------------

    #[test]
    fn test_followup_tasks() {
        let mut rng = StdRng::seed_from_u64(9);
        let now = Utc::now();
        let call = input("x");
        let mut a = baseline(&call);

        a.quote_discussed = true;
        a.next_steps_agreed = false;
        a.client_behavior.interest_level = Level::High;
        a.overall_sentiment = Sentiment::Positive;
        a.compliance_issues = vec!["Potentially misleading language detected".into()];

        let tasks = followup_tasks(&call, &a, now, &mut rng);
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].priority, TaskPriority::High);
        assert_eq!(tasks[0].due_date, now + Duration::hours(24));
        assert_eq!(tasks[0].estimated_value, 75000.0);
        assert_eq!(tasks[1].priority, TaskPriority::Urgent);
        assert_eq!(tasks[1].estimated_value, 125000.0);
        assert_eq!(tasks[2].due_date, now + Duration::hours(4));
        assert_eq!(tasks[2].estimated_value, 0.0);
        assert!(tasks.iter().all(|t| t.category == "call_followup" && t.lead_id == Some(4)));

        a.follow_up_required = false;
        assert!(followup_tasks(&call, &a, now, &mut rng).is_empty());
    }

    #[test]
    fn test_conversion_probability_and_insights() {
        let mut a = baseline(&input("Agent: Hello\nClient: Hi"));
        assert_eq!(conversion_probability(&a), 0.5);

        a.client_sentiment = Sentiment::Positive;
        a.overall_sentiment = Sentiment::Positive;
        a.client_behavior.interest_level = Level::High;
        a.next_steps_agreed = true;
        assert_eq!(conversion_probability(&a), 0.95);

        let mut low = baseline(&input("Agent: Hello\nClient: Hi"));
        low.client_behavior.objections = vec!["a".into(); 10];
        assert_eq!(conversion_probability(&low), 0.05);

        a.agent_performance = AgentPerformance {
            professionalism: 8.0,
            responsiveness: 6.0,
            knowledge: 9.0,
            closing_effectiveness: 5.0,
        };
        let i = insights(&a);
        assert_eq!(i.agent_effectiveness, 7.0);
        assert_eq!(i.client_satisfaction_indicator, 1);
        assert_eq!(i.follow_up_priority, 1);
    }
}
