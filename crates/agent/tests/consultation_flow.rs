use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use grantwise_agent::llm::{ExtractionRequest, LlmClient, OracleReply, ScriptedLlmClient};
use grantwise_agent::runtime::AgentRuntime;
use grantwise_core::audit::{event_types, metadata_keys, InMemoryAuditSink};
use grantwise_core::calculator::RecommendedPlan;
use grantwise_core::domain::session::{SessionId, SessionStatus};
use grantwise_core::errors::ApplicationError;
use serde_json::json;

fn runtime_with(oracle: &Arc<ScriptedLlmClient>, audit: &InMemoryAuditSink) -> AgentRuntime {
    AgentRuntime::new(oracle.clone()).with_audit_sink(Arc::new(audit.clone()))
}

/// Reads the user text as a headcount and answers after a delay, recording each request.
struct HeadcountOracle {
    delay: Duration,
    requests: Mutex<Vec<ExtractionRequest>>,
}

impl HeadcountOracle {
    fn new(delay: Duration) -> Self {
        Self { delay, requests: Mutex::new(Vec::new()) }
    }

    fn requests(&self) -> Vec<ExtractionRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl LlmClient for HeadcountOracle {
    async fn extract(&self, request: &ExtractionRequest) -> anyhow::Result<OracleReply> {
        self.requests.lock().expect("requests lock").push(request.clone());
        tokio::time::sleep(self.delay).await;
        let people = request.user_text.trim().parse::<u32>()?;
        Ok(OracleReply::call("update_subsidy_data", json!({ "people": people })))
    }
}

fn research_answers(oracle: &ScriptedLlmClient) {
    oracle.push_reply(OracleReply::call(
        "update_subsidy_data",
        json!({ "project_type": "研發", "budget": 5_000_000 }),
    ));
    oracle.push_reply(OracleReply::call(
        "update_subsidy_data",
        json!({ "people": 20, "capital": "1000萬", "revenue": "30,000,000" }),
    ));
    oracle.push_reply(OracleReply::call(
        "update_subsidy_data",
        json!({
            "has_certification": true,
            "has_gov_award": "是",
            "is_mit": "yes",
            "has_industry_academia": false,
            "has_factory_registration": "否"
        }),
    ));
}

async fn collect_research_record(runtime: &AgentRuntime, session_id: &SessionId) {
    for text in ["研發，預算500萬", "20人，資本額1000萬，營收3000萬", "認證、獎項、MIT 有，其他沒有"] {
        runtime.handle_user_text(session_id, text).await.expect("turn succeeds");
    }
}

#[tokio::test]
async fn research_consultation_reaches_reference_estimate() {
    let oracle = Arc::new(ScriptedLlmClient::new());
    research_answers(&oracle);
    oracle.push_reply(OracleReply::call("confirm_data", json!({ "confirmed": true })));
    let audit = InMemoryAuditSink::default();
    let runtime = runtime_with(&oracle, &audit);

    let start = runtime.start_session().await;
    let session_id = start.session_id.clone();

    let first = runtime.handle_user_text(&session_id, "研發，預算500萬").await.expect("turn 1");
    assert!(first.reply_text.starts_with("Understood, an expected budget of about 500 萬."));
    assert!(first.reply_text.contains("labor insurance"));

    runtime.handle_user_text(&session_id, "20人，資本額1000萬，營收3000萬").await.expect("turn 2");

    let summary =
        runtime.handle_user_text(&session_id, "認證、獎項、MIT 有，其他沒有").await.expect("turn 3");
    assert!(summary.reply_text.contains("Please check the details below"));
    assert!(summary.reply_text.contains("- budget: NT$5,000,000 (500 萬)"));
    assert!(summary.progress.collection_complete);
    assert_eq!(summary.progress.fields_completed, 6);
    assert_eq!(summary.progress.total_fields, 6);
    assert!(!summary.session_completed);

    let result = runtime.handle_user_text(&session_id, "確認").await.expect("turn 4");
    assert!(result.session_completed);
    assert!(result.reply_text.contains("NT$2,887,500 ~ NT$3,850,000"));
    assert!(result.reply_text.contains("central SBIR"));

    let snapshot = runtime.get_record_snapshot(&session_id).await.expect("snapshot");
    assert_eq!(snapshot.status, SessionStatus::Completed);
    assert_eq!(snapshot.capital, Some(10_000_000));
    assert_eq!(snapshot.revenue, Some(30_000_000));
    assert_eq!(snapshot.bonus_count, 3);
    assert!(snapshot.data_confirmed);
    assert_eq!(snapshot.grant_min, Some(2_887_500));
    assert_eq!(snapshot.grant_max, Some(3_850_000));
    assert_eq!(
        snapshot.recommended_plans,
        vec![RecommendedPlan::LocalSbir, RecommendedPlan::Citd, RecommendedPlan::CentralSbir]
    );

    let export = runtime.export_record(&session_id).await.expect("export");
    let value_of = |label: &str| {
        export
            .iter()
            .find(|row| row.label == label)
            .map(|row| row.value.clone())
            .unwrap_or_default()
    };
    assert_eq!(export.len(), 19);
    assert_eq!(value_of("類型選擇"), "研發");
    assert_eq!(value_of("取得政府相關獎項"), "是");
    assert_eq!(value_of("有工廠登記證"), "否");
    assert_eq!(value_of("補助最高值(元)"), "3850000");
    assert_eq!(value_of("推薦方案名稱"), "地方SBIR,CITD,中央SBIR");

    let event_types = audit
        .events_for(&session_id)
        .into_iter()
        .map(|event| event.event_type)
        .collect::<Vec<_>>();
    assert!(event_types.contains(&"consultation.session_started".to_string()));
    assert!(event_types.contains(&"consultation.confirmed".to_string()));
    assert!(event_types.contains(&"consultation.calculated".to_string()));

    let history = runtime.history(&session_id).await.expect("history");
    assert_eq!(history.len(), 9);
    assert_eq!(oracle.requests()[3].data_summary.lines().count(), 10);
}

#[tokio::test]
async fn oracle_failure_and_bad_values_leave_record_untouched() {
    let oracle = Arc::new(
        ScriptedLlmClient::new()
            .with_failure("upstream timed out")
            .with_reply(OracleReply::call(
                "update_subsidy_data",
                json!({ "project_type": "研發", "budget": "a lot" }),
            )),
    );
    let audit = InMemoryAuditSink::default();
    let runtime = runtime_with(&oracle, &audit);
    let start = runtime.start_session().await;

    let failed = runtime.handle_user_text(&start.session_id, "研發").await.expect("degraded turn");
    assert!(failed.reply_text.starts_with("Sorry"));

    let rejected =
        runtime.handle_user_text(&start.session_id, "研發，很多錢").await.expect("degraded turn");
    assert!(rejected.reply_text.starts_with("Sorry"));
    assert_eq!(rejected.progress.fields_completed, 0);

    let snapshot = runtime.get_record_snapshot(&start.session_id).await.expect("snapshot");
    assert_eq!(snapshot.project_type, None);
    assert_eq!(snapshot.budget, None);
    assert_eq!(snapshot.status, SessionStatus::Active);

    let failures = audit
        .events_for(&start.session_id)
        .into_iter()
        .filter(|event| event.event_type == event_types::EXTRACTION_FAILED)
        .collect::<Vec<_>>();
    assert_eq!(failures.len(), 2);
    assert_eq!(
        failures[0].metadata_value(metadata_keys::ERROR),
        Some("extraction failure: upstream timed out")
    );
}

#[tokio::test]
async fn premature_calculation_is_refused_without_side_effects() {
    let oracle = Arc::new(ScriptedLlmClient::new());
    research_answers(&oracle);
    oracle.push_reply(OracleReply::call(
        "calculate_subsidy",
        json!({ "ready_to_calculate": true }),
    ));
    let audit = InMemoryAuditSink::default();
    let runtime = runtime_with(&oracle, &audit);
    let start = runtime.start_session().await;
    collect_research_record(&runtime, &start.session_id).await;

    let reply =
        runtime.handle_user_text(&start.session_id, "calculate now").await.expect("turn succeeds");

    assert!(!reply.session_completed);
    assert!(reply.reply_text.contains("Reply \"confirm\""));
    let snapshot = runtime.get_record_snapshot(&start.session_id).await.expect("snapshot");
    assert_eq!(snapshot.grant_max, None);
    assert_eq!(snapshot.status, SessionStatus::Active);
    assert!(audit
        .events_for(&start.session_id)
        .iter()
        .any(|event| event.event_type == "consultation.calculation_rejected"));
}

#[tokio::test]
async fn confirming_with_missing_fields_asks_for_them() {
    let oracle = Arc::new(
        ScriptedLlmClient::new()
            .with_reply(OracleReply::call("update_subsidy_data", json!({ "project_type": "行銷" })))
            .with_reply(OracleReply::call("confirm_data", json!({ "confirmed": true }))),
    );
    let runtime = runtime_with(&oracle, &InMemoryAuditSink::default());
    let start = runtime.start_session().await;

    let first = runtime.handle_user_text(&start.session_id, "行銷").await.expect("turn");
    assert_eq!(first.progress.total_fields, 8);

    let reply = runtime.handle_user_text(&start.session_id, "OK").await.expect("turn");
    assert!(reply.reply_text.starts_with("Before we confirm, I still need a few details."));
    assert!(reply.reply_text.contains("expected budget"));
    let snapshot = runtime.get_record_snapshot(&start.session_id).await.expect("snapshot");
    assert!(!snapshot.data_confirmed);
}

#[tokio::test]
async fn correction_after_completion_reopens_and_recalculates() {
    let oracle = Arc::new(ScriptedLlmClient::new());
    research_answers(&oracle);
    oracle.push_reply(OracleReply::call("confirm_data", json!({ "confirmed": true })));
    oracle.push_reply(OracleReply::call("update_subsidy_data", json!({ "people": 10 })));
    oracle.push_reply(OracleReply::call("confirm_data", json!({ "confirmed": true })));
    let runtime = runtime_with(&oracle, &InMemoryAuditSink::default());
    let start = runtime.start_session().await;
    collect_research_record(&runtime, &start.session_id).await;
    runtime.handle_user_text(&start.session_id, "確認").await.expect("confirmation");

    let corrected =
        runtime.handle_user_text(&start.session_id, "其實只有10人").await.expect("correction");
    assert!(corrected
        .reply_text
        .starts_with("Understood, I've updated the insured headcount to 10."));
    assert!(!corrected.session_completed);

    let snapshot = runtime.get_record_snapshot(&start.session_id).await.expect("snapshot");
    assert_eq!(snapshot.status, SessionStatus::Active);
    assert!(!snapshot.data_confirmed);
    assert_eq!(snapshot.grant_max, Some(3_850_000));

    let recalculated = runtime.handle_user_text(&start.session_id, "確認").await.expect("confirm");
    assert!(recalculated.session_completed);
    // 10 * 150,000 + 500,000 + 350,000
    assert!(recalculated.reply_text.contains("NT$1,762,500 ~ NT$2,350,000"));
}

#[tokio::test]
async fn marketing_export_only_recommends_export_plan() {
    let oracle = Arc::new(
        ScriptedLlmClient::new()
            .with_reply(OracleReply::call(
                "update_subsidy_data",
                json!({
                    "project_type": "marketing",
                    "budget": 3_000_000,
                    "people": 10,
                    "capital": 5_000_000,
                    "revenue": 20_000_000,
                    "has_certification": false,
                    "has_gov_award": false,
                    "is_mit": false,
                    "has_industry_academia": false,
                    "has_factory_registration": false,
                    "marketing_type": "外銷",
                    "growth_revenue": "500萬"
                }),
            ))
            .with_reply(OracleReply::call("confirm_data", json!({ "confirmed": true }))),
    );
    let runtime = runtime_with(&oracle, &InMemoryAuditSink::default());
    let start = runtime.start_session().await;

    let collected = runtime.handle_user_text(&start.session_id, "all at once").await.expect("turn");
    assert_eq!(collected.progress.total_fields, 8);
    assert_eq!(collected.progress.fields_completed, 7);
    assert!(collected.progress.collection_complete);

    let result = runtime.handle_user_text(&start.session_id, "確認").await.expect("turn");
    assert!(result.session_completed);
    assert!(result.reply_text.contains("overseas market development plan"));
    assert!(!result.reply_text.contains("domestic marketing promotion plan"));
}

#[tokio::test]
async fn abandoned_sessions_are_closed_and_can_seed_new_ones() {
    let oracle = Arc::new(ScriptedLlmClient::new());
    research_answers(&oracle);
    let runtime = runtime_with(&oracle, &InMemoryAuditSink::default());
    let start = runtime.start_session().await;
    collect_research_record(&runtime, &start.session_id).await;

    let abandoned = runtime.abandon_session(&start.session_id).await.expect("abandon");
    assert_eq!(abandoned.status, SessionStatus::Abandoned);

    let error = runtime.handle_user_text(&start.session_id, "hello?").await.expect_err("closed");
    assert_eq!(error, ApplicationError::SessionClosed(start.session_id.to_string()));
    assert_eq!(oracle.remaining(), 0);

    let resumed = runtime.start_session_from(&start.session_id).await.expect("seeded session");
    assert!(resumed.initial_prompt.starts_with("Welcome back!"));
    assert!(resumed.initial_prompt.contains("Please check the details below"));

    let snapshot = runtime.get_record_snapshot(&resumed.session_id).await.expect("snapshot");
    assert_eq!(snapshot.status, SessionStatus::Active);
    assert_eq!(snapshot.budget, Some(5_000_000));
    assert_eq!(snapshot.bonus_count, 3);
    assert!(!snapshot.data_confirmed);
    assert_eq!(runtime.latest_session().await.map(|session| session.id), Some(resumed.session_id));
}

#[tokio::test]
async fn correction_sent_with_confirmation_is_applied_before_calculating() {
    let oracle = Arc::new(ScriptedLlmClient::new());
    research_answers(&oracle);
    oracle.push_reply(
        OracleReply::call("confirm_data", json!({ "confirmed": true }))
            .with_call("update_subsidy_data", json!({ "people": 5 })),
    );
    let runtime = runtime_with(&oracle, &InMemoryAuditSink::default());
    let start = runtime.start_session().await;
    collect_research_record(&runtime, &start.session_id).await;

    let reply =
        runtime.handle_user_text(&start.session_id, "確認，不過只有5人").await.expect("turn");

    assert!(reply.session_completed);
    // 5 * 150,000 + 500,000 + 350,000
    assert!(reply.reply_text.contains("NT$1,200,000 ~ NT$1,600,000"), "{}", reply.reply_text);
    let snapshot = runtime.get_record_snapshot(&start.session_id).await.expect("snapshot");
    assert_eq!(snapshot.status, SessionStatus::Completed);
    assert_eq!(snapshot.people, Some(5));
    assert!(snapshot.data_confirmed);
    assert_eq!(snapshot.grant_min, Some(1_200_000));
    assert_eq!(snapshot.grant_max, Some(1_600_000));
}

#[tokio::test]
async fn declining_after_completion_reopens_the_session() {
    let oracle = Arc::new(ScriptedLlmClient::new());
    research_answers(&oracle);
    oracle.push_reply(OracleReply::call("confirm_data", json!({ "confirmed": true })));
    oracle.push_reply(OracleReply::call("confirm_data", json!({ "confirmed": false })));
    oracle.push_reply(OracleReply::call("confirm_data", json!({ "confirmed": true })));
    let audit = InMemoryAuditSink::default();
    let runtime = runtime_with(&oracle, &audit);
    let start = runtime.start_session().await;
    collect_research_record(&runtime, &start.session_id).await;
    runtime.handle_user_text(&start.session_id, "確認").await.expect("confirmation");

    let declined = runtime.handle_user_text(&start.session_id, "等等，不對").await.expect("turn");
    assert!(!declined.session_completed);
    assert!(declined.reply_text.starts_with("No problem. Tell me which detail should change."));
    assert!(declined.reply_text.contains("Please check the details below"));

    let snapshot = runtime.get_record_snapshot(&start.session_id).await.expect("snapshot");
    assert_eq!(snapshot.status, SessionStatus::Active);
    assert!(!snapshot.data_confirmed);
    assert!(audit
        .events_for(&start.session_id)
        .iter()
        .any(|event| event.event_type == event_types::SESSION_REOPENED));

    let confirmed = runtime.handle_user_text(&start.session_id, "確認").await.expect("turn");
    assert!(confirmed.session_completed);
    assert!(confirmed.reply_text.contains("NT$2,887,500 ~ NT$3,850,000"));
}

#[tokio::test]
async fn overlapping_turns_on_one_session_run_one_after_another() {
    let oracle = Arc::new(HeadcountOracle::new(Duration::from_millis(40)));
    let runtime = AgentRuntime::new(oracle.clone());
    let shared = runtime.start_session().await;
    let bystander = runtime.start_session().await;

    let (first, second) = tokio::join!(
        runtime.handle_user_text(&shared.session_id, "12"),
        runtime.handle_user_text(&shared.session_id, "30"),
    );
    first.expect("first turn");
    second.expect("second turn");

    let requests = oracle.requests();
    assert_eq!(requests.len(), 2);
    let (earlier, later) = (&requests[0], &requests[1]);
    assert_eq!(earlier.history.len(), 1);
    assert_eq!(later.history.len(), 3);
    assert_eq!(later.history[1].content, earlier.user_text);
    let headcount_line = format!("- insured headcount: {}", earlier.user_text);
    assert!(later.data_summary.contains(&headcount_line), "{}", later.data_summary);

    let snapshot = runtime.get_record_snapshot(&shared.session_id).await.expect("snapshot");
    assert_eq!(snapshot.people.map(|people| people.to_string()), Some(later.user_text.clone()));
    assert_eq!(runtime.history(&shared.session_id).await.expect("history").len(), 5);

    let untouched = runtime.get_record_snapshot(&bystander.session_id).await.expect("snapshot");
    assert_eq!(untouched.people, None);
    assert_eq!(runtime.history(&bystander.session_id).await.expect("history").len(), 1);
}

#[tokio::test]
async fn turns_on_different_sessions_stay_isolated() {
    let oracle = Arc::new(HeadcountOracle::new(Duration::from_millis(40)));
    let runtime = AgentRuntime::new(oracle.clone());
    let first = runtime.start_session().await;
    let second = runtime.start_session().await;

    let (a, b) = tokio::join!(
        runtime.handle_user_text(&first.session_id, "7"),
        runtime.handle_user_text(&second.session_id, "15"),
    );
    a.expect("first session turn");
    b.expect("second session turn");

    let requests = oracle.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|request| request.data_summary == "No data collected yet."));

    let first_snapshot = runtime.get_record_snapshot(&first.session_id).await.expect("snapshot");
    let second_snapshot = runtime.get_record_snapshot(&second.session_id).await.expect("snapshot");
    assert_eq!(first_snapshot.people, Some(7));
    assert_eq!(second_snapshot.people, Some(15));
}
