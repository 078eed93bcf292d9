use std::sync::Arc;

use chrono::Utc;
use grantwise_core::audit::{
    event_types, metadata_keys, AuditCategory, AuditContext, AuditOutcome, AuditSink,
    InMemoryAuditSink,
};
use grantwise_core::calculator::{CalculationResult, SubsidyRequest};
use grantwise_core::config::ConversationConfig;
use grantwise_core::domain::consultation::{ConsultationRecord, UpdateOutcome};
use grantwise_core::domain::session::{ChatSession, SessionId, SessionStatus};
use grantwise_core::errors::{ApplicationError, DomainError};
use grantwise_core::flows::{ConfirmOutcome, ConsultationFlow};
use grantwise_core::report::{export_record, ExportRow, Progress, RecordSnapshot};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::conversation::{
    acknowledgment, data_summary, result_message, welcome_message, FirstPhrase, PhraseChooser,
    SeededPhraseChooser, APOLOGY_MESSAGE, DECLINED_MESSAGE, NOT_READY_MESSAGE,
    RETURNING_GREETING, SYSTEM_PROMPT, UNDERSTOOD_MESSAGE,
};
use crate::llm::{ChatMessage, ExtractionRequest, LlmClient};
use crate::store::{InMemorySessionStore, SessionEntry, SharedEntry, HISTORY_LIMIT};
use crate::tools::{parse_intents, Intent};

pub const DEFAULT_HISTORY_WINDOW: usize = 10;

const ACTOR: &str = "consultant";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionStart {
    pub session_id: SessionId,
    pub initial_prompt: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TurnReply {
    pub reply_text: String,
    pub session_completed: bool,
    pub progress: Progress,
}

/// What the intents of one oracle reply did to the session.
#[derive(Default)]
struct TurnEffects {
    update: UpdateOutcome,
    declined: bool,
    confirmation_refused: bool,
    calculation: Option<CalculationResult>,
}

/// Drives consultations: one oracle call per user message, then deterministic state changes
/// through [`ConsultationFlow`]. The oracle never decides amounts.
pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    flow: ConsultationFlow,
    store: InMemorySessionStore,
    audit: Arc<dyn AuditSink>,
    phrases: Box<dyn PhraseChooser>,
    history_window: usize,
}

impl AgentRuntime {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            flow: ConsultationFlow::default(),
            store: InMemorySessionStore::default(),
            audit: Arc::new(InMemoryAuditSink::default()),
            phrases: Box::new(FirstPhrase),
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }

    pub fn from_config(llm: Arc<dyn LlmClient>, config: &ConversationConfig) -> Self {
        let runtime = Self::new(llm).with_history_window(config.history_window);
        match config.phrase_seed {
            Some(seed) => runtime.with_phrase_chooser(SeededPhraseChooser::new(seed)),
            None => runtime,
        }
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    pub fn with_phrase_chooser(mut self, chooser: impl PhraseChooser + 'static) -> Self {
        self.phrases = Box::new(chooser);
        self
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window.clamp(1, HISTORY_LIMIT);
        self
    }

    pub async fn start_session(&self) -> SessionStart {
        let record = ConsultationRecord::new();
        let prompt = welcome_message(&self.flow.next_prompt(&record).render());
        self.open_session(record, prompt, None).await
    }

    /// Opens a new session pre-filled with every input collected by `previous`. Confirmation
    /// and results are not carried over.
    pub async fn start_session_from(
        &self,
        previous: &SessionId,
    ) -> Result<SessionStart, ApplicationError> {
        let record = {
            let entry = self.entry(previous).await?;
            let entry = entry.lock().await;
            ConsultationRecord::seeded_from(&entry.record)
        };
        let prompt = format!("{RETURNING_GREETING}\n\n{}", self.flow.next_prompt(&record).render());
        Ok(self.open_session(record, prompt, Some(previous)).await)
    }

    async fn open_session(
        &self,
        record: ConsultationRecord,
        initial_prompt: String,
        seeded_from: Option<&SessionId>,
    ) -> SessionStart {
        let session = ChatSession::new(SessionId::generate());
        let session_id = session.id.clone();

        let mut entry = SessionEntry::new(session, record);
        entry.push_message(ChatMessage::assistant(initial_prompt.clone()));
        self.store.insert(entry).await;

        let audit = AuditContext::new(Some(session_id.clone()), Uuid::new_v4().to_string(), ACTOR);
        let mut event = audit.event(
            event_types::SESSION_STARTED,
            AuditCategory::Session,
            AuditOutcome::Success,
        );
        if let Some(previous) = seeded_from {
            event = event.with_metadata(metadata_keys::SEEDED_FROM, previous.to_string());
        }
        self.audit.emit(event);

        info!(
            event_name = "consultation.session.started",
            session_id = %session_id,
            seeded_from = seeded_from.map(|id| id.0.as_str()).unwrap_or("none"),
            "consultation session started"
        );

        SessionStart { session_id, initial_prompt }
    }

    /// One conversational turn. Oracle failures never escape: they produce an apology and
    /// leave the record untouched.
    pub async fn handle_user_text(
        &self,
        session_id: &SessionId,
        text: &str,
    ) -> Result<TurnReply, ApplicationError> {
        let shared = self.entry(session_id).await?;
        let mut entry = shared.lock().await;
        if entry.session.status == SessionStatus::Abandoned {
            return Err(ApplicationError::SessionClosed(session_id.to_string()));
        }

        let correlation_id = Uuid::new_v4().to_string();
        let audit = AuditContext::new(Some(session_id.clone()), correlation_id.clone(), ACTOR);
        info!(
            event_name = "consultation.turn.received",
            session_id = %session_id,
            correlation_id = %correlation_id,
            chars = text.chars().count(),
            "received user message"
        );

        let request = ExtractionRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            data_summary: data_summary(&entry.record),
            history: entry.recent_history(self.history_window).to_vec(),
            user_text: text.to_string(),
        };
        let extracted = match self.llm.extract(&request).await {
            Ok(reply) => parse_intents(&reply.function_calls)
                .map(|intents| (reply.message, intents))
                .map_err(|error| ApplicationError::Extraction(error.to_string())),
            Err(error) => Err(ApplicationError::Extraction(format!("{error:#}"))),
        };

        let reply_text = match extracted {
            Ok((message, intents)) => {
                let effects = self.apply_intents(&mut entry, intents, &audit);
                self.compose_reply(&entry.record, &effects, &message)
            }
            Err(error) => {
                warn!(
                    event_name = "consultation.extraction.failed",
                    session_id = %session_id,
                    correlation_id = %correlation_id,
                    error = %error,
                    "extraction failed; record left unchanged"
                );
                self.audit.emit(
                    audit
                        .event(
                            event_types::EXTRACTION_FAILED,
                            AuditCategory::Extraction,
                            AuditOutcome::Failed,
                        )
                        .with_error(&error),
                );
                APOLOGY_MESSAGE.to_string()
            }
        };

        entry.push_message(ChatMessage::user(text));
        entry.push_message(ChatMessage::assistant(reply_text.clone()));
        entry.session.updated_at = Utc::now();

        Ok(TurnReply {
            reply_text,
            session_completed: entry.session.status == SessionStatus::Completed,
            progress: Progress::of(&entry.record),
        })
    }

    /// Updates from one reply land before its confirmation or calculation intents, so a result
    /// is always computed from the data the same reply reported.
    fn apply_intents(
        &self,
        entry: &mut SessionEntry,
        mut intents: Vec<Intent>,
        audit: &AuditContext,
    ) -> TurnEffects {
        let SessionEntry { session, record, .. } = entry;
        let mut effects = TurnEffects::default();
        intents.sort_by_key(|intent| !matches!(intent, Intent::Update(_)));

        for intent in intents {
            match intent {
                Intent::Update(update) => {
                    let outcome = self.flow.apply_update(record, &update);
                    if outcome.confirmation_invalidated {
                        self.reopen(session, audit, "data_changed");
                    }
                    if outcome.updated() {
                        self.audit.emit(
                            audit
                                .event(
                                    event_types::FIELDS_UPDATED,
                                    AuditCategory::Collection,
                                    AuditOutcome::Success,
                                )
                                .with_fields(metadata_keys::FIELDS, &outcome.applied_fields)
                                .with_fields(metadata_keys::CORRECTED, &outcome.corrected_fields),
                        );
                    }
                    effects.update.merge(outcome);
                }
                Intent::Confirm(confirmed) => {
                    let sink = self.audit.as_ref();
                    match self.flow.confirm_with_audit(record, confirmed, sink, audit) {
                        Ok(ConfirmOutcome::Confirmed) => {
                            effects.calculation = self.calculate(session, record, audit);
                        }
                        Ok(ConfirmOutcome::Declined) => {
                            self.reopen(session, audit, "confirmation_withdrawn");
                            effects.calculation = None;
                            effects.declined = true;
                        }
                        Err(error) => {
                            info!(
                                event_name = "consultation.confirmation.refused",
                                session_id = %session.id,
                                correlation_id = %audit.correlation_id,
                                error = %error,
                                "confirmation refused"
                            );
                            effects.confirmation_refused = true;
                        }
                    }
                }
                Intent::RequestCalculation => {
                    if effects.calculation.is_none() {
                        effects.calculation = self.calculate(session, record, audit);
                    }
                }
                Intent::Unrecognized(name) => {
                    debug!(
                        event_name = "consultation.oracle.unrecognized_call",
                        session_id = %session.id,
                        correlation_id = %audit.correlation_id,
                        function = %name,
                        "ignoring unrecognized oracle function call"
                    );
                }
            }
        }

        effects
    }

    /// A completed session whose data is no longer confirmed goes back to collecting. Its
    /// previous grant stays on the record until the next calculation overwrites it.
    fn reopen(&self, session: &mut ChatSession, audit: &AuditContext, reason: &'static str) {
        if session.status != SessionStatus::Completed
            || session.transition_to(SessionStatus::Active).is_err()
        {
            return;
        }

        self.audit.emit(
            audit
                .event(event_types::SESSION_REOPENED, AuditCategory::Session, AuditOutcome::Success)
                .with_metadata(metadata_keys::REASON, reason),
        );
        info!(
            event_name = "consultation.session.reopened",
            session_id = %session.id,
            correlation_id = %audit.correlation_id,
            reason,
            "completed session reopened"
        );
    }

    fn calculate(
        &self,
        session: &mut ChatSession,
        record: &mut ConsultationRecord,
        audit: &AuditContext,
    ) -> Option<CalculationResult> {
        let sink = self.audit.as_ref();
        match self.flow.request_calculation_with_audit(session, record, sink, audit) {
            Ok(result) => {
                info!(
                    event_name = "consultation.calculation.completed",
                    session_id = %session.id,
                    correlation_id = %audit.correlation_id,
                    grant_min = result.grant_min,
                    grant_max = result.grant_max,
                    plans = ?result.plan_names(),
                    "subsidy calculation completed"
                );
                Some(result)
            }
            Err(DomainError::PrematureCalculation) => {
                warn!(
                    event_name = "consultation.calculation.premature",
                    session_id = %session.id,
                    correlation_id = %audit.correlation_id,
                    "calculation requested before the data was confirmed"
                );
                None
            }
            Err(error) => {
                warn!(
                    event_name = "consultation.calculation.rejected",
                    session_id = %session.id,
                    correlation_id = %audit.correlation_id,
                    error = %error,
                    "calculation rejected"
                );
                None
            }
        }
    }

    fn compose_reply(
        &self,
        record: &ConsultationRecord,
        effects: &TurnEffects,
        oracle_message: &str,
    ) -> String {
        if let Some(result) = &effects.calculation {
            return result_message(result);
        }

        let next = self.flow.next_prompt(record).render();
        if effects.update.updated() {
            let ack = acknowledgment(record, &effects.update, self.phrases.as_ref());
            return format!("{ack}\n\n{next}");
        }
        if effects.declined {
            return format!("{DECLINED_MESSAGE}\n\n{next}");
        }
        if effects.confirmation_refused {
            return format!("{NOT_READY_MESSAGE}\n\n{next}");
        }

        match oracle_message.trim() {
            "" => format!("{UNDERSTOOD_MESSAGE}\n\n{next}"),
            message => message.to_string(),
        }
    }

    pub async fn get_record_snapshot(
        &self,
        session_id: &SessionId,
    ) -> Result<RecordSnapshot, ApplicationError> {
        let shared = self.entry(session_id).await?;
        let entry = shared.lock().await;
        Ok(RecordSnapshot::capture(&entry.session, &entry.record))
    }

    /// The record relabelled for reports, in report column order.
    pub async fn export_record(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<ExportRow>, ApplicationError> {
        let shared = self.entry(session_id).await?;
        let entry = shared.lock().await;
        Ok(export_record(&entry.record))
    }

    pub async fn history(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<ChatMessage>, ApplicationError> {
        let shared = self.entry(session_id).await?;
        let entry = shared.lock().await;
        Ok(entry.history.clone())
    }

    /// Side-effect free: no session, no record, no audit event.
    pub fn calculate_standalone(
        &self,
        request: SubsidyRequest,
    ) -> Result<CalculationResult, ApplicationError> {
        let input = request.into_input()?;
        Ok(self.flow.calculate_standalone(&input))
    }

    pub async fn list_sessions(&self) -> Vec<ChatSession> {
        self.store.sessions().await
    }

    /// The most recently touched active session, falling back to the most recent of any status.
    pub async fn latest_session(&self) -> Option<ChatSession> {
        let sessions = self.store.sessions().await;
        sessions
            .iter()
            .filter(|session| session.status == SessionStatus::Active)
            .max_by_key(|session| session.updated_at)
            .or_else(|| sessions.iter().max_by_key(|session| session.updated_at))
            .cloned()
    }

    pub async fn abandon_session(
        &self,
        session_id: &SessionId,
    ) -> Result<ChatSession, ApplicationError> {
        let shared = self.entry(session_id).await?;
        let mut entry = shared.lock().await;
        entry.session.transition_to(SessionStatus::Abandoned)?;

        let audit = AuditContext::new(Some(session_id.clone()), Uuid::new_v4().to_string(), ACTOR);
        self.audit.emit(audit.event(
            event_types::SESSION_ABANDONED,
            AuditCategory::Session,
            AuditOutcome::Success,
        ));
        info!(
            event_name = "consultation.session.abandoned",
            session_id = %session_id,
            "consultation session abandoned"
        );

        Ok(entry.session.clone())
    }

    async fn entry(
        &self,
        session_id: &SessionId,
    ) -> Result<SharedEntry, ApplicationError> {
        self.store
            .get(session_id)
            .await
            .ok_or_else(|| ApplicationError::SessionNotFound(session_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use grantwise_core::calculator::SubsidyRequest;
    use grantwise_core::domain::fields::{FieldName, ProjectType};
    use grantwise_core::domain::session::{SessionId, SessionStatus};
    use grantwise_core::errors::{ApplicationError, DomainError};
    use serde_json::json;

    use super::AgentRuntime;
    use crate::llm::{MessageRole, OracleReply, ScriptedLlmClient};

    fn runtime(oracle: ScriptedLlmClient) -> (AgentRuntime, Arc<ScriptedLlmClient>) {
        let oracle = Arc::new(oracle);
        (AgentRuntime::new(oracle.clone()), oracle)
    }

    #[tokio::test]
    async fn start_session_greets_and_asks_project_type() {
        let (runtime, _) = runtime(ScriptedLlmClient::new());
        let start = runtime.start_session().await;

        assert!(start.initial_prompt.starts_with("Hello!"));
        assert!(start.initial_prompt.contains("\"research\" (研發)"));

        let history = runtime.history(&start.session_id).await.expect("session exists");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn update_is_acknowledged_and_followed_by_next_question() {
        let (runtime, _) = runtime(ScriptedLlmClient::new().with_reply(OracleReply::call(
            "update_subsidy_data",
            json!({ "project_type": "研發" }),
        )));
        let start = runtime.start_session().await;

        let reply = runtime.handle_user_text(&start.session_id, "研發").await.expect("turn");

        assert_eq!(
            reply.reply_text,
            "Got it, a research project.\n\nWhat is the expected budget for the project? \
             (in 萬, for example: 500萬)"
        );
        assert!(!reply.session_completed);
        assert_eq!(reply.progress.fields_completed, 1);
        assert_eq!(reply.progress.total_fields, 6);
    }

    #[tokio::test]
    async fn text_only_reply_is_passed_through() {
        let (runtime, _) = runtime(
            ScriptedLlmClient::new()
                .with_reply(OracleReply::text("SBIR is a research subsidy programme."))
                .with_reply(OracleReply::default()),
        );
        let start = runtime.start_session().await;

        let answer =
            runtime.handle_user_text(&start.session_id, "What is SBIR?").await.expect("turn");
        assert_eq!(answer.reply_text, "SBIR is a research subsidy programme.");

        let fallback = runtime.handle_user_text(&start.session_id, "hmm").await.expect("turn");
        assert!(fallback.reply_text.starts_with("I see.\n\n"));
    }

    #[tokio::test]
    async fn history_sent_to_oracle_is_windowed() {
        let oracle = ScriptedLlmClient::new();
        for _ in 0..4 {
            oracle.push_reply(OracleReply::text("ok"));
        }
        let oracle = Arc::new(oracle);
        let runtime = AgentRuntime::new(oracle.clone()).with_history_window(3);
        let start = runtime.start_session().await;

        for turn in 0..4 {
            let text = format!("turn {turn}");
            runtime.handle_user_text(&start.session_id, &text).await.expect("turn");
        }

        let requests = oracle.requests();
        assert_eq!(requests[0].history.len(), 1);
        assert_eq!(requests[3].history.len(), 3);
        assert_eq!(requests[3].history[2].content, "ok");
        assert_eq!(requests[3].user_text, "turn 3");
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let (runtime, _) = runtime(ScriptedLlmClient::new());
        let missing = SessionId("S-missing".to_string());

        let error = runtime.handle_user_text(&missing, "hi").await.expect_err("unknown session");
        assert_eq!(error, ApplicationError::SessionNotFound("S-missing".to_string()));
        assert!(runtime.get_record_snapshot(&missing).await.is_err());
    }

    #[tokio::test]
    async fn latest_session_prefers_active_ones() {
        let (runtime, _) = runtime(ScriptedLlmClient::new());
        let first = runtime.start_session().await;
        let second = runtime.start_session().await;
        runtime.abandon_session(&second.session_id).await.expect("abandon");

        let latest = runtime.latest_session().await.expect("sessions exist");
        assert_eq!(latest.id, first.session_id);

        runtime.abandon_session(&first.session_id).await.expect("abandon");
        let latest = runtime.latest_session().await.expect("sessions exist");
        assert_eq!(latest.status, SessionStatus::Abandoned);
        assert_eq!(runtime.list_sessions().await.len(), 2);
    }

    #[test]
    fn standalone_calculation_reports_missing_inputs() {
        let (runtime, _) = runtime(ScriptedLlmClient::new());
        let error = runtime
            .calculate_standalone(SubsidyRequest {
                project_type: Some(ProjectType::Research),
                budget: Some(5_000_000),
                ..SubsidyRequest::default()
            })
            .expect_err("incomplete");

        assert_eq!(
            error,
            ApplicationError::Domain(DomainError::IncompleteCalculationInput {
                missing_fields: vec![FieldName::People, FieldName::Capital, FieldName::Revenue],
            })
        );
    }
}
