use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::audit::{
    event_types, metadata_keys, AuditCategory, AuditContext, AuditOutcome, AuditSink,
};
use crate::calculator::{
    CalculationInput, CalculationResult, DeterministicSubsidyCalculator, SubsidyCalculator,
};
use crate::domain::consultation::{ConsultationRecord, FieldUpdate, GrantOutcome, UpdateOutcome};
use crate::domain::session::{ChatSession, SessionStatus};
use crate::errors::DomainError;
use crate::flows::states::{question_for, required_fields, FlowStage, PromptDescriptor};
use crate::report::summary::summary_lines;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmOutcome {
    Confirmed,
    Declined,
}

/// The collection state machine. Stateless itself: every operation acts on the record (and
/// session) handed in, so one flow can serve any number of isolated sessions.
pub struct ConsultationFlow<C = DeterministicSubsidyCalculator> {
    calculator: C,
}

impl Default for ConsultationFlow<DeterministicSubsidyCalculator> {
    fn default() -> Self {
        Self::new(DeterministicSubsidyCalculator)
    }
}

impl<C> ConsultationFlow<C>
where
    C: SubsidyCalculator,
{
    pub fn new(calculator: C) -> Self {
        Self { calculator }
    }

    pub fn stage(&self, record: &ConsultationRecord) -> FlowStage {
        let next_field = required_fields(record.project_type)
            .into_iter()
            .find(|field| !record.is_set(*field));

        match (next_field, record.data_confirmed(), record.grant().is_some()) {
            (Some(next_field), _, _) => FlowStage::Collecting { next_field },
            (None, false, _) => FlowStage::AwaitingConfirmation,
            (None, true, false) => FlowStage::Confirmed,
            (None, true, true) => FlowStage::Completed,
        }
    }

    pub fn next_prompt(&self, record: &ConsultationRecord) -> PromptDescriptor {
        match self.stage(record) {
            FlowStage::Collecting { next_field } => PromptDescriptor::AskField {
                field: next_field,
                question: question_for(next_field).to_string(),
            },
            FlowStage::AwaitingConfirmation => {
                PromptDescriptor::ConfirmSummary { summary: summary_lines(record) }
            }
            FlowStage::Confirmed => PromptDescriptor::ReadyToCalculate,
            FlowStage::Completed => match record.grant() {
                Some(grant) => PromptDescriptor::Completed {
                    grant_min: grant.grant_min,
                    grant_max: grant.grant_max,
                    recommended_plans: grant.recommended_plans.clone(),
                },
                None => PromptDescriptor::ReadyToCalculate,
            },
        }
    }

    pub fn apply_update(
        &self,
        record: &mut ConsultationRecord,
        update: &FieldUpdate,
    ) -> UpdateOutcome {
        record.apply_update(update)
    }

    /// Confirming requires every asked field to be answered; a refusal leaves the record
    /// untouched. Declining withdraws any earlier confirmation.
    pub fn confirm(
        &self,
        record: &mut ConsultationRecord,
        confirmed: bool,
    ) -> Result<ConfirmOutcome, DomainError> {
        if !confirmed {
            record.mark_confirmed(false);
            return Ok(ConfirmOutcome::Declined);
        }

        let missing_fields = record.missing_fields();
        if !missing_fields.is_empty() {
            return Err(DomainError::PrematureConfirmation { missing_fields });
        }

        record.mark_confirmed(true);
        Ok(ConfirmOutcome::Confirmed)
    }

    /// Runs the calculation for a confirmed record, writes all grant fields at once and
    /// completes the session. Nothing is written when any precondition fails.
    pub fn request_calculation(
        &self,
        session: &mut ChatSession,
        record: &mut ConsultationRecord,
    ) -> Result<CalculationResult, DomainError> {
        if !record.data_confirmed() {
            return Err(DomainError::PrematureCalculation);
        }
        if !session.can_transition_to(SessionStatus::Completed) {
            return Err(DomainError::InvalidSessionTransition {
                from: session.status,
                to: SessionStatus::Completed,
            });
        }

        let input = CalculationInput::from_record(record)?;
        let result = self.calculator.calculate(&input);

        record.record_grant(GrantOutcome {
            grant_min: result.grant_min,
            grant_max: result.grant_max,
            recommended_plans: result.recommended_plans.clone(),
            calculated_at: Utc::now(),
        });
        session.transition_to(SessionStatus::Completed)?;

        Ok(result)
    }

    /// Confirmation immediately followed by calculation.
    pub fn finalize(
        &self,
        session: &mut ChatSession,
        record: &mut ConsultationRecord,
    ) -> Result<CalculationResult, DomainError> {
        self.confirm(record, true)?;
        self.request_calculation(session, record)
    }

    pub fn calculate_standalone(&self, input: &CalculationInput) -> CalculationResult {
        self.calculator.calculate(input)
    }

    pub fn confirm_with_audit<S>(
        &self,
        record: &mut ConsultationRecord,
        confirmed: bool,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<ConfirmOutcome, DomainError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.confirm(record, confirmed);
        let event = match &result {
            Ok(outcome) => audit
                .event(event_types::CONFIRMED, AuditCategory::Confirmation, AuditOutcome::Success)
                .with_metadata(metadata_keys::OUTCOME, format!("{outcome:?}")),
            Err(error) => audit
                .event(
                    event_types::CONFIRMATION_REJECTED,
                    AuditCategory::Confirmation,
                    AuditOutcome::Rejected,
                )
                .with_error(error),
        };
        sink.emit(event);
        result
    }

    pub fn request_calculation_with_audit<S>(
        &self,
        session: &mut ChatSession,
        record: &mut ConsultationRecord,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<CalculationResult, DomainError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.request_calculation(session, record);
        let event = match &result {
            Ok(calculation) => audit
                .event(event_types::CALCULATED, AuditCategory::Calculation, AuditOutcome::Success)
                .with_calculation(calculation),
            Err(error) => audit
                .event(
                    event_types::CALCULATION_REJECTED,
                    AuditCategory::Calculation,
                    AuditOutcome::Rejected,
                )
                .with_error(error),
        };
        sink.emit(event);
        result
    }
}
