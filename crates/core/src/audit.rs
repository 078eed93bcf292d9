use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calculator::CalculationResult;
use crate::domain::fields::FieldName;
use crate::domain::session::SessionId;

/// Event types recorded over a consultation's lifetime.
pub mod event_types {
    pub const SESSION_STARTED: &str = "consultation.session_started";
    pub const SESSION_REOPENED: &str = "consultation.session_reopened";
    pub const SESSION_ABANDONED: &str = "consultation.session_abandoned";
    pub const FIELDS_UPDATED: &str = "consultation.fields_updated";
    pub const EXTRACTION_FAILED: &str = "consultation.extraction_failed";
    pub const CONFIRMED: &str = "consultation.confirmed";
    pub const CONFIRMATION_REJECTED: &str = "consultation.confirmation_rejected";
    pub const CALCULATED: &str = "consultation.calculated";
    pub const CALCULATION_REJECTED: &str = "consultation.calculation_rejected";
}

/// Metadata keys. Amounts are written in the smallest currency unit.
pub mod metadata_keys {
    pub const ERROR: &str = "error";
    pub const OUTCOME: &str = "outcome";
    pub const REASON: &str = "reason";
    pub const SEEDED_FROM: &str = "seeded_from";
    pub const FIELDS: &str = "fields";
    pub const CORRECTED: &str = "corrected";
    pub const GRANT_MIN: &str = "grant_min";
    pub const GRANT_MAX: &str = "grant_max";
    pub const EMPLOYEE_GRANT: &str = "employee_grant";
    pub const REVENUE_BONUS: &str = "revenue_bonus";
    pub const BONUS_AMOUNT: &str = "bonus_amount";
    pub const UPPER_LIMIT: &str = "upper_limit";
    pub const RECOMMENDED_PLANS: &str = "recommended_plans";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditCategory {
    Session,
    Collection,
    Extraction,
    Confirmation,
    Calculation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub session_id: Option<SessionId>,
    pub correlation_id: String,
    pub actor: String,
}

impl AuditContext {
    pub fn new(
        session_id: Option<SessionId>,
        correlation_id: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self { session_id, correlation_id: correlation_id.into(), actor: actor.into() }
    }

    pub fn event(
        &self,
        event_type: impl Into<String>,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> AuditEvent {
        AuditEvent::new(
            self.session_id.clone(),
            self.correlation_id.clone(),
            event_type,
            category,
            self.actor.clone(),
            outcome,
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub session_id: Option<SessionId>,
    pub correlation_id: String,
    pub event_type: String,
    pub category: AuditCategory,
    pub actor: String,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        session_id: Option<SessionId>,
        correlation_id: impl Into<String>,
        event_type: impl Into<String>,
        category: AuditCategory,
        actor: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            session_id,
            correlation_id: correlation_id.into(),
            event_type: event_type.into(),
            category,
            actor: actor.into(),
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Field names in wire form, comma separated. Empty lists are skipped.
    pub fn with_fields(self, key: &str, fields: &[FieldName]) -> Self {
        if fields.is_empty() {
            return self;
        }
        let names = fields.iter().map(|field| field.as_str()).collect::<Vec<_>>().join(",");
        self.with_metadata(key, names)
    }

    pub fn with_error(self, error: &impl Display) -> Self {
        self.with_metadata(metadata_keys::ERROR, error.to_string())
    }

    /// The grant range, the intermediate amounts and the recommended programmes.
    pub fn with_calculation(self, result: &CalculationResult) -> Self {
        let breakdown = &result.breakdown;
        self.with_metadata(metadata_keys::GRANT_MIN, result.grant_min.to_string())
            .with_metadata(metadata_keys::GRANT_MAX, result.grant_max.to_string())
            .with_metadata(metadata_keys::EMPLOYEE_GRANT, breakdown.employee_grant.to_string())
            .with_metadata(metadata_keys::REVENUE_BONUS, breakdown.revenue_bonus.to_string())
            .with_metadata(metadata_keys::BONUS_AMOUNT, breakdown.bonus_amount.to_string())
            .with_metadata(metadata_keys::UPPER_LIMIT, breakdown.upper_limit.to_string())
            .with_metadata(metadata_keys::RECOMMENDED_PLANS, result.plan_names().join(","))
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn events_for(&self, session_id: &SessionId) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.session_id.as_ref() == Some(session_id))
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
