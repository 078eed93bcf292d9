pub mod audit;
pub mod calculator;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod report;

pub use audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
};
pub use calculator::{
    CalculationBreakdown, CalculationInput, CalculationResult, DeterministicSubsidyCalculator,
    RecommendedPlan, SubsidyCalculator, SubsidyRequest,
};
pub use domain::consultation::{ConsultationRecord, FieldUpdate, GrantOutcome, UpdateOutcome};
pub use domain::fields::{BonusFlags, BonusItem, FieldName, MarketingChannel, ProjectType};
pub use domain::session::{ChatSession, SessionId, SessionStatus};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{ConfirmOutcome, ConsultationFlow, FlowStage, PromptDescriptor};
pub use report::{export_record, ExportRow, Progress, RecordSnapshot, SummaryLine};
