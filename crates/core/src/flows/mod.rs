pub mod engine;
pub mod states;

pub use engine::{ConfirmOutcome, ConsultationFlow};
pub use states::{question_for, required_fields, FlowStage, PromptDescriptor};
