use serde::{Deserialize, Serialize};

use crate::calculator::RecommendedPlan;
use crate::domain::fields::{format_currency, FieldName, ProjectType};
use crate::report::summary::SummaryLine;

/// Fields asked before the marketing-only ones, in asking order.
pub const BASE_FIELD_ORDER: [FieldName; 10] = [
    FieldName::ProjectType,
    FieldName::Budget,
    FieldName::People,
    FieldName::Capital,
    FieldName::Revenue,
    FieldName::Certification,
    FieldName::GovernmentAward,
    FieldName::DomesticManufacture,
    FieldName::AcademiaCollaboration,
    FieldName::FactoryRegistration,
];

pub const MARKETING_FIELD_ORDER: [FieldName; 2] =
    [FieldName::MarketingType, FieldName::GrowthRevenue];

pub fn required_fields(project_type: Option<ProjectType>) -> Vec<FieldName> {
    let mut fields = BASE_FIELD_ORDER.to_vec();
    if project_type == Some(ProjectType::Marketing) {
        fields.extend(MARKETING_FIELD_ORDER);
    }
    fields
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowStage {
    Collecting { next_field: FieldName },
    AwaitingConfirmation,
    Confirmed,
    Completed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PromptDescriptor {
    AskField { field: FieldName, question: String },
    ConfirmSummary { summary: Vec<SummaryLine> },
    ReadyToCalculate,
    Completed { grant_min: u64, grant_max: u64, recommended_plans: Vec<RecommendedPlan> },
}

impl PromptDescriptor {
    pub fn render(&self) -> String {
        match self {
            Self::AskField { question, .. } => question.clone(),
            Self::ConfirmSummary { summary } => {
                let lines =
                    summary.iter().map(SummaryLine::render).collect::<Vec<_>>().join("\n");
                format!(
                    "Great, I have everything I need. Please check the details below:\n\n\
                     {lines}\n\n\
                     Reply \"confirm\" if everything is correct and I will calculate your subsidy \
                     estimate, or tell me which item to change."
                )
            }
            Self::ReadyToCalculate => {
                "All details are confirmed. Let me calculate the subsidy programs that fit you..."
                    .to_string()
            }
            Self::Completed { grant_min, grant_max, .. } => format!(
                "Your estimate is ready: {} ~ {}. Tell me if any detail changes and I will \
                 recalculate.",
                format_currency(*grant_min),
                format_currency(*grant_max)
            ),
        }
    }
}

pub fn question_for(field: FieldName) -> &'static str {
    match field {
        FieldName::ProjectType => {
            "Is your project a \"research\" (研發) or \"marketing\" (行銷) project?"
        }
        FieldName::Budget => {
            "What is the expected budget for the project? (in 萬, for example: 500萬)"
        }
        FieldName::People => "How many employees are covered by your company's labor insurance?",
        FieldName::Capital => "What is your company's paid-in capital? (in 萬)",
        FieldName::Revenue => "Roughly what is your company's annual revenue? (in 萬)",
        FieldName::Certification => {
            "Has your product or service obtained a third-party certification? (yes / no)"
        }
        FieldName::GovernmentAward => {
            "Has your company received any government award? (yes / no)"
        }
        FieldName::DomesticManufacture => "Is your product made in Taiwan (MIT)? (yes / no)",
        FieldName::AcademiaCollaboration => {
            "Does your company run an industry-academia collaboration? (yes / no)"
        }
        FieldName::FactoryRegistration => {
            "Does your company hold a factory registration? (yes / no)"
        }
        FieldName::MarketingType => {
            "Is your marketing aimed at the domestic (內銷) or export (外銷) market? Both are fine."
        }
        FieldName::GrowthRevenue => {
            "How much revenue growth do you expect the marketing activities to bring? (in 萬)"
        }
    }
}
