//! Deterministic subsidy estimate.
//!
//! Every amount is an integer in the smallest currency unit. Percentages are applied with
//! integer arithmetic so each division floors exactly, with no float rounding.

pub mod plans;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::consultation::ConsultationRecord;
use crate::domain::fields::{BonusItem, FieldName, MarketingChannel, ProjectType};
use crate::errors::DomainError;

pub use plans::{recommend_plans, RecommendedPlan};

pub const PER_EMPLOYEE_GRANT: u64 = 150_000;
pub const EMPLOYEE_GRANT_CAP: u64 = 3_000_000;
pub const REVENUE_BONUS_THRESHOLD: u64 = 10_000_000;
pub const REVENUE_BONUS: u64 = 500_000;
pub const BONUS_ITEM_VALUES: [u64; BonusItem::COUNT] = [100_000, 200_000, 50_000, 50_000, 50_000];
pub const GRANT_CEILING: u64 = 4_500_000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationInput {
    pub project_type: ProjectType,
    pub budget: u64,
    pub people: u32,
    pub capital: u64,
    pub revenue: u64,
    pub bonus_count: u8,
    pub marketing_types: BTreeSet<MarketingChannel>,
    pub growth_revenue: u64,
}

impl CalculationInput {
    pub fn from_record(record: &ConsultationRecord) -> Result<Self, DomainError> {
        let missing_fields = record.missing_calculation_inputs();
        let (Some(project_type), Some(budget), Some(people), Some(capital), Some(revenue)) = (
            record.project_type,
            record.budget,
            record.people,
            record.capital,
            record.revenue,
        ) else {
            return Err(DomainError::IncompleteCalculationInput { missing_fields });
        };
        if !missing_fields.is_empty() {
            return Err(DomainError::IncompleteCalculationInput { missing_fields });
        }

        Ok(Self {
            project_type,
            budget,
            people,
            capital,
            revenue,
            bonus_count: record.bonus_count(),
            marketing_types: record.marketing_type.clone(),
            growth_revenue: record.growth_revenue.unwrap_or(0),
        })
    }
}

/// Loose input for one-shot calculations outside a conversation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsidyRequest {
    pub project_type: Option<ProjectType>,
    pub budget: Option<u64>,
    pub people: Option<u32>,
    pub capital: Option<u64>,
    pub revenue: Option<u64>,
    #[serde(default)]
    pub bonus_count: u8,
    #[serde(default)]
    pub marketing_type: BTreeSet<MarketingChannel>,
    pub growth_revenue: Option<u64>,
}

impl SubsidyRequest {
    pub fn into_input(self) -> Result<CalculationInput, DomainError> {
        let mut missing_fields = Vec::new();
        let checks = [
            (FieldName::ProjectType, self.project_type.is_none()),
            (FieldName::Budget, self.budget.is_none()),
            (FieldName::People, self.people.is_none()),
            (FieldName::Capital, self.capital.is_none()),
            (FieldName::Revenue, self.revenue.is_none()),
        ];
        missing_fields.extend(checks.into_iter().filter(|(_, missing)| *missing).map(|(f, _)| f));
        if self.project_type == Some(ProjectType::Marketing) {
            if self.marketing_type.is_empty() {
                missing_fields.push(FieldName::MarketingType);
            }
            if self.growth_revenue.is_none() {
                missing_fields.push(FieldName::GrowthRevenue);
            }
        }

        let (Some(project_type), Some(budget), Some(people), Some(capital), Some(revenue)) =
            (self.project_type, self.budget, self.people, self.capital, self.revenue)
        else {
            return Err(DomainError::IncompleteCalculationInput { missing_fields });
        };
        if !missing_fields.is_empty() {
            return Err(DomainError::IncompleteCalculationInput { missing_fields });
        }

        Ok(CalculationInput {
            project_type,
            budget,
            people,
            capital,
            revenue,
            bonus_count: self.bonus_count.min(BonusItem::COUNT as u8),
            marketing_types: self.marketing_type,
            growth_revenue: self.growth_revenue.unwrap_or(0),
        })
    }
}

/// Intermediate amounts, reported for auditability only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationBreakdown {
    pub employee_grant: u64,
    pub revenue_bonus: u64,
    pub bonus_amount: u64,
    pub upper_limit: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationResult {
    pub grant_min: u64,
    pub grant_max: u64,
    pub recommended_plans: Vec<RecommendedPlan>,
    pub breakdown: CalculationBreakdown,
}

impl CalculationResult {
    pub fn plan_names(&self) -> Vec<&'static str> {
        self.recommended_plans.iter().map(|plan| plan.name()).collect()
    }
}

pub trait SubsidyCalculator: Send + Sync {
    fn calculate(&self, input: &CalculationInput) -> CalculationResult;
}

#[derive(Clone, Debug, Default)]
pub struct DeterministicSubsidyCalculator;

impl SubsidyCalculator for DeterministicSubsidyCalculator {
    fn calculate(&self, input: &CalculationInput) -> CalculationResult {
        calculate(input)
    }
}

pub fn employee_grant(people: u32) -> u64 {
    u64::from(people).saturating_mul(PER_EMPLOYEE_GRANT).min(EMPLOYEE_GRANT_CAP)
}

/// The base bonus applies first; the budget-based override then replaces it whenever its own
/// threshold holds, even when that lowers the bonus.
pub fn revenue_bonus(revenue: u64, budget: u64, employee_grant: u64) -> u64 {
    let mut bonus = 0;
    if revenue >= REVENUE_BONUS_THRESHOLD {
        bonus = REVENUE_BONUS;
    }
    if revenue >= employee_grant.saturating_mul(5) {
        bonus = budget / 10;
    }
    bonus
}

pub fn bonus_amount(bonus_count: u8) -> u64 {
    let count = usize::from(bonus_count).min(BonusItem::COUNT);
    if count == 0 {
        return 0;
    }

    let sum: u64 = BONUS_ITEM_VALUES[..count].iter().sum();
    match count {
        4 => sum * 9 / 10,
        5 => sum * 8 / 10,
        _ => sum,
    }
}

pub fn upper_limit(revenue: u64) -> u64 {
    GRANT_CEILING.min(revenue / 5)
}

pub fn calculate(input: &CalculationInput) -> CalculationResult {
    let employee_grant = employee_grant(input.people);
    let revenue_bonus = revenue_bonus(input.revenue, input.budget, employee_grant);
    let bonus_amount = bonus_amount(input.bonus_count);
    let raw_max = employee_grant.saturating_add(revenue_bonus).saturating_add(bonus_amount);
    let upper_limit = upper_limit(input.revenue);

    let grant_max = raw_max.min(upper_limit);
    let grant_min = grant_max * 3 / 4;
    let threshold = grant_max * 4 / 5;
    let recommended_plans = recommend_plans(input.project_type, &input.marketing_types, threshold);

    CalculationResult {
        grant_min,
        grant_max,
        recommended_plans,
        breakdown: CalculationBreakdown {
            employee_grant,
            revenue_bonus,
            bonus_amount,
            upper_limit,
        },
    }
}
