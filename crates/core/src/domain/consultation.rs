use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calculator::RecommendedPlan;
use crate::domain::fields::{BonusFlags, BonusItem, FieldName, MarketingChannel, ProjectType};

pub const DEFAULT_SOURCE: &str = "補助診斷士";

/// Partial set of field values reported by the extraction oracle. `None` means "not
/// mentioned"; an empty `marketing_type` set is treated the same way.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub project_type: Option<ProjectType>,
    pub budget: Option<u64>,
    pub people: Option<u32>,
    pub capital: Option<u64>,
    pub revenue: Option<u64>,
    pub bonus: BonusFlags,
    pub marketing_type: Option<BTreeSet<MarketingChannel>>,
    pub growth_revenue: Option<u64>,
}

impl FieldUpdate {
    pub fn is_empty(&self) -> bool {
        self.project_type.is_none()
            && self.budget.is_none()
            && self.people.is_none()
            && self.capital.is_none()
            && self.revenue.is_none()
            && self.bonus.is_empty()
            && self.marketing_type.as_ref().map_or(true, BTreeSet::is_empty)
            && self.growth_revenue.is_none()
    }
}

/// Result of [`ConsultationRecord::apply_update`]. `corrected_fields` only lists fields whose
/// previously stored value was replaced by a different one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    pub applied_fields: Vec<FieldName>,
    pub corrected_fields: Vec<FieldName>,
    pub confirmation_invalidated: bool,
}

impl UpdateOutcome {
    pub fn updated(&self) -> bool {
        !self.applied_fields.is_empty()
    }

    pub fn is_correction(&self) -> bool {
        !self.corrected_fields.is_empty()
    }

    pub fn merge(&mut self, other: UpdateOutcome) {
        for field in other.applied_fields {
            if !self.applied_fields.contains(&field) {
                self.applied_fields.push(field);
            }
        }
        for field in other.corrected_fields {
            if !self.corrected_fields.contains(&field) {
                self.corrected_fields.push(field);
            }
        }
        self.confirmation_invalidated |= other.confirmation_invalidated;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantOutcome {
    pub grant_min: u64,
    pub grant_max: u64,
    pub recommended_plans: Vec<RecommendedPlan>,
    pub calculated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsultationRecord {
    pub source: String,
    pub project_type: Option<ProjectType>,
    pub budget: Option<u64>,
    pub people: Option<u32>,
    pub capital: Option<u64>,
    pub revenue: Option<u64>,
    pub growth_revenue: Option<u64>,
    pub marketing_type: BTreeSet<MarketingChannel>,
    bonus: BonusFlags,
    bonus_count: u8,
    bonus_details: Vec<String>,
    data_confirmed: bool,
    grant: Option<GrantOutcome>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for ConsultationRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsultationRecord {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            source: DEFAULT_SOURCE.to_string(),
            project_type: None,
            budget: None,
            people: None,
            capital: None,
            revenue: None,
            growth_revenue: None,
            marketing_type: BTreeSet::new(),
            bonus: BonusFlags::default(),
            bonus_count: 0,
            bonus_details: Vec::new(),
            data_confirmed: false,
            grant: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A fresh record carrying over every collected input of `previous`. Confirmation and
    /// calculation results are not copied.
    pub fn seeded_from(previous: &ConsultationRecord) -> Self {
        let mut record = Self::new();
        record.source = previous.source.clone();
        record.project_type = previous.project_type;
        record.budget = previous.budget;
        record.people = previous.people;
        record.capital = previous.capital;
        record.revenue = previous.revenue;
        record.growth_revenue = previous.growth_revenue;
        record.marketing_type = previous.marketing_type.clone();
        record.bonus = previous.bonus;
        record.refresh_bonus_summary();
        record
    }

    pub fn bonus(&self, item: BonusItem) -> Option<bool> {
        self.bonus.get(item)
    }

    pub fn bonus_flags(&self) -> &BonusFlags {
        &self.bonus
    }

    pub fn bonus_count(&self) -> u8 {
        self.bonus_count
    }

    pub fn bonus_details(&self) -> &[String] {
        &self.bonus_details
    }

    pub fn data_confirmed(&self) -> bool {
        self.data_confirmed
    }

    pub fn grant(&self) -> Option<&GrantOutcome> {
        self.grant.as_ref()
    }

    pub fn is_marketing(&self) -> bool {
        self.project_type == Some(ProjectType::Marketing)
    }

    pub fn is_set(&self, field: FieldName) -> bool {
        match field {
            FieldName::ProjectType => self.project_type.is_some(),
            FieldName::Budget => self.budget.is_some(),
            FieldName::People => self.people.is_some(),
            FieldName::Capital => self.capital.is_some(),
            FieldName::Revenue => self.revenue.is_some(),
            FieldName::MarketingType => !self.marketing_type.is_empty(),
            FieldName::GrowthRevenue => self.growth_revenue.is_some(),
            bonus => bonus.bonus_item().is_some_and(|item| self.bonus.get(item).is_some()),
        }
    }

    /// Applies every supplied value, recording which ones replaced a different stored value.
    /// Any change to a confirmed record withdraws the confirmation.
    pub fn apply_update(&mut self, update: &FieldUpdate) -> UpdateOutcome {
        let mut outcome = UpdateOutcome::default();
        let mut changed = false;

        if let Some(value) = update.project_type {
            changed |= assign(&mut self.project_type, value, FieldName::ProjectType, &mut outcome);
        }
        if let Some(value) = update.budget {
            changed |= assign(&mut self.budget, value, FieldName::Budget, &mut outcome);
        }
        if let Some(value) = update.people {
            changed |= assign(&mut self.people, value, FieldName::People, &mut outcome);
        }
        if let Some(value) = update.capital {
            changed |= assign(&mut self.capital, value, FieldName::Capital, &mut outcome);
        }
        if let Some(value) = update.revenue {
            changed |= assign(&mut self.revenue, value, FieldName::Revenue, &mut outcome);
        }

        for (item, value) in update.bonus.answered() {
            let mut slot = self.bonus.get(item);
            changed |= assign(&mut slot, value, item.field(), &mut outcome);
            self.bonus.set(item, value);
        }

        if let Some(channels) = update.marketing_type.as_ref().filter(|set| !set.is_empty()) {
            let previous = &self.marketing_type;
            let differs = *previous != *channels;
            if differs && !previous.is_empty() {
                outcome.corrected_fields.push(FieldName::MarketingType);
            }
            outcome.applied_fields.push(FieldName::MarketingType);
            changed |= differs;
            self.marketing_type = channels.clone();
        }

        if let Some(value) = update.growth_revenue {
            changed |=
                assign(&mut self.growth_revenue, value, FieldName::GrowthRevenue, &mut outcome);
        }

        if outcome.updated() {
            self.refresh_bonus_summary();
            self.updated_at = Utc::now();
        }

        if changed && self.data_confirmed {
            self.data_confirmed = false;
            outcome.confirmation_invalidated = true;
        }

        outcome
    }

    /// Required fields still unanswered, in asking order. The bonus flags count as required
    /// here because each one is asked individually before the summary is shown.
    pub fn missing_fields(&self) -> Vec<FieldName> {
        crate::flows::states::required_fields(self.project_type)
            .into_iter()
            .filter(|field| !self.is_set(*field))
            .collect()
    }

    /// Inputs the calculation cannot run without. Unanswered bonus flags count as false.
    pub fn missing_calculation_inputs(&self) -> Vec<FieldName> {
        self.missing_fields().into_iter().filter(|field| field.bonus_item().is_none()).collect()
    }

    pub fn collection_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    pub(crate) fn mark_confirmed(&mut self, confirmed: bool) {
        self.data_confirmed = confirmed;
        self.updated_at = Utc::now();
    }

    pub(crate) fn record_grant(&mut self, grant: GrantOutcome) {
        self.updated_at = grant.calculated_at;
        self.grant = Some(grant);
    }

    fn refresh_bonus_summary(&mut self) {
        let items = self.bonus.true_items();
        self.bonus_count = items.len() as u8;
        self.bonus_details = items.into_iter().map(|item| item.label().to_string()).collect();
    }
}

fn assign<T>(slot: &mut Option<T>, value: T, field: FieldName, outcome: &mut UpdateOutcome) -> bool
where
    T: PartialEq + Copy,
{
    let differs = *slot != Some(value);
    if differs && slot.is_some() {
        outcome.corrected_fields.push(field);
    }
    outcome.applied_fields.push(field);
    *slot = Some(value);
    differs
}
