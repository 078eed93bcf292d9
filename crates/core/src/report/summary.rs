use serde::{Deserialize, Serialize};

use crate::domain::consultation::ConsultationRecord;
use crate::domain::fields::{format_currency_with_wan, FieldName};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryLine {
    pub field: FieldName,
    pub label: String,
    pub value: String,
}

impl SummaryLine {
    pub fn render(&self) -> String {
        format!("- {}: {}", self.label, self.value)
    }
}

/// Current value of `field` in its display unit, or `None` while unset.
pub fn display_value(record: &ConsultationRecord, field: FieldName) -> Option<String> {
    if let Some(item) = field.bonus_item() {
        return record.bonus(item).map(|value| if value { "yes" } else { "no" }.to_string());
    }

    match field {
        FieldName::ProjectType => record.project_type.map(|kind| kind.label().to_string()),
        FieldName::Budget => record.budget.map(format_currency_with_wan),
        FieldName::People => record.people.map(|people| people.to_string()),
        FieldName::Capital => record.capital.map(format_currency_with_wan),
        FieldName::Revenue => record.revenue.map(format_currency_with_wan),
        FieldName::GrowthRevenue => record.growth_revenue.map(format_currency_with_wan),
        FieldName::MarketingType => (!record.marketing_type.is_empty()).then(|| {
            record
                .marketing_type
                .iter()
                .map(|channel| channel.label())
                .collect::<Vec<_>>()
                .join(", ")
        }),
        _ => None,
    }
}

/// One line per currently set field, in asking order.
pub fn summary_lines(record: &ConsultationRecord) -> Vec<SummaryLine> {
    FieldName::ALL
        .into_iter()
        .filter_map(|field| {
            display_value(record, field).map(|value| SummaryLine {
                field,
                label: field.label().to_string(),
                value,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{display_value, summary_lines};
    use crate::domain::consultation::{ConsultationRecord, FieldUpdate};
    use crate::domain::fields::{BonusFlags, BonusItem, FieldName, MarketingChannel, ProjectType};

    #[test]
    fn unset_fields_are_left_out_of_the_summary() {
        let mut record = ConsultationRecord::new();
        record.apply_update(&FieldUpdate {
            project_type: Some(ProjectType::Marketing),
            budget: Some(3_000_000),
            bonus: BonusFlags::default().with(BonusItem::GovernmentAward, false),
            ..FieldUpdate::default()
        });

        let fields = summary_lines(&record).into_iter().map(|line| line.field).collect::<Vec<_>>();
        assert_eq!(
            fields,
            vec![FieldName::ProjectType, FieldName::Budget, FieldName::GovernmentAward]
        );
    }

    #[test]
    fn values_use_display_units() {
        let mut record = ConsultationRecord::new();
        record.apply_update(&FieldUpdate {
            capital: Some(12_345_678),
            marketing_type: Some(BTreeSet::from([
                MarketingChannel::Export,
                MarketingChannel::Domestic,
            ])),
            bonus: BonusFlags::default().with(BonusItem::Certification, true),
            ..FieldUpdate::default()
        });

        assert_eq!(
            display_value(&record, FieldName::Capital).as_deref(),
            Some("NT$12,345,678 (1234 萬)")
        );
        assert_eq!(
            display_value(&record, FieldName::MarketingType).as_deref(),
            Some("domestic, export")
        );
        assert_eq!(display_value(&record, FieldName::Certification).as_deref(), Some("yes"));
        assert_eq!(
            summary_lines(&record)[0].render(),
            "- paid-in capital: NT$12,345,678 (1234 萬)"
        );
    }
}
