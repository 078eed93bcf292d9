use serde::{Deserialize, Serialize};

use crate::domain::consultation::ConsultationRecord;

/// Coarse progress for display. The five bonus flags share one slot, counted once any of them
/// is true, so this is not the same measure as [`ConsultationRecord::collection_complete`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub fields_completed: usize,
    pub total_fields: usize,
    pub collection_complete: bool,
}

impl Progress {
    pub fn of(record: &ConsultationRecord) -> Self {
        let mut slots = vec![
            record.project_type.is_some(),
            record.budget.is_some(),
            record.people.is_some(),
            record.capital.is_some(),
            record.revenue.is_some(),
            record.bonus_count() > 0,
        ];
        if record.is_marketing() {
            slots.push(!record.marketing_type.is_empty());
            slots.push(record.growth_revenue.is_some());
        }

        Self {
            fields_completed: slots.iter().filter(|done| **done).count(),
            total_fields: slots.len(),
            collection_complete: record.collection_complete(),
        }
    }
}
