use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::fields::{MarketingChannel, ProjectType};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedPlan {
    LocalSbir,
    Citd,
    CentralSbir,
    OverseasMarketDevelopment,
    DomesticMarketingPromotion,
}

impl RecommendedPlan {
    pub fn name(self) -> &'static str {
        match self {
            Self::LocalSbir => "local SBIR",
            Self::Citd => "CITD",
            Self::CentralSbir => "central SBIR",
            Self::OverseasMarketDevelopment => "overseas market development plan",
            Self::DomesticMarketingPromotion => "domestic marketing promotion plan",
        }
    }

    pub fn localized_name(self) -> &'static str {
        match self {
            Self::LocalSbir => "地方SBIR",
            Self::Citd => "CITD",
            Self::CentralSbir => "中央SBIR",
            Self::OverseasMarketDevelopment => "開拓海外市場計畫",
            Self::DomesticMarketingPromotion => "內銷行銷推廣計畫",
        }
    }
}

pub const CITD_THRESHOLD: u64 = 1_500_000;
pub const CENTRAL_SBIR_THRESHOLD: u64 = 2_000_000;

/// `threshold` is 80% of the grant ceiling. Research plans are cumulative; marketing plans
/// follow the chosen channels, export first.
pub fn recommend_plans(
    project_type: ProjectType,
    marketing_types: &BTreeSet<MarketingChannel>,
    threshold: u64,
) -> Vec<RecommendedPlan> {
    let mut plans = Vec::new();

    match project_type {
        ProjectType::Research => {
            plans.push(RecommendedPlan::LocalSbir);
            if threshold >= CITD_THRESHOLD {
                plans.push(RecommendedPlan::Citd);
            }
            if threshold >= CENTRAL_SBIR_THRESHOLD {
                plans.push(RecommendedPlan::CentralSbir);
            }
        }
        ProjectType::Marketing => {
            if marketing_types.contains(&MarketingChannel::Export) {
                plans.push(RecommendedPlan::OverseasMarketDevelopment);
            }
            if marketing_types.contains(&MarketingChannel::Domestic) {
                plans.push(RecommendedPlan::DomesticMarketingPromotion);
            }
        }
    }

    plans
}
