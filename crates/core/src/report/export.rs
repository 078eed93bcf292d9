use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calculator::RecommendedPlan;
use crate::domain::consultation::ConsultationRecord;
use crate::domain::fields::{BonusItem, MarketingChannel, ProjectType};
use crate::domain::session::{ChatSession, SessionId, SessionStatus};

/// Serializable read-only view of a session and its record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSnapshot {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub source: String,
    pub project_type: Option<ProjectType>,
    pub budget: Option<u64>,
    pub people: Option<u32>,
    pub capital: Option<u64>,
    pub revenue: Option<u64>,
    pub has_certification: Option<bool>,
    pub has_gov_award: Option<bool>,
    pub is_mit: Option<bool>,
    pub has_industry_academia: Option<bool>,
    pub has_factory_registration: Option<bool>,
    pub bonus_count: u8,
    pub bonus_details: Vec<String>,
    pub marketing_type: BTreeSet<MarketingChannel>,
    pub growth_revenue: Option<u64>,
    pub data_confirmed: bool,
    pub grant_min: Option<u64>,
    pub grant_max: Option<u64>,
    pub recommended_plans: Vec<RecommendedPlan>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RecordSnapshot {
    pub fn capture(session: &ChatSession, record: &ConsultationRecord) -> Self {
        let grant = record.grant();
        Self {
            session_id: session.id.clone(),
            status: session.status,
            source: record.source.clone(),
            project_type: record.project_type,
            budget: record.budget,
            people: record.people,
            capital: record.capital,
            revenue: record.revenue,
            has_certification: record.bonus(BonusItem::Certification),
            has_gov_award: record.bonus(BonusItem::GovernmentAward),
            is_mit: record.bonus(BonusItem::DomesticManufacture),
            has_industry_academia: record.bonus(BonusItem::AcademiaCollaboration),
            has_factory_registration: record.bonus(BonusItem::FactoryRegistration),
            bonus_count: record.bonus_count(),
            bonus_details: record.bonus_details().to_vec(),
            marketing_type: record.marketing_type.clone(),
            growth_revenue: record.growth_revenue,
            data_confirmed: record.data_confirmed(),
            grant_min: grant.map(|grant| grant.grant_min),
            grant_max: grant.map(|grant| grant.grant_max),
            recommended_plans: grant
                .map(|grant| grant.recommended_plans.clone())
                .unwrap_or_default(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            completed_at: session.completed_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    pub label: &'static str,
    pub value: String,
}

fn row(label: &'static str, value: impl Into<String>) -> ExportRow {
    ExportRow { label, value: value.into() }
}

fn amount(value: Option<u64>) -> String {
    value.map(|value| value.to_string()).unwrap_or_default()
}

/// The report layout used by the consultants' spreadsheet: localized labels in a fixed order,
/// unset values left blank, bonus flags as 是/否.
pub fn export_record(record: &ConsultationRecord) -> Vec<ExportRow> {
    let mut rows = vec![
        row("時間戳", record.updated_at.format("%Y-%m-%d %H:%M:%S").to_string()),
        row("來源", record.source.clone()),
        row("類型選擇", record.project_type.map(ProjectType::localized_label).unwrap_or_default()),
        row("預計所需經費(元)", amount(record.budget)),
        row("公司投保人數(人)", record.people.map(|people| people.to_string()).unwrap_or_default()),
        row("公司實收資本額(元)", amount(record.capital)),
        row("公司大約年度營業額(元)", amount(record.revenue)),
    ];

    rows.extend(BonusItem::ALL.into_iter().map(|item| {
        let answer = if record.bonus(item) == Some(true) { "是" } else { "否" };
        row(item.localized_label(), answer)
    }));

    let bonus_details = record
        .bonus_flags()
        .true_items()
        .into_iter()
        .map(BonusItem::localized_label)
        .collect::<Vec<_>>()
        .join("、");
    let marketing_type = record
        .marketing_type
        .iter()
        .map(|channel| channel.localized_label())
        .collect::<Vec<_>>()
        .join(",");
    let grant = record.grant();
    let plans = grant
        .map(|grant| {
            grant
                .recommended_plans
                .iter()
                .map(|plan| plan.localized_name())
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default();

    rows.extend([
        row("加分項目數量", record.bonus_count().to_string()),
        row("加分項目詳情", bonus_details),
        row("行銷方向", marketing_type),
        row("預計行銷活動可帶來營業額成長(元)", amount(record.growth_revenue)),
        row("補助最低值(元)", amount(grant.map(|grant| grant.grant_min))),
        row("補助最高值(元)", amount(grant.map(|grant| grant.grant_max))),
        row("推薦方案名稱", plans),
    ]);

    rows
}
