use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectType {
    Research,
    Marketing,
}

impl ProjectType {
    pub fn label(self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Marketing => "marketing",
        }
    }

    pub fn localized_label(self) -> &'static str {
        match self {
            Self::Research => "研發",
            Self::Marketing => "行銷",
        }
    }

    /// Accepts the English names as well as the labels users type in the
    /// Traditional-Chinese conversation.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "research" | "r&d" | "rd" | "研發" => Some(Self::Research),
            "marketing" | "行銷" => Some(Self::Marketing),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketingChannel {
    Domestic,
    Export,
}

impl MarketingChannel {
    pub fn label(self) -> &'static str {
        match self {
            Self::Domestic => "domestic",
            Self::Export => "export",
        }
    }

    pub fn localized_label(self) -> &'static str {
        match self {
            Self::Domestic => "內銷",
            Self::Export => "外銷",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "domestic" | "內銷" => Some(Self::Domestic),
            "export" | "overseas" | "外銷" => Some(Self::Export),
            _ => None,
        }
    }

    /// Parses a comma separated channel list (`"內銷, 外銷"`). Returns `None` when any entry
    /// is unknown; empty entries are skipped.
    pub fn parse_list(raw: &str) -> Option<BTreeSet<Self>> {
        raw.split([',', '，', '、', '/'])
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(Self::parse)
            .collect()
    }
}

/// The five bonus flags, in the fixed order they are asked and counted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BonusItem {
    Certification,
    GovernmentAward,
    DomesticManufacture,
    AcademiaCollaboration,
    FactoryRegistration,
}

impl BonusItem {
    pub const COUNT: usize = 5;

    pub const ALL: [BonusItem; Self::COUNT] = [
        Self::Certification,
        Self::GovernmentAward,
        Self::DomesticManufacture,
        Self::AcademiaCollaboration,
        Self::FactoryRegistration,
    ];

    pub fn index(self) -> usize {
        match self {
            Self::Certification => 0,
            Self::GovernmentAward => 1,
            Self::DomesticManufacture => 2,
            Self::AcademiaCollaboration => 3,
            Self::FactoryRegistration => 4,
        }
    }

    pub fn field(self) -> FieldName {
        match self {
            Self::Certification => FieldName::Certification,
            Self::GovernmentAward => FieldName::GovernmentAward,
            Self::DomesticManufacture => FieldName::DomesticManufacture,
            Self::AcademiaCollaboration => FieldName::AcademiaCollaboration,
            Self::FactoryRegistration => FieldName::FactoryRegistration,
        }
    }

    /// Label used in `bonus_details` and in summaries.
    pub fn label(self) -> &'static str {
        match self {
            Self::Certification => "third-party certification",
            Self::GovernmentAward => "government award",
            Self::DomesticManufacture => "made in Taiwan",
            Self::AcademiaCollaboration => "industry-academia collaboration",
            Self::FactoryRegistration => "factory registration",
        }
    }

    pub fn localized_label(self) -> &'static str {
        match self {
            Self::Certification => "產品／服務取得第三方認證",
            Self::GovernmentAward => "取得政府相關獎項",
            Self::DomesticManufacture => "產品為 MIT 生產",
            Self::AcademiaCollaboration => "有做產學合作",
            Self::FactoryRegistration => "有工廠登記證",
        }
    }
}

/// Every attribute the oracle may report. Wire names match the function-call schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    ProjectType,
    Budget,
    People,
    Capital,
    Revenue,
    #[serde(rename = "has_certification")]
    Certification,
    #[serde(rename = "has_gov_award")]
    GovernmentAward,
    #[serde(rename = "is_mit")]
    DomesticManufacture,
    #[serde(rename = "has_industry_academia")]
    AcademiaCollaboration,
    #[serde(rename = "has_factory_registration")]
    FactoryRegistration,
    MarketingType,
    GrowthRevenue,
}

impl FieldName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProjectType => "project_type",
            Self::Budget => "budget",
            Self::People => "people",
            Self::Capital => "capital",
            Self::Revenue => "revenue",
            Self::Certification => "has_certification",
            Self::GovernmentAward => "has_gov_award",
            Self::DomesticManufacture => "is_mit",
            Self::AcademiaCollaboration => "has_industry_academia",
            Self::FactoryRegistration => "has_factory_registration",
            Self::MarketingType => "marketing_type",
            Self::GrowthRevenue => "growth_revenue",
        }
    }

    pub fn from_wire(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.as_str() == raw)
    }

    pub const ALL: [FieldName; 12] = [
        Self::ProjectType,
        Self::Budget,
        Self::People,
        Self::Capital,
        Self::Revenue,
        Self::Certification,
        Self::GovernmentAward,
        Self::DomesticManufacture,
        Self::AcademiaCollaboration,
        Self::FactoryRegistration,
        Self::MarketingType,
        Self::GrowthRevenue,
    ];

    pub fn bonus_item(self) -> Option<BonusItem> {
        BonusItem::ALL.into_iter().find(|item| item.field() == self)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::ProjectType => "project type",
            Self::Budget => "budget",
            Self::People => "insured headcount",
            Self::Capital => "paid-in capital",
            Self::Revenue => "annual revenue",
            Self::MarketingType => "marketing direction",
            Self::GrowthRevenue => "expected revenue growth",
            bonus => bonus.bonus_item().map(BonusItem::label).unwrap_or("bonus item"),
        }
    }

    /// Currency fields are shown in NT$ with a 萬 (ten-thousand) hint.
    pub fn is_currency(self) -> bool {
        matches!(self, Self::Budget | Self::Capital | Self::Revenue | Self::GrowthRevenue)
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tri-state storage for the five bonus flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusFlags([Option<bool>; BonusItem::COUNT]);

impl BonusFlags {
    pub fn get(&self, item: BonusItem) -> Option<bool> {
        self.0[item.index()]
    }

    pub fn set(&mut self, item: BonusItem, value: bool) {
        self.0[item.index()] = Some(value);
    }

    pub fn with(mut self, item: BonusItem, value: bool) -> Self {
        self.set(item, value);
        self
    }

    pub fn answered(&self) -> impl Iterator<Item = (BonusItem, bool)> + '_ {
        BonusItem::ALL.into_iter().filter_map(|item| self.get(item).map(|value| (item, value)))
    }

    pub fn true_items(&self) -> Vec<BonusItem> {
        BonusItem::ALL.into_iter().filter(|item| self.get(*item) == Some(true)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }
}

/// Formats an amount in the smallest currency unit as `NT$1,234,567`.
pub fn format_currency(amount: u64) -> String {
    format!("NT${}", group_thousands(amount))
}

/// `NT$5,000,000 (500 萬)`
pub fn format_currency_with_wan(amount: u64) -> String {
    format!("{} ({} 萬)", format_currency(amount), amount / 10_000)
}

pub fn group_thousands(amount: u64) -> String {
    let digits = amount.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}
