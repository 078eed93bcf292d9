//! Function-call schema offered to the oracle, and the translation of its calls into typed
//! intents. Translation is all-or-nothing: a single argument that cannot be coerced rejects the
//! whole reply so the record is never partially updated.

use std::collections::BTreeSet;

use grantwise_core::domain::consultation::FieldUpdate;
use grantwise_core::domain::fields::{BonusItem, FieldName, MarketingChannel, ProjectType};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::llm::FunctionCall;

pub const UPDATE_FUNCTION: &str = "update_subsidy_data";
pub const CONFIRM_FUNCTION: &str = "confirm_data";
pub const CALCULATE_FUNCTION: &str = "calculate_subsidy";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Intent {
    Update(FieldUpdate),
    Confirm(bool),
    RequestCalculation,
    Unrecognized(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ToolCallError {
    #[error("`{field}` could not be read from `{value}`")]
    InvalidValue { field: FieldName, value: String },
    #[error("`{function}` is missing required argument `{argument}`")]
    MissingArgument { function: &'static str, argument: &'static str },
    #[error("`{function}` argument `{argument}` could not be read from `{value}`")]
    InvalidArgument { function: &'static str, argument: &'static str, value: String },
}

/// Parses every call of one oracle reply, in order.
pub fn parse_intents(calls: &[FunctionCall]) -> Result<Vec<Intent>, ToolCallError> {
    let mut intents = Vec::with_capacity(calls.len());
    for call in calls {
        match call.name.as_str() {
            UPDATE_FUNCTION | "update_fields" => {
                intents.push(Intent::Update(parse_field_update(&call.arguments)?));
            }
            CONFIRM_FUNCTION | "confirm" => {
                let confirmed = required_flag(&call.arguments, CONFIRM_FUNCTION, "confirmed")?;
                intents.push(Intent::Confirm(confirmed));
            }
            CALCULATE_FUNCTION | "request_calculation" => {
                let ready = match call.arguments.get("ready_to_calculate") {
                    None | Some(Value::Null) => true,
                    Some(value) => coerce_bool(value).ok_or_else(|| {
                        ToolCallError::InvalidArgument {
                            function: CALCULATE_FUNCTION,
                            argument: "ready_to_calculate",
                            value: value.to_string(),
                        }
                    })?,
                };
                if ready {
                    intents.push(Intent::RequestCalculation);
                }
            }
            other => intents.push(Intent::Unrecognized(other.to_string())),
        }
    }
    Ok(intents)
}

/// Unknown argument keys are ignored; `null` means "not mentioned".
pub fn parse_field_update(arguments: &Map<String, Value>) -> Result<FieldUpdate, ToolCallError> {
    let mut update = FieldUpdate::default();

    for (key, value) in arguments {
        if value.is_null() {
            continue;
        }
        let Some(field) = FieldName::from_wire(key) else {
            continue;
        };
        let invalid = || ToolCallError::InvalidValue { field, value: value.to_string() };

        if let Some(item) = field.bonus_item() {
            update.bonus.set(item, coerce_bool(value).ok_or_else(invalid)?);
            continue;
        }

        match field {
            FieldName::ProjectType => {
                let raw = value.as_str().ok_or_else(invalid)?;
                update.project_type = Some(ProjectType::parse(raw).ok_or_else(invalid)?);
            }
            FieldName::Budget => update.budget = Some(coerce_amount(value).ok_or_else(invalid)?),
            FieldName::Capital => update.capital = Some(coerce_amount(value).ok_or_else(invalid)?),
            FieldName::Revenue => update.revenue = Some(coerce_amount(value).ok_or_else(invalid)?),
            FieldName::GrowthRevenue => {
                update.growth_revenue = Some(coerce_amount(value).ok_or_else(invalid)?);
            }
            FieldName::People => {
                let people = coerce_amount(value).ok_or_else(invalid)?;
                update.people = Some(u32::try_from(people).map_err(|_| invalid())?);
            }
            FieldName::MarketingType => {
                update.marketing_type = Some(coerce_channels(value).ok_or_else(invalid)?);
            }
            _ => {}
        }
    }

    Ok(update)
}

fn required_flag(
    arguments: &Map<String, Value>,
    function: &'static str,
    argument: &'static str,
) -> Result<bool, ToolCallError> {
    let value = arguments
        .get(argument)
        .filter(|value| !value.is_null())
        .ok_or(ToolCallError::MissingArgument { function, argument })?;
    coerce_bool(value).ok_or_else(|| ToolCallError::InvalidArgument {
        function,
        argument,
        value: value.to_string(),
    })
}

pub fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => match number.as_u64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "是" | "有" | "對" => Some(true),
            "false" | "no" | "n" | "否" | "沒有" | "無" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Non-negative whole amount. Strings may carry thousands separators, a trailing 元, or a
/// trailing 萬 (ten thousand).
pub fn coerce_amount(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.is_finite() && *float >= 0.0 && float.fract() == 0.0)
                .map(|float| float as u64)
        }),
        Value::String(raw) => {
            let cleaned = raw.trim().replace([',', '，', ' '], "");
            let cleaned = cleaned.trim_end_matches('元');
            let (digits, multiplier) = match cleaned.strip_suffix('萬') {
                Some(rest) => (rest, 10_000),
                None => (cleaned, 1),
            };
            digits.parse::<u64>().ok()?.checked_mul(multiplier)
        }
        _ => None,
    }
}

fn coerce_channels(value: &Value) -> Option<BTreeSet<MarketingChannel>> {
    match value {
        Value::String(raw) => MarketingChannel::parse_list(raw),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().and_then(MarketingChannel::parse))
            .collect(),
        _ => None,
    }
}

/// Function declarations in the generative-language `tools` layout.
pub fn function_declarations() -> Value {
    let mut properties = Map::new();
    for field in FieldName::ALL {
        properties.insert(field.as_str().to_string(), field_schema(field));
    }

    json!([{
        "functionDeclarations": [
            {
                "name": UPDATE_FUNCTION,
                "description": "Record consultation data the user provided: project type, \
                    budget, insured headcount, capital, revenue, bonus items, marketing \
                    direction and expected revenue growth. Amounts are in NT$ (元).",
                "parameters": { "type": "object", "properties": Value::Object(properties) }
            },
            {
                "name": CONFIRM_FUNCTION,
                "description": "The user confirmed (or rejected) the full data summary.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "confirmed": {
                            "type": "boolean",
                            "description": "Whether the user confirmed the data is correct"
                        }
                    },
                    "required": ["confirmed"]
                }
            },
            {
                "name": CALCULATE_FUNCTION,
                "description": "Calculate the subsidy estimate. Only valid after the user \
                    confirmed the data.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "ready_to_calculate": {
                            "type": "boolean",
                            "description": "Whether the calculation should run now"
                        }
                    },
                    "required": ["ready_to_calculate"]
                }
            }
        ]
    }])
}

fn field_schema(field: FieldName) -> Value {
    if let Some(item) = field.bonus_item() {
        return json!({ "type": "boolean", "description": bonus_description(item) });
    }

    match field {
        FieldName::ProjectType => {
            json!({
                "type": "string",
                "description": "Project type: 研發 (research) or 行銷 (marketing)"
            })
        }
        FieldName::MarketingType => json!({
            "type": "string",
            "description": "Marketing direction: 內銷 (domestic), 外銷 (export); comma separated"
        }),
        FieldName::People => {
            json!({ "type": "integer", "description": "Employees covered by labor insurance" })
        }
        other => {
            let description =
                format!("{} in NT$ (元); convert 萬 by multiplying by 10000", other.label());
            json!({ "type": "integer", "description": description })
        }
    }
}

fn bonus_description(item: BonusItem) -> String {
    format!("Whether the company has: {} ({})", item.label(), item.localized_label())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use grantwise_core::domain::fields::{BonusItem, FieldName, MarketingChannel, ProjectType};
    use serde_json::json;

    use super::{coerce_amount, function_declarations, parse_intents, Intent, ToolCallError};
    use crate::llm::FunctionCall;

    fn call(name: &str, arguments: serde_json::Value) -> FunctionCall {
        FunctionCall::new(name, arguments)
    }

    #[test]
    fn update_call_coerces_localized_values() {
        let intents = parse_intents(&[call(
            "update_subsidy_data",
            json!({
                "project_type": "行銷",
                "budget": "500萬",
                "people": 20.0,
                "has_certification": "是",
                "is_mit": false,
                "marketing_type": "內銷, 外銷",
                "growth_revenue": null,
                "unrelated": "ignored"
            }),
        )])
        .expect("coercible arguments");

        let [Intent::Update(update)] = intents.as_slice() else {
            panic!("expected one update intent, got {intents:?}");
        };
        assert_eq!(update.project_type, Some(ProjectType::Marketing));
        assert_eq!(update.budget, Some(5_000_000));
        assert_eq!(update.people, Some(20));
        assert_eq!(update.bonus.get(BonusItem::Certification), Some(true));
        assert_eq!(update.bonus.get(BonusItem::DomesticManufacture), Some(false));
        assert_eq!(update.growth_revenue, None);
        assert_eq!(
            update.marketing_type,
            Some(BTreeSet::from([MarketingChannel::Domestic, MarketingChannel::Export]))
        );
    }

    #[test]
    fn one_bad_argument_rejects_the_whole_reply() {
        let error = parse_intents(&[
            call("confirm_data", json!({ "confirmed": true })),
            call("update_subsidy_data", json!({ "budget": 100, "revenue": "a lot" })),
        ])
        .expect_err("revenue is not a number");

        assert!(matches!(error, ToolCallError::InvalidValue { field: FieldName::Revenue, .. }));
    }

    #[test]
    fn negative_amounts_are_rejected() {
        assert_eq!(coerce_amount(&json!(-5)), None);
        assert_eq!(coerce_amount(&json!(1.5)), None);
        assert_eq!(coerce_amount(&json!("3,850,000元")), Some(3_850_000));
    }

    #[test]
    fn aliases_and_unknown_functions_are_recognized() {
        let intents = parse_intents(&[
            call("update_fields", json!({ "people": 3 })),
            call("confirm", json!({ "confirmed": "no" })),
            call("request_calculation", json!({})),
            call("calculate_subsidy", json!({ "ready_to_calculate": false })),
            call("book_meeting", json!({})),
        ])
        .expect("valid calls");

        assert!(matches!(intents[0], Intent::Update(_)));
        assert_eq!(intents[1], Intent::Confirm(false));
        assert_eq!(intents[2], Intent::RequestCalculation);
        assert_eq!(intents[3], Intent::Unrecognized("book_meeting".to_string()));
        assert_eq!(intents.len(), 4);
    }

    #[test]
    fn confirm_requires_its_flag() {
        let error = parse_intents(&[call("confirm_data", json!({}))]).expect_err("missing flag");
        assert!(matches!(error, ToolCallError::MissingArgument { argument: "confirmed", .. }));
    }

    #[test]
    fn declarations_cover_every_wire_field() {
        let declarations = function_declarations();
        let update = &declarations[0]["functionDeclarations"][0];

        assert_eq!(update["name"], json!("update_subsidy_data"));
        for field in FieldName::ALL {
            assert!(
                update["parameters"]["properties"].get(field.as_str()).is_some(),
                "{field} is not declared"
            );
        }
    }
}
