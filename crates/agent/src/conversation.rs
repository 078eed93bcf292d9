//! Reply composition: the oracle's system prompt, acknowledgments for recorded answers, and the
//! fixed messages of the consultation (welcome, apology, result).

use std::sync::Mutex;

use grantwise_core::calculator::CalculationResult;
use grantwise_core::domain::consultation::{ConsultationRecord, UpdateOutcome};
use grantwise_core::domain::fields::{format_currency, FieldName};
use grantwise_core::flows::states::required_fields;
use grantwise_core::report::summary::{display_value, summary_lines};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const APOLOGY_MESSAGE: &str =
    "Sorry, I ran into a technical problem understanding that. Please try again in a moment.";

pub const DECLINED_MESSAGE: &str = "No problem. Tell me which detail should change.";

pub const NOT_READY_MESSAGE: &str = "Before we confirm, I still need a few details.";

pub const UNDERSTOOD_MESSAGE: &str = "I see.";

pub const RETURNING_GREETING: &str =
    "Welcome back! I've carried over the details from your previous consultation.";

pub const ESTIMATE_DISCLAIMER: &str = "This figure is an estimate based on the information you \
    provided. Actual awards depend on the programme's annual announcement, plan review and a \
    matching self-funded share.";

pub const SYSTEM_PROMPT: &str = "You are a professional consultant for Taiwan government \
subsidy programmes. Your only job is to turn what the user says into function calls.

Rules:
- Whenever the user answers a question or volunteers information, call update_subsidy_data \
with every value mentioned, even if it is a single field. Do not only acknowledge in text.
- Users often answer in Traditional Chinese. 研發 means research, 行銷 means marketing, \
內銷 means domestic and 外銷 means export. 是 means yes and 否 means no.
- Amounts are usually given in 萬 (ten thousand). Convert them to NT$ before calling the \
function, for example 500萬 becomes 5000000.
- When the user corrects an earlier answer (\"actually the budget is 1000萬\"), call \
update_subsidy_data with the corrected value.
- When the user confirms the summary (\"confirm\", \"correct\", \"OK\", 確認, 正確, 沒問題), call \
confirm_data with confirmed=true. If they reject it without giving a correction, call \
confirm_data with confirmed=false.
- Never call calculate_subsidy before the user has confirmed the data.
- Reply in text only when the user asks a question, asks to see the collected data, or says \
something unclear. Never compute or promise subsidy amounts yourself.";

/// Picks one of several interchangeable phrasings.
pub trait PhraseChooser: Send + Sync {
    /// Returns an index below `options`; `options` is never zero.
    fn choose(&self, options: usize) -> usize;
}

/// Always the first phrasing.
#[derive(Clone, Copy, Debug, Default)]
pub struct FirstPhrase;

impl PhraseChooser for FirstPhrase {
    fn choose(&self, _options: usize) -> usize {
        0
    }
}

pub struct SeededPhraseChooser {
    rng: Mutex<StdRng>,
}

impl SeededPhraseChooser {
    pub fn new(seed: u64) -> Self {
        Self { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }
}

impl PhraseChooser for SeededPhraseChooser {
    fn choose(&self, options: usize) -> usize {
        let mut rng = match self.rng.lock() {
            Ok(rng) => rng,
            Err(poisoned) => poisoned.into_inner(),
        };
        rng.gen_range(0..options.max(1))
    }
}

fn pick(chooser: &dyn PhraseChooser, options: Vec<String>) -> String {
    let index = chooser.choose(options.len()).min(options.len().saturating_sub(1));
    options.into_iter().nth(index).unwrap_or_default()
}

fn wan(amount: Option<u64>) -> u64 {
    amount.unwrap_or(0) / 10_000
}

/// A correction names the corrected field and its new value; otherwise the acknowledgment
/// follows the furthest field (in asking order) answered this turn.
pub fn acknowledgment(
    record: &ConsultationRecord,
    outcome: &UpdateOutcome,
    chooser: &dyn PhraseChooser,
) -> String {
    if let Some(field) = outcome.corrected_fields.first().copied() {
        return correction_acknowledgment(record, field);
    }

    let order = required_fields(record.project_type);
    let furthest = outcome
        .applied_fields
        .iter()
        .copied()
        .max_by_key(|field| order.iter().position(|candidate| candidate == field));

    match furthest {
        Some(field) => pick(chooser, first_answer_phrases(record, field)),
        None => pick(chooser, generic_phrases()),
    }
}

fn correction_acknowledgment(record: &ConsultationRecord, field: FieldName) -> String {
    if field.bonus_item().is_some() {
        return "Okay, I've updated your answer.".to_string();
    }
    let value = display_value(record, field).unwrap_or_default();
    format!("Understood, I've updated the {} to {value}.", field.label())
}

fn generic_phrases() -> Vec<String> {
    ["Noted!", "Got it.", "Understood.", "Thanks, recorded."].map(String::from).to_vec()
}

fn first_answer_phrases(record: &ConsultationRecord, field: FieldName) -> Vec<String> {
    if let Some(item) = field.bonus_item() {
        return match record.bonus(item) {
            Some(true) => vec![
                format!("Great, {} counts as a bonus item.", item.label()),
                format!("Good news, {} has been recorded.", item.label()),
                "Noted, that strengthens the application.".to_string(),
            ],
            _ => generic_phrases(),
        };
    }

    match field {
        FieldName::ProjectType => {
            let kind = record.project_type.map(|kind| kind.label()).unwrap_or("your");
            vec![
                format!("Got it, a {kind} project."),
                format!("Understood, we'll look at {kind} subsidy programmes."),
                format!("Noted, you chose a {kind} project."),
            ]
        }
        FieldName::Budget => {
            let budget = wan(record.budget);
            vec![
                format!("Understood, an expected budget of about {budget} 萬."),
                format!("Got it, a budget of {budget} 萬."),
                format!("Noted, your budget is {budget} 萬."),
            ]
        }
        FieldName::People => {
            let people = record.people.unwrap_or(0);
            vec![
                format!("Okay, {people} employees are covered by labor insurance."),
                format!("Got it, a team of {people}."),
                format!("Noted, {people} insured employees."),
            ]
        }
        FieldName::Capital => {
            let capital = wan(record.capital);
            vec![
                format!("Understood, paid-in capital of {capital} 萬."),
                format!("Got it, capital of {capital} 萬."),
                "Okay, the capital has been recorded.".to_string(),
            ]
        }
        FieldName::Revenue => {
            let revenue = wan(record.revenue);
            vec![
                format!("Understood, annual revenue of about {revenue} 萬."),
                format!("Got it, revenue of {revenue} 萬."),
                "Okay, the revenue has been recorded.".to_string(),
            ]
        }
        FieldName::MarketingType => {
            let channels = display_value(record, field).unwrap_or_default();
            vec![
                format!("Got it, a {channels} marketing plan."),
                format!("Understood, focusing on the {channels} market."),
            ]
        }
        _ => generic_phrases(),
    }
}

/// Bullet list of the collected data, sent to the oracle with every turn.
pub fn data_summary(record: &ConsultationRecord) -> String {
    let lines = summary_lines(record);
    if lines.is_empty() {
        return "No data collected yet.".to_string();
    }
    lines.iter().map(|line| line.render()).collect::<Vec<_>>().join("\n")
}

pub fn welcome_message(first_prompt: &str) -> String {
    format!(
        "Hello! I'm your subsidy consultant. I'll ask a few questions about your company and \
         project, then estimate which government subsidy programmes fit and how much you could \
         receive.\n\n{first_prompt}"
    )
}

pub fn result_message(result: &CalculationResult) -> String {
    let plans = if result.recommended_plans.is_empty() {
        "- No programme matched the provided data".to_string()
    } else {
        result
            .recommended_plans
            .iter()
            .map(|plan| format!("- {} ({})", plan.name(), plan.localized_name()))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "Calculation complete! Based on the information you provided:\n\n\
         Estimated subsidy range\n{} ~ {}\n\n\
         Recommended programmes\n{plans}\n\n\
         {ESTIMATE_DISCLAIMER}",
        format_currency(result.grant_min),
        format_currency(result.grant_max),
    )
}
