use clap::Args;
use grantwise_core::calculator::{CalculationBreakdown, SubsidyRequest};
use grantwise_core::domain::fields::{MarketingChannel, ProjectType};
use grantwise_core::flows::ConsultationFlow;
use serde::Serialize;

use crate::commands::{serialize_payload, CommandResult};

const COMMAND: &str = "calculate";

#[derive(Debug, Clone, Default, Args)]
pub struct CalculateArgs {
    #[arg(long, value_parser = parse_project_type, help = "research (研發) or marketing (行銷)")]
    pub project_type: Option<ProjectType>,
    #[arg(long, help = "Expected project budget in NT$")]
    pub budget: Option<u64>,
    #[arg(long, help = "Employees covered by labor insurance")]
    pub people: Option<u32>,
    #[arg(long, help = "Paid-in capital in NT$")]
    pub capital: Option<u64>,
    #[arg(long, help = "Approximate annual revenue in NT$")]
    pub revenue: Option<u64>,
    #[arg(long, default_value_t = 0, help = "Number of bonus items that apply (0-5)")]
    pub bonus_count: u8,
    #[arg(
        long,
        value_delimiter = ',',
        value_parser = parse_channel,
        help = "Marketing direction: domestic (內銷), export (外銷), or both comma separated"
    )]
    pub marketing_type: Vec<MarketingChannel>,
    #[arg(long, help = "Revenue growth expected from the marketing activities, in NT$")]
    pub growth_revenue: Option<u64>,
}

impl CalculateArgs {
    fn into_request(self) -> SubsidyRequest {
        SubsidyRequest {
            project_type: self.project_type,
            budget: self.budget,
            people: self.people,
            capital: self.capital,
            revenue: self.revenue,
            bonus_count: self.bonus_count,
            marketing_type: self.marketing_type.into_iter().collect(),
            growth_revenue: self.growth_revenue,
        }
    }
}

fn parse_project_type(raw: &str) -> Result<ProjectType, String> {
    ProjectType::parse(raw).ok_or_else(|| format!("`{raw}` is not research or marketing"))
}

fn parse_channel(raw: &str) -> Result<MarketingChannel, String> {
    MarketingChannel::parse(raw).ok_or_else(|| format!("`{raw}` is not domestic or export"))
}

#[derive(Debug, Serialize)]
struct CalculationReport {
    command: &'static str,
    status: &'static str,
    grant_min: u64,
    grant_max: u64,
    recommended_plans: Vec<&'static str>,
    breakdown: CalculationBreakdown,
}

pub fn run(args: CalculateArgs) -> CommandResult {
    let input = match args.into_request().into_input() {
        Ok(input) => input,
        Err(error) => {
            return CommandResult::failure(COMMAND, "incomplete_input", error.to_string(), 3)
        }
    };

    let result = ConsultationFlow::default().calculate_standalone(&input);
    let report = CalculationReport {
        command: COMMAND,
        status: "ok",
        grant_min: result.grant_min,
        grant_max: result.grant_max,
        recommended_plans: result.plan_names(),
        breakdown: result.breakdown,
    };

    CommandResult { exit_code: 0, output: serialize_payload(report) }
}

#[cfg(test)]
mod tests {
    use grantwise_core::domain::fields::{MarketingChannel, ProjectType};

    use super::{parse_channel, parse_project_type};

    #[test]
    fn cli_values_accept_localized_labels() {
        assert_eq!(parse_project_type("研發"), Ok(ProjectType::Research));
        assert_eq!(parse_channel("外銷"), Ok(MarketingChannel::Export));
        assert!(parse_project_type("sales").is_err());
    }
}
