use std::io::{self, BufRead, Write};
use std::sync::Arc;

use grantwise_agent::gemini::GeminiClient;
use grantwise_agent::llm::LlmClient;
use grantwise_agent::runtime::AgentRuntime;
use grantwise_core::config::{AppConfig, LoadOptions};
use grantwise_core::domain::session::SessionId;
use grantwise_core::errors::ApplicationError;
use tracing::info;

use crate::commands::CommandResult;
use crate::logging::init_logging;

const COMMAND: &str = "chat";

const HELP: &str = "Commands: /export shows the report rows, /snapshot prints the record as \
    JSON, /restart starts over with the collected data, /quit ends the consultation.";

pub fn run() -> CommandResult {
    let config = match load_config() {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(COMMAND, "config_validation", error.to_string(), 2)
        }
    };
    init_logging(&config);

    let client = match GeminiClient::from_config(&config.llm) {
        Ok(client) => client,
        Err(error) => {
            return CommandResult::failure(COMMAND, "llm_unavailable", format!("{error:#}"), 4)
        }
    };
    info!(
        event_name = "system.cli.chat_started",
        model = client.model(),
        history_window = config.conversation.history_window,
        "starting interactive consultation"
    );

    let stdin = io::stdin();
    let stdout = io::stdout();
    run_session(Arc::new(client), &config, stdin.lock(), stdout.lock())
}

fn load_config() -> Result<AppConfig, ApplicationError> {
    AppConfig::load(LoadOptions::default())
        .map_err(|error| ApplicationError::Configuration(error.to_string()))
}

/// Runs one consultation reading user lines from `input` until EOF or `/quit`, writing the
/// transcript to `output`.
pub fn run_session(
    llm: Arc<dyn LlmClient>,
    config: &AppConfig,
    input: impl BufRead,
    mut output: impl Write,
) -> CommandResult {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "runtime_init",
                format!("failed to build async runtime: {error}"),
                5,
            )
        }
    };

    let agent = AgentRuntime::from_config(llm, &config.conversation);
    match runtime.block_on(converse(&agent, input, &mut output)) {
        Ok(summary) => CommandResult::success(COMMAND, summary),
        Err(error) => CommandResult::failure(COMMAND, "io", error.to_string(), 5),
    }
}

async fn converse(
    agent: &AgentRuntime,
    input: impl BufRead,
    output: &mut impl Write,
) -> io::Result<String> {
    let start = agent.start_session().await;
    let mut session_id = start.session_id;
    writeln!(output, "{}\n\n{HELP}\n", start.initial_prompt)?;

    let mut completed = false;
    let mut turns = 0_usize;
    for line in input.lines() {
        let line = line?;
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        let rendered = match text {
            "/quit" | "/exit" => break,
            "/export" => render_export(agent, &session_id).await,
            "/snapshot" => render_snapshot(agent, &session_id).await,
            "/restart" => match agent.start_session_from(&session_id).await {
                Ok(next) => {
                    session_id = next.session_id;
                    completed = false;
                    next.initial_prompt
                }
                Err(error) => {
                    error.into_interface(session_id.to_string()).user_message().to_string()
                }
            },
            _ => {
                turns += 1;
                match agent.handle_user_text(&session_id, text).await {
                    Ok(reply) => {
                        completed = reply.session_completed;
                        format!(
                            "{}\n\n(progress: {}/{})",
                            reply.reply_text,
                            reply.progress.fields_completed,
                            reply.progress.total_fields
                        )
                    }
                    Err(error) => {
                        let error = error.into_interface(session_id.to_string());
                        format!("{} (ref {})", error.user_message(), error.correlation_id())
                    }
                }
            }
        };
        writeln!(output, "{rendered}\n")?;
    }
    output.flush()?;

    info!(
        event_name = "system.cli.chat_ended",
        session_id = %session_id,
        turns,
        completed,
        "interactive consultation ended"
    );

    let outcome = if completed { "estimate ready" } else { "no estimate yet" };
    Ok(format!("session {session_id} ended after {turns} turns ({outcome})"))
}

async fn render_export(agent: &AgentRuntime, session_id: &SessionId) -> String {
    match agent.export_record(session_id).await {
        Ok(rows) => rows
            .iter()
            .map(|row| format!("{}: {}", row.label, row.value))
            .collect::<Vec<_>>()
            .join("\n"),
        Err(error) => error.into_interface(session_id.to_string()).user_message().to_string(),
    }
}

async fn render_snapshot(agent: &AgentRuntime, session_id: &SessionId) -> String {
    match agent.get_record_snapshot(session_id).await {
        Ok(snapshot) => serde_json::to_string_pretty(&snapshot)
            .unwrap_or_else(|error| format!("snapshot could not be rendered: {error}")),
        Err(error) => error.into_interface(session_id.to_string()).user_message().to_string(),
    }
}
