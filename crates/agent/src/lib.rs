//! Agent Runtime - LLM-assisted subsidy consultation
//!
//! This crate is the conversational side of grantwise:
//! - Extracts field values and intents from free text (Traditional Chinese or English)
//! - Keeps per-session conversation history and records
//! - Composes acknowledgments, summaries and result messages
//! - Drives the deterministic collection flow and calculator in `grantwise-core`
//!
//! # Architecture
//!
//! Every user message runs the same constrained loop:
//! 1. **Extraction** (`llm`, `gemini`) - one oracle call returning text and function calls
//! 2. **Intent parsing** (`tools`) - function calls → typed `Intent`s, all or nothing
//! 3. **State changes** (`runtime`) - intents applied through `ConsultationFlow`
//! 4. **Reply** (`conversation`) - acknowledgment plus the next prompt, or the result
//!
//! # Key Types
//!
//! - `AgentRuntime` - session operations (see `runtime` module)
//! - `LlmClient` - pluggable extraction oracle; `GeminiClient` and `ScriptedLlmClient`
//! - `PhraseChooser` - deterministic or seeded phrase selection
//!
//! # Safety Principle
//!
//! The LLM is strictly a translator. It NEVER decides amounts, eligibility or plans.
//! Those are deterministic results of the calculator in `grantwise-core`.

pub mod conversation;
pub mod gemini;
pub mod llm;
pub mod runtime;
pub mod store;
pub mod tools;

pub use gemini::GeminiClient;
pub use llm::{ChatMessage, LlmClient, OracleReply, ScriptedLlmClient};
pub use runtime::{AgentRuntime, SessionStart, TurnReply};
