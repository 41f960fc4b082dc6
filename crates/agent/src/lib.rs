//! Conversational agent runtime for the Kathir meal assistant.
//!
//! A user message flows through the [`runtime::AgentRuntime`] facade:
//! 1. **Session resolution** (`session`) - load or open a budget-scoped session
//! 2. **Tool selection** (`orchestrator`, `llm`) - a function-calling model picks tools
//! 3. **Tool execution** (`tools`) - search, order history and cart lookups
//! 4. **Response synthesis** (`orchestrator`, `conversation`) - a prose model narrates results
//! 5. **Persistence** (`history`) - both turns and the suggestion audit rows are written
//!
//! The model never computes prices or quantities: suggestions come from the catalog and the
//! deterministic suggestion engine in `kathir-core`.

pub mod conversation;
pub mod history;
pub mod llm;
pub mod orchestrator;
pub mod runtime;
pub mod session;
pub mod tools;

pub use conversation::ReplyPayload;
pub use history::HistoryStore;
pub use llm::{CompletionProvider, OpenAiCompatibleClient, ScriptedProvider};
pub use orchestrator::{OrchestratorSettings, TurnOutcome, TwoPhaseOrchestrator};
pub use runtime::{AgentRuntime, ChatReply, ChatRequest, ChatResponse, ReplyAction};
pub use session::SessionRegistry;
pub use tools::{ToolLimits, ToolRegistry};
