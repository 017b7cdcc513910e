//! The Sleuth agent loop.
//!
//! A session answers one question by alternating two steps until the model
//! stops asking for tools:
//!
//! 1. **Call the model** with the system instruction, the transcript and the
//!    tool definitions
//! 2. **Dispatch tools** the model requested, append their results, go to 1
//!
//! Tools report evidence (retrieved passages, executed statements) in their
//! results; it is merged into the session state and returned next to the
//! final answer. [`eval`] scores a finished answer against that evidence.

pub mod builder;
pub mod dispatcher;
pub mod eval;
pub mod orchestrator;
pub mod prompt;
pub mod session;

#[cfg(test)]
mod test_support;

pub use builder::{build_judge, build_service};
pub use dispatcher::ToolDispatcher;
pub use eval::{EvalRequest, FaithfulnessJudge, FaithfulnessScore};
pub use orchestrator::{Orchestrator, requests_tools};
pub use session::{AgentResponse, AgentService, SessionOptions};
