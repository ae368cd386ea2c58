//! Per-turn conversation orchestration for Parley.
//!
//! `ChatEngine` drives one request through the turn state machine: resolve
//! the session, load history, persist the user turn, retrieve grounding
//! context, stream generation, persist the assistant turn, and emit a typed
//! event sequence along the way.

pub mod encode;
pub mod event;
pub mod orchestrator;
pub mod prompt;

pub use encode::encode_sse;
pub use event::TurnEvent;
pub use orchestrator::{ChatEngine, TurnRequest};
pub use prompt::build_system_prompt;
