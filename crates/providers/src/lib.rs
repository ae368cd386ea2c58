//! Generation backend adapters for Parley.
//!
//! The orchestrator consumes generation strictly through the
//! `parley_core::Generator` trait; this crate supplies the concrete
//! adapters.

pub mod mock;
pub mod openai_compat;

pub use mock::MockGenerator;
pub use openai_compat::OpenAiCompatGenerator;
