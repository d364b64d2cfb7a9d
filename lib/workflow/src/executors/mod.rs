//! Built-in node executors.

mod http_request;
mod llm;
mod trigger;

pub use http_request::HttpRequestExecutor;
pub use llm::{LlmExecutor, LlmProvider};
pub use trigger::TriggerExecutor;
