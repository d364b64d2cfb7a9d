//! The durable step boundary.
//!
//! Every side effect an executor performs runs inside a named step. The
//! runner decides what "run a step" means: the in-process runner just
//! awaits the work, while a durable runner can checkpoint the JSON result
//! and skip re-running the step on replay. Step results must therefore be
//! plain JSON, never live handles.

use crate::error::ExecutionError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Runs named units of side-effecting work.
///
/// Names must be stable across retries of the same execution; the durable
/// runner keys its checkpoints by them.
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Runs `work` as the step called `name`, returning its JSON result.
    async fn run_step(
        &self,
        name: &str,
        work: BoxFuture<'_, Result<Value, ExecutionError>>,
    ) -> Result<Value, ExecutionError>;
}

/// Runs a typed step: serializes the work's output to JSON for the runner
/// and deserializes the runner's result back.
///
/// On replay a durable runner returns the checkpointed JSON without
/// executing `work`, which is why the round-trip through JSON is the
/// contract rather than an implementation detail.
pub async fn run_step<T, F>(
    runner: &dyn StepRunner,
    name: &str,
    work: F,
) -> Result<T, ExecutionError>
where
    T: Serialize + DeserializeOwned,
    F: Future<Output = Result<T, ExecutionError>> + Send,
{
    let json_work = Box::pin(async move {
        let value = work.await?;
        serde_json::to_value(value).map_err(|err| ExecutionError::Step {
            detail: format!("step result not serializable: {err}"),
        })
    });

    let result = runner.run_step(name, json_work).await?;
    serde_json::from_value(result).map_err(|err| ExecutionError::Step {
        detail: format!("step result not deserializable: {err}"),
    })
}

/// A step runner with no durability: it simply awaits the work.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughStepRunner;

#[async_trait]
impl StepRunner for PassthroughStepRunner {
    async fn run_step(
        &self,
        _name: &str,
        work: BoxFuture<'_, Result<Value, ExecutionError>>,
    ) -> Result<Value, ExecutionError> {
        work.await
    }
}

/// A step runner for tests that records every step name it ran.
#[derive(Debug, Default)]
pub struct RecordingStepRunner {
    names: std::sync::Mutex<Vec<String>>,
}

impl RecordingStepRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the step names run so far, in order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.names.lock().expect("step name lock").clone()
    }
}

#[async_trait]
impl StepRunner for RecordingStepRunner {
    async fn run_step(
        &self,
        name: &str,
        work: BoxFuture<'_, Result<Value, ExecutionError>>,
    ) -> Result<Value, ExecutionError> {
        self.names
            .lock()
            .expect("step name lock")
            .push(name.to_string());
        work.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        count: u32,
    }

    #[tokio::test]
    async fn passthrough_returns_work_result() {
        let runner = PassthroughStepRunner;
        let result: Payload = run_step(&runner, "fetch", async {
            Ok(Payload { count: 3 })
        })
        .await
        .unwrap();
        assert_eq!(result, Payload { count: 3 });
    }

    #[tokio::test]
    async fn errors_pass_through() {
        let runner = PassthroughStepRunner;
        let result: Result<Payload, _> = run_step(&runner, "fetch", async {
            Err(ExecutionError::Request {
                detail: "boom".to_string(),
            })
        })
        .await;
        assert!(matches!(result, Err(ExecutionError::Request { .. })));
    }

    #[tokio::test]
    async fn recording_runner_captures_names_in_order() {
        let runner = RecordingStepRunner::new();
        let _: Value = run_step(&runner, "first", async { Ok(json!(1)) })
            .await
            .unwrap();
        let _: Value = run_step(&runner, "second", async { Ok(json!(2)) })
            .await
            .unwrap();
        assert_eq!(runner.names(), vec!["first", "second"]);
    }
}
