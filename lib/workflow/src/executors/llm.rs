//! LLM completion executors.
//!
//! One executor per provider, sharing the flow: validate configuration,
//! resolve and open the stored API key, render prompts against the
//! context, call the provider inside a named step, and merge
//!
//! ```json
//! { "aiResponse": { "model": "...", "content": "..." } }
//! ```
//!
//! under the node's variable name (default `aiResponse`).

use crate::context::ExecutionContext;
use crate::error::ExecutionError;
use crate::executor::{ExecutorParams, ExecutorServices, NodeExecutor};
use crate::node::{LlmConfig, NodeKind};
use crate::step::run_step;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 4096;

/// The supported completion providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Gemini,
    OpenAi,
    Anthropic,
}

impl LlmProvider {
    /// The step name the provider call runs under.
    #[must_use]
    pub fn step_name(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini-generate",
            Self::OpenAi => "openai-generate",
            Self::Anthropic => "anthropic-generate",
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Self::Gemini => "https://generativelanguage.googleapis.com",
            Self::OpenAi => "https://api.openai.com",
            Self::Anthropic => "https://api.anthropic.com",
        }
    }
}

/// The checkpointed result of one completion step.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CompletionPayload {
    model: String,
    content: String,
}

pub struct LlmExecutor {
    provider: LlmProvider,
    base_url: String,
}

impl LlmExecutor {
    #[must_use]
    pub fn new(provider: LlmProvider) -> Self {
        Self {
            provider,
            base_url: provider.default_base_url().to_string(),
        }
    }

    /// Overrides the provider base URL. For tests against a local server.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn config<'a>(&self, kind: &'a NodeKind) -> Result<&'a LlmConfig, ExecutionError> {
        match (self.provider, kind) {
            (LlmProvider::Gemini, NodeKind::Gemini(config))
            | (LlmProvider::OpenAi, NodeKind::OpenAi(config))
            | (LlmProvider::Anthropic, NodeKind::Anthropic(config)) => Ok(config),
            _ => Err(ExecutionError::Configuration {
                detail: "node kind does not match executor provider".to_string(),
            }),
        }
    }

    fn build_request(
        &self,
        client: &reqwest::Client,
        api_key: &str,
        model: &str,
        system_prompt: Option<&str>,
        user_prompt: &str,
    ) -> reqwest::RequestBuilder {
        match self.provider {
            LlmProvider::Gemini => {
                let mut body = json!({
                    "contents": [{"parts": [{"text": user_prompt}]}],
                });
                if let Some(system) = system_prompt {
                    body["system_instruction"] = json!({"parts": [{"text": system}]});
                }
                client
                    .post(format!(
                        "{}/v1beta/models/{model}:generateContent",
                        self.base_url
                    ))
                    .header("x-goog-api-key", api_key)
                    .json(&body)
            }
            LlmProvider::OpenAi => {
                let mut messages = Vec::new();
                if let Some(system) = system_prompt {
                    messages.push(json!({"role": "system", "content": system}));
                }
                messages.push(json!({"role": "user", "content": user_prompt}));
                client
                    .post(format!("{}/v1/chat/completions", self.base_url))
                    .bearer_auth(api_key)
                    .json(&json!({"model": model, "messages": messages}))
            }
            LlmProvider::Anthropic => {
                let mut body = json!({
                    "model": model,
                    "max_tokens": ANTHROPIC_MAX_TOKENS,
                    "messages": [{"role": "user", "content": user_prompt}],
                });
                if let Some(system) = system_prompt {
                    body["system"] = json!(system);
                }
                client
                    .post(format!("{}/v1/messages", self.base_url))
                    .header("x-api-key", api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&body)
            }
        }
    }

    fn extract_content(&self, response: &Value) -> Option<String> {
        let text = match self.provider {
            LlmProvider::Gemini => {
                response["candidates"][0]["content"]["parts"][0]["text"].as_str()
            }
            LlmProvider::OpenAi => response["choices"][0]["message"]["content"].as_str(),
            LlmProvider::Anthropic => response["content"][0]["text"].as_str(),
        };
        text.map(str::to_string)
    }
}

#[async_trait]
impl NodeExecutor for LlmExecutor {
    async fn execute(
        &self,
        services: &ExecutorServices,
        params: ExecutorParams<'_>,
    ) -> Result<ExecutionContext, ExecutionError> {
        let config = self.config(&params.node.kind)?;

        if config.model.trim().is_empty() {
            return Err(ExecutionError::Configuration {
                detail: "model is required".to_string(),
            });
        }
        if config.user_prompt.trim().is_empty() {
            return Err(ExecutionError::Configuration {
                detail: "user prompt is required".to_string(),
            });
        }

        let (_, sealed) = services
            .vault
            .find(config.credential_id, params.user_id)
            .await
            .map_err(|err| ExecutionError::Credential {
                detail: err.to_string(),
            })?
            .ok_or_else(|| ExecutionError::Credential {
                detail: format!("credential not found: {}", config.credential_id),
            })?;

        let api_key = services
            .cipher
            .open(&sealed)
            .map_err(|err| ExecutionError::Credential {
                detail: err.to_string(),
            })?;
        if api_key.is_empty() {
            return Err(ExecutionError::Credential {
                detail: "credential secret is empty".to_string(),
            });
        }

        let user_prompt = services
            .templates
            .render(&config.user_prompt, &params.context)?;
        let system_prompt = config
            .system_prompt
            .as_deref()
            .filter(|prompt| !prompt.trim().is_empty())
            .map(|prompt| services.templates.render(prompt, &params.context))
            .transpose()?;

        let request = self.build_request(
            &services.http,
            &api_key,
            &config.model,
            system_prompt.as_deref(),
            &user_prompt,
        );
        let provider = self.provider;
        let model = config.model.clone();
        let extract = move |value: &Value| self.extract_content(value);

        let payload: CompletionPayload =
            run_step(params.step, provider.step_name(), async move {
                let response = request.send().await?;
                let status = response.status();
                let body: Value = response.json().await?;

                if !status.is_success() {
                    return Err(ExecutionError::Request {
                        detail: format!("provider returned {status}: {body}"),
                    });
                }

                let content = extract(&body).ok_or_else(|| ExecutionError::Request {
                    detail: "provider response missing completion text".to_string(),
                })?;

                Ok(CompletionPayload { model, content })
            })
            .await?;

        let key = config
            .variable_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("aiResponse");

        let mut context = params.context;
        context.insert(key, json!({"aiResponse": payload}));
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use crate::step::{PassthroughStepRunner, RecordingStepRunner, StepRunner};
    use amber_relay_core::{CredentialId, UserId};
    use amber_relay_integration::{
        Base64Cipher, Credential, CredentialCipher, CredentialProvider, CredentialVault,
        InMemoryVault,
    };
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn seeded_services() -> (ExecutorServices, CredentialId, UserId) {
        let vault = InMemoryVault::new();
        let user_id = UserId::new();
        let credential = Credential::new(user_id, "test key", CredentialProvider::OpenAi);
        let credential_id = credential.id;
        let sealed = Base64Cipher.seal("sk-test").expect("seal");
        vault.store(credential, sealed).await.expect("store");

        let services = ExecutorServices::new(Arc::new(vault), Arc::new(Base64Cipher));
        (services, credential_id, user_id)
    }

    fn llm_config(credential_id: CredentialId) -> LlmConfig {
        LlmConfig {
            variable_name: None,
            credential_id,
            model: "gpt-4o-mini".to_string(),
            system_prompt: None,
            user_prompt: "Summarize {{topic}}".to_string(),
        }
    }

    async fn execute(
        executor: LlmExecutor,
        services: &ExecutorServices,
        kind: NodeKind,
        user_id: UserId,
        context: ExecutionContext,
        step: &dyn StepRunner,
    ) -> Result<ExecutionContext, ExecutionError> {
        let node = Node::new("Generate", kind);
        executor
            .execute(
                services,
                ExecutorParams {
                    node: &node,
                    context,
                    user_id,
                    step,
                },
            )
            .await
    }

    #[tokio::test]
    async fn empty_prompt_fails_before_any_step() {
        let (services, credential_id, user_id) = seeded_services().await;
        let mut config = llm_config(credential_id);
        config.user_prompt = "  ".to_string();
        let step = RecordingStepRunner::new();

        let result = execute(
            LlmExecutor::new(LlmProvider::OpenAi),
            &services,
            NodeKind::OpenAi(config),
            user_id,
            ExecutionContext::new(),
            &step,
        )
        .await;

        assert!(matches!(result, Err(ExecutionError::Configuration { .. })));
        assert!(step.names().is_empty());
    }

    #[tokio::test]
    async fn missing_credential_is_a_credential_error() {
        let (services, _, user_id) = seeded_services().await;
        let config = llm_config(CredentialId::new());
        let step = PassthroughStepRunner;

        let result = execute(
            LlmExecutor::new(LlmProvider::OpenAi),
            &services,
            NodeKind::OpenAi(config),
            user_id,
            ExecutionContext::new(),
            &step,
        )
        .await;

        assert!(matches!(result, Err(ExecutionError::Credential { .. })));
    }

    #[tokio::test]
    async fn credential_of_another_user_is_not_visible() {
        let (services, credential_id, _) = seeded_services().await;
        let config = llm_config(credential_id);
        let step = PassthroughStepRunner;

        let result = execute(
            LlmExecutor::new(LlmProvider::OpenAi),
            &services,
            NodeKind::OpenAi(config),
            UserId::new(),
            ExecutionContext::new(),
            &step,
        )
        .await;

        assert!(matches!(result, Err(ExecutionError::Credential { .. })));
    }

    async fn spawn_completion_server(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let mut buf = [0u8; 8192];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len(),
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });

        format!("http://{addr}")
    }

    #[tokio::test]
    async fn openai_completion_lands_under_variable_name() {
        let url = spawn_completion_server(
            r#"{"choices": [{"message": {"role": "assistant", "content": "a summary"}}]}"#,
        )
        .await;
        let (services, credential_id, user_id) = seeded_services().await;
        let mut config = llm_config(credential_id);
        config.variable_name = Some("summary".to_string());
        let step = RecordingStepRunner::new();

        let context = execute(
            LlmExecutor::new(LlmProvider::OpenAi).with_base_url(url),
            &services,
            NodeKind::OpenAi(config),
            user_id,
            ExecutionContext::from_value(json!({"topic": "workflows"})),
            &step,
        )
        .await
        .unwrap();

        let stored = context.get("summary").expect("stored completion");
        assert_eq!(stored["aiResponse"]["content"], json!("a summary"));
        assert_eq!(stored["aiResponse"]["model"], json!("gpt-4o-mini"));
        assert_eq!(step.names(), vec!["openai-generate"]);
    }

    #[tokio::test]
    async fn anthropic_response_shape_is_parsed() {
        let url =
            spawn_completion_server(r#"{"content": [{"type": "text", "text": "claude says"}]}"#)
                .await;
        let (services, credential_id, user_id) = seeded_services().await;
        let config = llm_config(credential_id);
        let step = PassthroughStepRunner;

        let context = execute(
            LlmExecutor::new(LlmProvider::Anthropic).with_base_url(url),
            &services,
            NodeKind::Anthropic(config),
            user_id,
            ExecutionContext::from_value(json!({"topic": "workflows"})),
            &step,
        )
        .await
        .unwrap();

        let stored = context.get("aiResponse").expect("stored completion");
        assert_eq!(stored["aiResponse"]["content"], json!("claude says"));
    }
}
