//! The HTTP request executor.
//!
//! Templates the endpoint and body against the context, validates the
//! configuration before any network traffic, then performs the request
//! inside the `http-request` step. The response lands in the context as
//!
//! ```json
//! { "httpResponse": { "status": 200, "statusText": "OK", "data": ... } }
//! ```
//!
//! under the node's variable name (default `httpRequest`). A non-success
//! status is still a node result, with the status recorded; only transport
//! failures fail the node.

use crate::context::ExecutionContext;
use crate::error::ExecutionError;
use crate::executor::{ExecutorParams, ExecutorServices, NodeExecutor};
use crate::node::NodeKind;
use crate::step::run_step;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// The checkpointed result of one HTTP request step.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct HttpResponsePayload {
    status: u16,
    #[serde(rename = "statusText")]
    status_text: String,
    data: Value,
}

#[derive(Default)]
pub struct HttpRequestExecutor;

impl HttpRequestExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NodeExecutor for HttpRequestExecutor {
    async fn execute(
        &self,
        services: &ExecutorServices,
        params: ExecutorParams<'_>,
    ) -> Result<ExecutionContext, ExecutionError> {
        let NodeKind::HttpRequest(config) = &params.node.kind else {
            return Err(ExecutionError::Configuration {
                detail: "node is not an http_request node".to_string(),
            });
        };

        if config.endpoint.trim().is_empty() {
            return Err(ExecutionError::Configuration {
                detail: "endpoint is required".to_string(),
            });
        }

        let endpoint = services.templates.render(&config.endpoint, &params.context)?;

        // Resolve and validate the body before the request goes out, so a
        // bad template fails without a half-performed side effect.
        let body = match (&config.body, config.method.has_body()) {
            (Some(template), true) => {
                let rendered = services.templates.render(template, &params.context)?;
                let parsed: Value =
                    serde_json::from_str(&rendered).map_err(|err| ExecutionError::Configuration {
                        detail: format!("request body is not valid JSON: {err}"),
                    })?;
                Some(parsed)
            }
            _ => None,
        };

        let mut headers = Vec::with_capacity(config.headers.len());
        for (name, template) in &config.headers {
            let value = services.templates.render(template, &params.context)?;
            headers.push((name.clone(), value));
        }

        let client = services.http.clone();
        let method = config.method;
        let payload: HttpResponsePayload =
            run_step(params.step, "http-request", async move {
                let mut request = client.request(method.into(), &endpoint);
                for (name, value) in &headers {
                    request = request.header(name, value);
                }
                if let Some(body) = &body {
                    request = request.json(body);
                }
                let response = request.send().await?;

                let status = response.status();
                if !status.is_success() {
                    return Err(ExecutionError::Request {
                        detail: format!("unexpected status {status}"),
                    });
                }
                let text = response.text().await?;
                let data = serde_json::from_str(&text).unwrap_or(Value::String(text));

                Ok(HttpResponsePayload {
                    status: status.as_u16(),
                    status_text: status.canonical_reason().unwrap_or("").to_string(),
                    data,
                })
            })
            .await?;

        let key = config
            .variable_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("httpRequest");

        let mut context = params.context;
        context.insert(
            key,
            json!({
                "httpResponse": payload,
            }),
        );
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{HttpMethod, HttpRequestConfig, Node};
    use crate::step::{PassthroughStepRunner, RecordingStepRunner, StepRunner};
    use amber_relay_core::UserId;
    use amber_relay_integration::{Base64Cipher, InMemoryVault};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn services() -> ExecutorServices {
        ExecutorServices::new(Arc::new(InMemoryVault::new()), Arc::new(Base64Cipher))
    }

    fn node(config: HttpRequestConfig) -> Node {
        Node::new("Request", NodeKind::HttpRequest(config))
    }

    async fn execute(
        config: HttpRequestConfig,
        context: ExecutionContext,
        step: &dyn StepRunner,
    ) -> Result<ExecutionContext, ExecutionError> {
        let services = services();
        let node = node(config);
        HttpRequestExecutor::new()
            .execute(
                &services,
                ExecutorParams {
                    node: &node,
                    context,
                    user_id: UserId::new(),
                    step,
                },
            )
            .await
    }

    /// Serves canned HTTP/1.1 responses on a local port, counting requests.
    async fn spawn_server(body: &'static str, status_line: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "{status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len(),
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });

        (format!("http://{addr}"), hits)
    }

    #[tokio::test]
    async fn missing_endpoint_fails_without_network() {
        let step = RecordingStepRunner::new();
        let result = execute(
            HttpRequestConfig {
                variable_name: None,
                endpoint: "   ".to_string(),
                method: HttpMethod::Get,
                body: None,
                headers: BTreeMap::new(),
            },
            ExecutionContext::new(),
            &step,
        )
        .await;

        assert!(matches!(result, Err(ExecutionError::Configuration { .. })));
        assert!(step.names().is_empty());
    }

    #[tokio::test]
    async fn invalid_json_body_fails_before_request() {
        let (url, hits) = spawn_server("{}", "HTTP/1.1 200 OK").await;
        let step = PassthroughStepRunner;
        let result = execute(
            HttpRequestConfig {
                variable_name: None,
                endpoint: url,
                method: HttpMethod::Post,
                body: Some("{not json".to_string()),
                headers: BTreeMap::new(),
            },
            ExecutionContext::new(),
            &step,
        )
        .await;

        assert!(matches!(result, Err(ExecutionError::Configuration { .. })));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn get_stores_response_under_default_key() {
        let (url, _) = spawn_server(r#"{"id": 7, "title": "hello"}"#, "HTTP/1.1 200 OK").await;
        let step = RecordingStepRunner::new();
        let context = execute(
            HttpRequestConfig {
                variable_name: None,
                endpoint: url,
                method: HttpMethod::Get,
                body: None,
                headers: BTreeMap::new(),
            },
            ExecutionContext::new(),
            &step,
        )
        .await
        .unwrap();

        let stored = context.get("httpRequest").expect("stored response");
        assert_eq!(stored["httpResponse"]["status"], json!(200));
        assert_eq!(stored["httpResponse"]["statusText"], json!("OK"));
        assert_eq!(stored["httpResponse"]["data"]["id"], json!(7));
        assert_eq!(step.names(), vec!["http-request"]);
    }

    #[tokio::test]
    async fn endpoint_template_resolves_against_context() {
        let (url, _) = spawn_server(r#"{"ok": true}"#, "HTTP/1.1 200 OK").await;
        let step = PassthroughStepRunner;
        let seed = ExecutionContext::from_value(json!({
            "r1": {"httpResponse": {"data": {"id": 42}}}
        }));

        let context = execute(
            HttpRequestConfig {
                variable_name: Some("r2".to_string()),
                endpoint: format!("{url}/items/{{{{r1.httpResponse.data.id}}}}"),
                method: HttpMethod::Get,
                body: None,
                headers: BTreeMap::new(),
            },
            seed,
            &step,
        )
        .await
        .unwrap();

        let stored = context.get("r2").expect("stored response");
        assert_eq!(stored["httpResponse"]["data"]["ok"], json!(true));
    }

    #[tokio::test]
    async fn non_success_status_fails_the_node() {
        let (url, hits) = spawn_server(r#"{"error": "missing"}"#, "HTTP/1.1 404 Not Found").await;
        let step = PassthroughStepRunner;
        let result = execute(
            HttpRequestConfig {
                variable_name: None,
                endpoint: url,
                method: HttpMethod::Get,
                body: None,
                headers: BTreeMap::new(),
            },
            ExecutionContext::new(),
            &step,
        )
        .await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let err = result.err().expect("404 must fail the node");
        assert!(matches!(err, ExecutionError::Request { .. }));
        assert!(err.is_retriable());
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn non_json_response_body_stored_as_text() {
        let (url, _) = spawn_server("plain text here", "HTTP/1.1 200 OK").await;
        let step = PassthroughStepRunner;
        let context = execute(
            HttpRequestConfig {
                variable_name: None,
                endpoint: url,
                method: HttpMethod::Get,
                body: None,
                headers: BTreeMap::new(),
            },
            ExecutionContext::new(),
            &step,
        )
        .await
        .unwrap();

        let stored = context.get("httpRequest").expect("stored response");
        assert_eq!(stored["httpResponse"]["data"], json!("plain text here"));
    }

    #[tokio::test]
    async fn header_templates_resolve_against_context() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (request_tx, request_rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");
            let mut buf = [0u8; 4096];
            let n = stream.read(&mut buf).await.unwrap_or(0);
            let _ = request_tx.send(String::from_utf8_lossy(&buf[..n]).to_string());
            let response =
                "HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\n{}";
            let _ = stream.write_all(response.as_bytes()).await;
        });

        let step = PassthroughStepRunner;
        let seed = ExecutionContext::from_value(json!({"token": "abc123"}));
        let mut headers = BTreeMap::new();
        headers.insert(
            "authorization".to_string(),
            "Bearer {{token}}".to_string(),
        );

        execute(
            HttpRequestConfig {
                variable_name: None,
                endpoint: format!("http://{addr}"),
                method: HttpMethod::Get,
                body: None,
                headers,
            },
            seed,
            &step,
        )
        .await
        .unwrap();

        let request = request_rx.await.expect("captured request");
        assert!(request.contains("authorization: Bearer abc123"));
    }

    #[tokio::test]
    async fn post_body_template_renders_before_send() {
        let (url, hits) = spawn_server(r#"{"created": true}"#, "HTTP/1.1 201 Created").await;
        let step = PassthroughStepRunner;
        let seed = ExecutionContext::from_value(json!({"name": "widget"}));

        let context = execute(
            HttpRequestConfig {
                variable_name: Some("created".to_string()),
                endpoint: url,
                method: HttpMethod::Post,
                body: Some(r#"{"item": "{{name}}"}"#.to_string()),
                headers: BTreeMap::new(),
            },
            seed,
            &step,
        )
        .await
        .unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let stored = context.get("created").expect("stored response");
        assert_eq!(stored["httpResponse"]["status"], json!(201));
    }
}
