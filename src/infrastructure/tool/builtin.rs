//! Builtin tools available to every engine built by the bootstrap
//!
//! `echo`, `set`, `sleep` and `fail` are small utilities for composing and testing
//! workflows. `http` calls an external endpoint and maps the response status to a
//! `ToolError` kind, so that 5xx, network errors and timeouts trip breakers while 4xx
//! responses do not.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{json, Map, Value};

use crate::domain::tool::{Tool, ToolError};

/// All builtin tools
pub fn builtin_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(EchoTool),
        Arc::new(SetTool),
        Arc::new(SleepTool),
        Arc::new(FailTool),
        Arc::new(HttpTool::new()),
    ]
}

/// Returns its parameters unchanged
#[derive(Debug, Clone, Copy)]
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn category(&self) -> Option<&str> {
        Some("builtin")
    }

    fn description(&self) -> &str {
        "Returns its parameters"
    }

    async fn execute(&self, parameters: Value) -> Result<Value, ToolError> {
        Ok(parameters)
    }
}

/// Returns `parameters.value`
#[derive(Debug, Clone, Copy)]
pub struct SetTool;

#[async_trait]
impl Tool for SetTool {
    fn name(&self) -> &str {
        "set"
    }

    fn category(&self) -> Option<&str> {
        Some("builtin")
    }

    fn description(&self) -> &str {
        "Returns the `value` parameter"
    }

    async fn execute(&self, parameters: Value) -> Result<Value, ToolError> {
        parameters
            .get("value")
            .cloned()
            .ok_or_else(|| ToolError::invalid_parameters("'value' is required"))
    }
}

/// Waits `ms` milliseconds
#[derive(Debug, Clone, Copy)]
pub struct SleepTool;

#[async_trait]
impl Tool for SleepTool {
    fn name(&self) -> &str {
        "sleep"
    }

    fn category(&self) -> Option<&str> {
        Some("builtin")
    }

    fn description(&self) -> &str {
        "Waits for `ms` milliseconds"
    }

    async fn execute(&self, parameters: Value) -> Result<Value, ToolError> {
        let ms = match parameters.get("ms") {
            None | Some(Value::Null) => 0,
            Some(value) => value
                .as_u64()
                .ok_or_else(|| ToolError::invalid_parameters("'ms' must be a non-negative integer"))?,
        };

        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(json!({ "slept_ms": ms }))
    }
}

/// Always fails with the requested error kind
#[derive(Debug, Clone, Copy)]
pub struct FailTool;

#[async_trait]
impl Tool for FailTool {
    fn name(&self) -> &str {
        "fail"
    }

    fn category(&self) -> Option<&str> {
        Some("builtin")
    }

    fn description(&self) -> &str {
        "Fails with `message`; `kind` selects the error kind"
    }

    async fn execute(&self, parameters: Value) -> Result<Value, ToolError> {
        let message = parameters
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Requested failure")
            .to_string();

        let kind = parameters
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or("execution");

        Err(match kind {
            "timeout" => ToolError::timeout(parameters.get("timeout_ms").and_then(Value::as_u64).unwrap_or(0)),
            "network" => ToolError::network(message),
            "unavailable" => ToolError::unavailable(message),
            "invalid_parameters" => ToolError::invalid_parameters(message),
            "unauthorized" => ToolError::unauthorized(message),
            "not_found" => ToolError::not_found(message),
            _ => ToolError::execution(message),
        })
    }
}

/// HTTP request tool
///
/// Parameters: `url` (required), `method` (default GET), `headers` (object of strings),
/// `body` (JSON), `timeout_ms`. Returns `{status, headers, body}`; the body is parsed as
/// JSON when possible, otherwise returned as a string.
#[derive(Debug, Clone)]
pub struct HttpTool {
    client: reqwest::Client,
}

impl HttpTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for HttpTool {
    fn name(&self) -> &str {
        "http"
    }

    fn category(&self) -> Option<&str> {
        Some("network")
    }

    fn description(&self) -> &str {
        "Performs an HTTP request"
    }

    async fn execute(&self, parameters: Value) -> Result<Value, ToolError> {
        let url = parameters
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::invalid_parameters("'url' is required"))?;

        let method = parameters
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_uppercase();
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| ToolError::invalid_parameters(format!("Unsupported method '{}'", method)))?;

        let mut request = self.client.request(method, url);

        if let Some(headers) = parameters.get("headers").and_then(Value::as_object) {
            for (name, value) in headers {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                request = request.header(name.as_str(), value);
            }
        }

        if let Some(body) = parameters.get("body").filter(|b| !b.is_null()) {
            request = request.json(body);
        }

        if let Some(timeout_ms) = parameters.get("timeout_ms").and_then(Value::as_u64) {
            request = request.timeout(Duration::from_millis(timeout_ms));
        }

        let response = request.send().await.map_err(map_request_error)?;

        let status = response.status();
        let headers: Map<String, Value> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), Value::String(v.to_string())))
            })
            .collect();

        let text = response.text().await.map_err(map_request_error)?;

        if !status.is_success() {
            return Err(map_status(status, &text));
        }

        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        Ok(json!({
            "status": status.as_u16(),
            "headers": headers,
            "body": body,
        }))
    }
}

fn map_request_error(error: reqwest::Error) -> ToolError {
    if error.is_timeout() {
        ToolError::timeout(0)
    } else if error.is_builder() {
        ToolError::invalid_parameters(format!("Invalid request: {}", error))
    } else {
        ToolError::network(format!("Request failed: {}", error))
    }
}

fn map_status(status: StatusCode, body: &str) -> ToolError {
    let message = format!("HTTP {}: {}", status, body);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ToolError::unauthorized(message),
        StatusCode::NOT_FOUND => ToolError::not_found(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ToolError::unavailable(message),
        StatusCode::TOO_MANY_REQUESTS => ToolError::unavailable(message),
        s if s.is_server_error() => ToolError::unavailable(message),
        s if s.is_client_error() => ToolError::invalid_parameters(message),
        _ => ToolError::execution(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_echo_and_set() {
        let params = json!({"a": 1, "value": "x"});

        assert_eq!(EchoTool.execute(params.clone()).await.unwrap(), params);
        assert_eq!(SetTool.execute(params).await.unwrap(), json!("x"));

        let err = SetTool.execute(json!({})).await.unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_sleep_validates_ms() {
        let output = SleepTool.execute(json!({"ms": 1})).await.unwrap();
        assert_eq!(output, json!({"slept_ms": 1}));

        let err = SleepTool.execute(json!({"ms": "soon"})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn test_fail_kinds() {
        let err = FailTool.execute(json!({"message": "down", "kind": "network"})).await.unwrap_err();
        assert_eq!(err, ToolError::network("down"));

        let err = FailTool.execute(json!({"kind": "not_found"})).await.unwrap_err();
        assert!(err.is_client_error());

        let err = FailTool.execute(json!({})).await.unwrap_err();
        assert_eq!(err, ToolError::execution("Requested failure"));
    }

    #[test]
    fn test_builtin_names() {
        let names: Vec<String> = builtin_tools().iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec!["echo", "set", "sleep", "fail", "http"]);
    }

    #[tokio::test]
    async fn test_http_success_parses_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/items"))
            .and(header("x-api-key", "secret"))
            .and(body_json(json!({"name": "widget"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 7})))
            .mount(&server)
            .await;

        let output = HttpTool::new()
            .execute(json!({
                "url": format!("{}/items", server.uri()),
                "method": "post",
                "headers": {"x-api-key": "secret"},
                "body": {"name": "widget"}
            }))
            .await
            .unwrap();

        assert_eq!(output["status"], 201);
        assert_eq!(output["body"], json!({"id": 7}));
    }

    #[tokio::test]
    async fn test_http_plain_text_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
            .mount(&server)
            .await;

        let output = HttpTool::new()
            .execute(json!({"url": format!("{}/ping", server.uri())}))
            .await
            .unwrap();

        assert_eq!(output["body"], "pong");
    }

    #[tokio::test]
    async fn test_http_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(path("/bad"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&server)
            .await;

        let tool = HttpTool::new();
        let call = |p: &str| json!({"url": format!("{}{}", server.uri(), p)});

        let err = tool.execute(call("/down")).await.unwrap_err();
        assert!(matches!(err, ToolError::Unavailable(_)));

        let err = tool.execute(call("/missing")).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));

        let err = tool.execute(call("/bad")).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn test_http_timeout() {
        let server = MockServer::start().await;
        Mock::given(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let err = HttpTool::new()
            .execute(json!({"url": format!("{}/slow", server.uri()), "timeout_ms": 50}))
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_http_requires_url() {
        let err = HttpTool::new().execute(json!({})).await.unwrap_err();
        assert!(err.is_client_error());
    }
}
