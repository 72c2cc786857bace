use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{LlmClient, VisionClient};
use super::FeatureError;

/// Ollama HTTP client for local LLM inference.
///
/// Blocking on purpose: callers run inside `spawn_blocking`.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, FeatureError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| FeatureError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Names of locally pulled models (`GET /api/tags`).
    pub fn list_models(&self) -> Result<Vec<String>, FeatureError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeatureError::OllamaError {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }

        let tags: OllamaTagsResponse = response
            .json()
            .map_err(|e| FeatureError::ResponseParsing(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    pub fn is_model_available(&self, model: &str) -> Result<bool, FeatureError> {
        Ok(self.list_models()?.iter().any(|m| m.starts_with(model)))
    }

    fn map_send_error(&self, e: reqwest::Error) -> FeatureError {
        if e.is_connect() {
            FeatureError::OllamaConnection(self.base_url.clone())
        } else if e.is_timeout() {
            FeatureError::HttpClient(format!("Request timed out after {}s", self.timeout_secs))
        } else {
            FeatureError::HttpClient(e.to_string())
        }
    }

    fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, FeatureError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(FeatureError::OllamaError {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .map_err(|e| FeatureError::ResponseParsing(e.to_string()))
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    format: &'a Value,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

/// Request body for Ollama /api/chat with attached images
#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaChatMessage<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaChatMessage<'a> {
    role: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<&'a [String]>,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaChatResponseMessage,
}

#[derive(Deserialize)]
struct OllamaChatResponseMessage {
    content: String,
}

/// Response body from Ollama /api/tags
#[derive(Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

impl LlmClient for OllamaClient {
    fn generate_structured(
        &self,
        model: &str,
        prompt: &str,
        system: &str,
        schema: &Value,
    ) -> Result<String, FeatureError> {
        let body = OllamaGenerateRequest {
            model,
            prompt,
            system,
            stream: false,
            format: schema,
            options: OllamaOptions { temperature: 0.0 },
        };
        let parsed: OllamaGenerateResponse = self.post("/api/generate", &body)?;
        Ok(parsed.response)
    }
}

impl VisionClient for OllamaClient {
    fn chat_with_images(
        &self,
        model: &str,
        user_prompt: &str,
        images: &[String],
        system: Option<&str>,
    ) -> Result<String, FeatureError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(OllamaChatMessage {
                role: "system",
                content: system,
                images: None,
            });
        }
        messages.push(OllamaChatMessage {
            role: "user",
            content: user_prompt,
            images: Some(images),
        });

        let body = OllamaChatRequest {
            model,
            messages,
            stream: false,
            options: OllamaOptions { temperature: 0.0 },
        };
        let parsed: OllamaChatResponse = self.post("/api/chat", &body)?;
        Ok(parsed.message.content)
    }
}

// ── Mock for testing ──────────────────────────────────────

/// Mock LLM client: returns a fixed reply (or a connection error) and
/// records every prompt it receives.
pub struct MockLlmClient {
    response: Result<String, String>,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: Ok(response.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails with `FeatureError::OllamaConnection`.
    pub fn unreachable() -> Self {
        Self {
            response: Err("http://localhost:11434".to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl LlmClient for MockLlmClient {
    fn generate_structured(
        &self,
        _model: &str,
        prompt: &str,
        _system: &str,
        _schema: &Value,
    ) -> Result<String, FeatureError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.response.clone().map_err(FeatureError::OllamaConnection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    type Captured = Arc<Mutex<Vec<Value>>>;

    /// Serve `router` on an ephemeral port from a dedicated runtime thread.
    fn spawn_stub(router: Router) -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();

        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                axum::serve(listener, router).await.unwrap();
            });
        });

        format!("http://{addr}")
    }

    fn capturing_stub() -> (String, Captured) {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new()
            .route(
                "/api/generate",
                post(|State(c): State<Captured>, Json(body): Json<Value>| async move {
                    c.lock().unwrap().push(body);
                    Json(json!({ "response": "{\"features\": [13.5]}", "done": true }))
                }),
            )
            .route(
                "/api/chat",
                post(|State(c): State<Captured>, Json(body): Json<Value>| async move {
                    c.lock().unwrap().push(body);
                    Json(json!({ "message": { "role": "assistant", "content": "Hemoglobin 13.5" } }))
                }),
            )
            .route(
                "/api/tags",
                get(|| async { Json(json!({ "models": [{ "name": "medgemma:4b" }] })) }),
            )
            .with_state(captured.clone());
        (spawn_stub(router), captured)
    }

    #[test]
    fn constructor_trims_trailing_slash() {
        let client = OllamaClient::new("http://localhost:11434/", 60).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
        assert_eq!(client.timeout_secs, 60);
    }

    #[test]
    fn generate_structured_sends_schema_and_returns_response() {
        let (url, captured) = capturing_stub();
        let client = OllamaClient::new(&url, 10).unwrap();
        let schema = json!({ "type": "object" });

        let out = client
            .generate_structured("medgemma:4b", "the prompt", "the system", &schema)
            .unwrap();
        assert_eq!(out, "{\"features\": [13.5]}");

        let body = captured.lock().unwrap()[0].clone();
        assert_eq!(body["model"], "medgemma:4b");
        assert_eq!(body["prompt"], "the prompt");
        assert_eq!(body["system"], "the system");
        assert_eq!(body["stream"], false);
        assert_eq!(body["format"], schema);
        assert_eq!(body["options"]["temperature"], 0.0);
    }

    #[test]
    fn chat_with_images_attaches_images_to_user_message() {
        let (url, captured) = capturing_stub();
        let client = OllamaClient::new(&url, 10).unwrap();

        let out = client
            .chat_with_images("medgemma:4b", "read this", &["aGVsbG8=".into()], Some("sys"))
            .unwrap();
        assert_eq!(out, "Hemoglobin 13.5");

        let body = captured.lock().unwrap()[0].clone();
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert!(messages[0].get("images").is_none());
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["images"][0], "aGVsbG8=");
    }

    #[test]
    fn lists_available_models() {
        let (url, _) = capturing_stub();
        let client = OllamaClient::new(&url, 10).unwrap();
        assert_eq!(client.list_models().unwrap(), vec!["medgemma:4b"]);
        assert!(client.is_model_available("medgemma").unwrap());
        assert!(!client.is_model_available("llama3").unwrap());
    }

    #[test]
    fn non_success_status_is_ollama_error() {
        let router = Router::new().route(
            "/api/generate",
            post(|| async { (StatusCode::NOT_FOUND, "model 'x' not found") }),
        );
        let client = OllamaClient::new(&spawn_stub(router), 10).unwrap();

        match client.generate_structured("x", "p", "s", &json!({})) {
            Err(FeatureError::OllamaError { status, body }) => {
                assert_eq!(status, 404);
                assert!(body.contains("not found"));
            }
            other => panic!("expected OllamaError, got {other:?}"),
        }
    }

    #[test]
    fn refused_connection_is_ollama_connection() {
        // Bind then drop to obtain a port with no listener
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let client = OllamaClient::new(&format!("http://127.0.0.1:{port}"), 5).unwrap();
        assert!(matches!(
            client.generate_structured("m", "p", "s", &json!({})),
            Err(FeatureError::OllamaConnection(_))
        ));
    }

    #[test]
    fn mock_returns_reply_and_records_prompts() {
        let mock = MockLlmClient::new("first");
        assert_eq!(mock.generate_structured("m", "p1", "s", &json!({})).unwrap(), "first");
        assert_eq!(mock.generate_structured("m", "p2", "s", &json!({})).unwrap(), "first");
        assert_eq!(mock.prompts(), vec!["p1", "p2"]);
    }

    #[test]
    fn mock_unreachable_fails_every_call() {
        let mock = MockLlmClient::unreachable();
        for _ in 0..2 {
            assert!(matches!(
                mock.generate_structured("m", "p", "s", &json!({})),
                Err(FeatureError::OllamaConnection(_))
            ));
        }
    }
}
