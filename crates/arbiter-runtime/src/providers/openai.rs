//! OpenAI-compatible `/chat/completions` backend.
//!
//! Serves two kinds: `openai` (hosted, credential required) and `local`
//! (Ollama, vLLM, llama.cpp servers; credential optional).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use arbiter_core::config::BackendSpec;

use super::{
    factory::BackendFactory,
    secrets::{ApiCredential, SecretProvider},
    Backend, GenerateOptions, Generation, ProviderError, TokenUsage,
};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const LOCAL_BASE_URL: &str = "http://localhost:11434/v1";
pub const OPENAI_DEFAULT_CREDENTIAL: &str = "openai-api-key";

/// Backend speaking the OpenAI chat completions protocol.
pub struct OpenAiCompatBackend {
    name: String,
    model: String,
    credential: Option<ApiCredential>,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiCompatBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatBackend")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiCompatBackend {
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        credential: Option<ApiCredential>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::HttpError(e.to_string()))?;

        Ok(Self {
            name: name.into(),
            model: model.into(),
            credential,
            base_url: base_url.into(),
            client,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[async_trait]
impl Backend for OpenAiCompatBackend {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<Generation, ProviderError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = options.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let model = options.model.as_deref().unwrap_or(&self.model);
        let request = ChatRequest {
            model,
            messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .timeout(options.timeout)
            .json(&request);
        if let Some(credential) = &self.credential {
            builder = builder.bearer_auth(credential.expose());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(options.timeout)
            } else {
                ProviderError::HttpError(e.to_string())
            }
        })?;

        let status = response.status();
        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ProviderError::RateLimited { retry_after });
        }
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthError);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::ParseError("response has no choices".to_string()))?;

        let usage = body
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(Generation {
            text,
            model: body.model.unwrap_or_else(|| model.to_string()),
            usage,
        })
    }

    async fn health_check(&self) -> bool {
        self.credential.as_ref().map_or(true, |c| !c.is_empty())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Factory for [`OpenAiCompatBackend`], registered once per kind.
pub struct OpenAiCompatBackendFactory {
    kind: &'static str,
    default_base_url: &'static str,
    credential_required: bool,
}

impl OpenAiCompatBackendFactory {
    /// Hosted OpenAI; resolves `credential_ref` (default `openai-api-key`).
    pub fn openai() -> Self {
        Self {
            kind: "openai",
            default_base_url: OPENAI_BASE_URL,
            credential_required: true,
        }
    }

    /// Local OpenAI-compatible server; credential only when `credential_ref` is set.
    pub fn local() -> Self {
        Self {
            kind: "local",
            default_base_url: LOCAL_BASE_URL,
            credential_required: false,
        }
    }
}

impl BackendFactory for OpenAiCompatBackendFactory {
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn create(
        &self,
        spec: &BackendSpec,
        secrets: &dyn SecretProvider,
    ) -> Result<Arc<dyn Backend>, ProviderError> {
        let credential = match (&spec.credential_ref, self.credential_required) {
            (Some(reference), _) => Some(secrets.resolve(reference)?),
            (None, true) => Some(secrets.resolve(OPENAI_DEFAULT_CREDENTIAL)?),
            (None, false) => None,
        };

        let base_url = spec
            .endpoint
            .as_deref()
            .unwrap_or(self.default_base_url)
            .trim_end_matches('/');

        let backend = OpenAiCompatBackend::new(&spec.name, &spec.model, base_url, credential)?;
        Ok(Arc::new(backend))
    }

    fn validate(&self, spec: &BackendSpec) -> Result<(), ProviderError> {
        if let Some(url) = &spec.endpoint {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ProviderError::NotConfigured(
                    "endpoint must start with http:// or https://".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "OpenAI-compatible chat completions backend"
    }
}
