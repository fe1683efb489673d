//! Anthropic Messages API backend.
//!
//! ## Security
//!
//! The API key is held as an [`ApiCredential`] and only exposed when the
//! request header is set. See the [`secrets`](super::secrets) module.

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

/// Default API base URL.
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Credential reference used when a backend spec names none.
pub const ANTHROPIC_DEFAULT_CREDENTIAL: &str = "anthropic-api-key";

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic backend.
pub struct AnthropicBackend {
    name: String,
    model: String,
    credential: ApiCredential,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicBackend")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AnthropicBackend {
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        credential: ApiCredential,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::HttpError(e.to_string()))?;

        Ok(Self {
            name: name.into(),
            model: model.into(),
            credential,
            base_url: ANTHROPIC_BASE_URL.to_string(),
            client,
        })
    }

    /// Set custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// Anthropic API request format.
#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<AnthropicMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Anthropic API response format.
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlockResponse>,
    model: String,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlockResponse {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}

#[async_trait]
impl Backend for AnthropicBackend {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<Generation, ProviderError> {
        let request = AnthropicRequest {
            model: options.model.as_deref().unwrap_or(&self.model),
            max_tokens: options.max_tokens,
            system: options.system.as_deref(),
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
            temperature: if options.temperature == 0.0 {
                None
            } else {
                Some(options.temperature)
            },
        };

        // Only expose the credential here, at the point of use
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.credential.expose())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .timeout(options.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
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
            let message = response
                .json::<AnthropicError>()
                .await
                .map(|body| body.error.message)
                .unwrap_or_else(|e| e.to_string());

            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let text = body
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(Generation {
            text,
            model: body.model,
            usage: TokenUsage {
                prompt_tokens: body.usage.input_tokens,
                completion_tokens: body.usage.output_tokens,
            },
        })
    }

    async fn health_check(&self) -> bool {
        // Verify the key is set, without logging it
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Factory for [`AnthropicBackend`].
///
/// Uses `endpoint` as the base URL when set and resolves `credential_ref`
/// (default `anthropic-api-key`) through the secret provider.
pub struct AnthropicBackendFactory;

impl BackendFactory for AnthropicBackendFactory {
    fn kind(&self) -> &'static str {
        "anthropic"
    }

    fn create(
        &self,
        spec: &BackendSpec,
        secrets: &dyn SecretProvider,
    ) -> Result<Arc<dyn Backend>, ProviderError> {
        let reference = spec
            .credential_ref
            .as_deref()
            .unwrap_or(ANTHROPIC_DEFAULT_CREDENTIAL);
        let credential = secrets.resolve(reference)?;

        let mut backend = AnthropicBackend::new(&spec.name, &spec.model, credential)?;
        if let Some(endpoint) = &spec.endpoint {
            backend = backend.with_base_url(endpoint.trim_end_matches('/'));
        }
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
        "Anthropic Messages API backend"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::secrets::{CredentialSource, StaticSecretProvider};

    fn spec() -> BackendSpec {
        BackendSpec {
            kind: "anthropic".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            local: false,
            ..BackendSpec::echo("claude")
        }
    }

    #[test]
    fn test_factory_resolves_default_credential() {
        let secrets = StaticSecretProvider::new().with(ANTHROPIC_DEFAULT_CREDENTIAL, "test-key");
        let backend = AnthropicBackendFactory.create(&spec(), &secrets).unwrap();
        assert_eq!(backend.name(), "claude");
    }

    #[test]
    fn test_factory_missing_credential_is_not_configured() {
        let result = AnthropicBackendFactory.create(&spec(), &StaticSecretProvider::new());
        assert!(matches!(result, Err(ProviderError::NotConfigured(_))));
    }

    #[test]
    fn test_factory_validate_invalid_endpoint() {
        let mut spec = spec();
        spec.endpoint = Some("invalid-url".to_string());
        assert!(AnthropicBackendFactory.validate(&spec).is_err());
    }

    #[test]
    fn test_api_key_not_in_debug_output() {
        let secret_key = "sk-ant-REDACTED";
        let credential = ApiCredential::new(secret_key, CredentialSource::Programmatic, "k");
        let backend = AnthropicBackend::new("claude", "m", credential).unwrap();

        let debug_output = format!("{:?}", backend);
        assert!(!debug_output.contains(secret_key), "API key was exposed in Debug output!");
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_empty_key_fails_health_check() {
        let credential = ApiCredential::new("", CredentialSource::Programmatic, "k");
        let backend = AnthropicBackend::new("claude", "m", credential).unwrap();
        assert!(!backend.health_check().await);
    }
}
