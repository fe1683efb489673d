//! Secure credential handling for backends.
//!
//! Backends never see raw configuration secrets. A [`BackendSpec`] carries a
//! `credential_ref`, and a [`SecretProvider`] resolves that reference into an
//! [`ApiCredential`]. The store behind the provider is a black box: the
//! environment, a vault client, or a fixed map in tests.
//!
//! ```ignore
//! let secrets = EnvSecretProvider::new();
//! let cred = secrets.resolve("anthropic-api-key")?; // reads ANTHROPIC_API_KEY
//!
//! // Explicit exposure at the point of use
//! request.header("x-api-key", cred.expose());
//! ```
//!
//! [`BackendSpec`]: arbiter_core::config::BackendSpec

use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeMap;
use std::fmt;

use super::ProviderError;

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Loaded from environment variable
    Environment,
    /// Provided programmatically
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// A securely-stored API credential.
///
/// Debug and Display show `[REDACTED]`; the value is only reachable through
/// [`ApiCredential::expose`].
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    reference: String,
}

impl ApiCredential {
    pub fn new(
        value: impl Into<String>,
        source: CredentialSource,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            reference: reference.into(),
        }
    }

    /// Expose the credential value for use in API calls.
    ///
    /// Only call this where the credential is needed (e.g. setting an HTTP
    /// header). Never store the exposed value.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// The reference this credential was resolved from.
    pub fn reference(&self) -> &str {
        &self.reference
    }
}

impl Clone for ApiCredential {
    fn clone(&self) -> Self {
        Self::new(self.expose(), self.source, self.reference.clone())
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("reference", &self.reference)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.reference, self.source)
    }
}

/// Resolves credential references into credentials.
pub trait SecretProvider: Send + Sync {
    fn resolve(&self, reference: &str) -> Result<ApiCredential, ProviderError>;
}

/// Reads credentials from environment variables.
///
/// A reference maps to an upper-cased variable name with `-` and `.`
/// replaced by `_`, so `anthropic-api-key` reads `ANTHROPIC_API_KEY`.
/// An optional prefix is prepended.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretProvider {
    prefix: Option<String>,
}

impl EnvSecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    pub fn env_var(&self, reference: &str) -> String {
        let name: String = reference
            .chars()
            .map(|c| match c {
                '-' | '.' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        match &self.prefix {
            Some(prefix) => format!("{}{}", prefix, name),
            None => name,
        }
    }
}

impl SecretProvider for EnvSecretProvider {
    fn resolve(&self, reference: &str) -> Result<ApiCredential, ProviderError> {
        let var = self.env_var(reference);
        match std::env::var(&var) {
            Ok(value) if !value.is_empty() => {
                Ok(ApiCredential::new(value, CredentialSource::Environment, reference))
            }
            _ => Err(ProviderError::NotConfigured(format!(
                "credential '{}' not set: configure '{}' environment variable",
                reference, var
            ))),
        }
    }
}

/// Fixed in-memory credentials.
#[derive(Default)]
pub struct StaticSecretProvider {
    secrets: BTreeMap<String, SecretString>,
}

impl StaticSecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reference: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets
            .insert(reference.into(), SecretString::from(value.into()));
        self
    }
}

impl SecretProvider for StaticSecretProvider {
    fn resolve(&self, reference: &str) -> Result<ApiCredential, ProviderError> {
        self.secrets
            .get(reference)
            .map(|v| ApiCredential::new(v.expose_secret(), CredentialSource::Programmatic, reference))
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!("credential '{}' not found", reference))
            })
    }
}

impl fmt::Debug for StaticSecretProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticSecretProvider")
            .field("references", &self.secrets.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_redacted_in_debug() {
        let secret = "sk-super-secret-key-12345";
        let cred = ApiCredential::new(secret, CredentialSource::Programmatic, "test-key");

        let debug = format!("{:?}", cred);
        assert!(!debug.contains(secret), "Secret exposed in Debug!");
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_credential_redacted_in_display() {
        let secret = "sk-super-secret-key-12345";
        let cred = ApiCredential::new(secret, CredentialSource::Environment, "test-key");

        let display = format!("{}", cred);
        assert!(!display.contains(secret), "Secret exposed in Display!");
        assert!(display.contains("[REDACTED]"));
        assert!(display.contains("test-key"));
        assert!(display.contains("environment"));
    }

    #[test]
    fn test_env_var_mapping() {
        assert_eq!(EnvSecretProvider::new().env_var("anthropic-api-key"), "ANTHROPIC_API_KEY");
        assert_eq!(
            EnvSecretProvider::with_prefix("ARBITER_").env_var("openai.key"),
            "ARBITER_OPENAI_KEY"
        );
    }

    #[test]
    fn test_env_provider_resolves() {
        std::env::set_var("ARBITER_TEST_SECRET_RESOLVE", "env-key");
        let cred = EnvSecretProvider::new()
            .resolve("arbiter-test-secret-resolve")
            .unwrap();
        assert_eq!(cred.expose(), "env-key");
        assert_eq!(cred.source(), CredentialSource::Environment);
        std::env::remove_var("ARBITER_TEST_SECRET_RESOLVE");
    }

    #[test]
    fn test_env_provider_missing() {
        let err = EnvSecretProvider::new()
            .resolve("nonexistent-var-12345")
            .unwrap_err();
        assert!(err.to_string().contains("NONEXISTENT_VAR_12345"));
    }

    #[test]
    fn test_static_provider() {
        let secrets = StaticSecretProvider::new().with("k", "v");
        assert_eq!(secrets.resolve("k").unwrap().expose(), "v");
        assert!(secrets.resolve("missing").is_err());
        assert!(!format!("{:?}", secrets).contains("\"v\""));
    }
}
