//! Verification settings.

use serde::{Deserialize, Serialize};

use crate::{decoder::DecoderOptions, error::ConfigError, qsh::DEFAULT_TOKEN_PARAM};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectAuthConfig {
    /// Check `exp` during both decode phases.
    pub verify_expiration: bool,
    /// Clock skew tolerated on `exp`, in seconds.
    pub leeway_secs: u64,
    /// Mount prefix removed from request paths before hashing,
    /// e.g. `/connect`.
    pub context_path: String,
    /// Query parameter that may carry the token.
    pub token_param: String,
    /// Whether the middleware reads the token from `token_param` when the
    /// `Authorization` header is absent.
    pub accept_query_token: bool,
    /// Extra query parameters never covered by the QSH.
    pub exclude_qsh_params: Vec<String>,
}

impl Default for ConnectAuthConfig {
    fn default() -> Self {
        Self {
            verify_expiration: true,
            leeway_secs: 0,
            context_path: String::new(),
            token_param: DEFAULT_TOKEN_PARAM.to_string(),
            accept_query_token: true,
            exclude_qsh_params: Vec::new(),
        }
    }
}

impl ConnectAuthConfig {
    #[must_use]
    pub fn with_context_path(mut self, context_path: impl Into<String>) -> Self {
        self.context_path = context_path.into();
        self
    }

    #[must_use]
    pub fn with_verify_expiration(mut self, verify: bool) -> Self {
        self.verify_expiration = verify;
        self
    }

    #[must_use]
    pub fn with_excluded_param(mut self, name: impl Into<String>) -> Self {
        self.exclude_qsh_params.push(name.into());
        self
    }

    pub fn decoder_options(&self) -> DecoderOptions {
        DecoderOptions {
            verify_expiration: self.verify_expiration,
            leeway_secs: self.leeway_secs,
        }
    }

    /// Checked by `RequestVerifier::new`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token_param.trim().is_empty() {
            return Err(ConfigError("token_param must not be empty".to_string()));
        }
        if !self.context_path.is_empty() && !self.context_path.starts_with('/') {
            return Err(ConfigError(format!(
                "context_path must start with '/', got {:?}",
                self.context_path
            )));
        }
        if self.exclude_qsh_params.iter().any(|p| p.is_empty()) {
            return Err(ConfigError(
                "exclude_qsh_params must not contain empty names".to_string(),
            ));
        }
        Ok(())
    }
}
