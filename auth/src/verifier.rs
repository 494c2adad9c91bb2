//! Request authentication: tenant lookup, signature check and QSH binding.

use std::sync::Arc;

use serde_json::Value;

use crate::{
    audit::{VerificationEvent, VerificationLogger},
    claims::TokenClaims,
    config::ConnectAuthConfig,
    decoder::TokenDecoder,
    error::{ConfigError, VerifyError, VerifyResult},
    qsh::{qsh_for_request, qsh_matches},
    request::RequestDescriptor,
    tenant::{TenantDirectory, TenantRecord},
};

/// A request that passed verification.
#[derive(Debug, Clone)]
pub struct Verified {
    pub tenant: TenantRecord,
    /// `context.user.accountId`, else `sub`.
    pub principal_id: Option<String>,
    pub context: Option<Value>,
    pub claims: TokenClaims,
}

/// Verifies Connect tokens against a tenant directory.
///
/// Holds no per-request state; clones share the directory and logger.
#[derive(Clone)]
pub struct RequestVerifier {
    directory: Arc<dyn TenantDirectory>,
    decoder: TokenDecoder,
    config: Arc<ConnectAuthConfig>,
    logger: Option<Arc<dyn VerificationLogger>>,
}

impl std::fmt::Debug for RequestVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestVerifier")
            .field("decoder", &self.decoder)
            .field("config", &self.config)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

impl RequestVerifier {
    /// Fails when `config` does not pass `ConnectAuthConfig::validate`.
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        config: ConnectAuthConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            directory,
            decoder: TokenDecoder::new(config.decoder_options()),
            config: Arc::new(config),
            logger: None,
        })
    }

    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn VerificationLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn config(&self) -> &ConnectAuthConfig {
        &self.config
    }

    /// Authenticates one request.
    ///
    /// `excluded` names query parameters left out of the QSH in addition to
    /// the token parameter and the configured exclusions.
    pub async fn verify<S: AsRef<str>>(
        &self,
        addon_key: Option<&str>,
        token: Option<&str>,
        request: &RequestDescriptor,
        excluded: &[S],
    ) -> VerifyResult<Verified> {
        let result = self.verify_inner(addon_key, token, request, excluded).await;

        if let Some(logger) = &self.logger {
            let event = match &result {
                Ok(verified) => VerificationEvent::success(
                    &verified.tenant.addon_key,
                    &verified.tenant.client_key,
                    verified.principal_id.clone(),
                ),
                Err(err) => VerificationEvent::failure(addon_key, err),
            };
            logger.log(&event);
        }

        result
    }

    async fn verify_inner<S: AsRef<str>>(
        &self,
        addon_key: Option<&str>,
        token: Option<&str>,
        request: &RequestDescriptor,
        excluded: &[S],
    ) -> VerifyResult<Verified> {
        let (Some(addon_key), Some(token)) = (
            addon_key.filter(|k| !k.is_empty()),
            token.filter(|t| !t.is_empty()),
        ) else {
            return Err(VerifyError::MissingCredentials);
        };

        // Only the issuer is taken from the unverified claims.
        let client_key = self
            .decoder
            .peek_unverified(token)
            .map_err(VerifyError::MalformedToken)?
            .iss;

        let tenant = self
            .directory
            .find(&client_key, addon_key)
            .await?
            .ok_or_else(|| VerifyError::UnknownTenant {
                client_key: client_key.clone(),
                addon_key: addon_key.to_string(),
            })?;

        let (claims, _header) = self
            .decoder
            .verify_and_decode(token, &tenant.shared_secret)
            .map_err(|reason| VerifyError::VerificationFailed {
                client_key: client_key.clone(),
                reason,
            })?;

        if let Some(claimed) = claims.qsh.as_deref() {
            let skip: Vec<&str> = self
                .config
                .exclude_qsh_params
                .iter()
                .map(String::as_str)
                .chain(excluded.iter().map(AsRef::<str>::as_ref))
                .collect();
            let computed = qsh_for_request(
                request,
                tenant.base_url.as_deref(),
                &self.config.context_path,
                &self.config.token_param,
                &skip,
            );
            if !qsh_matches(claimed, &computed) {
                return Err(VerifyError::QshMismatch { client_key });
            }
        }

        Ok(Verified {
            principal_id: claims.principal_id(),
            context: claims.context.clone(),
            tenant,
            claims,
        })
    }
}
