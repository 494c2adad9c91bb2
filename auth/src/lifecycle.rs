//! Install and uninstall callbacks.
//!
//! The platform posts a payload with the tenant's shared secret when the
//! add-on is installed. A first install is accepted as is. A re-install or
//! an uninstall must carry a token signed with the secret already on file.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    audit::VerificationLogger,
    config::ConnectAuthConfig,
    error::{ConfigError, DirectoryError, VerifyError},
    middleware::{extract_token, TokenSource},
    request::RequestDescriptor,
    tenant::{TenantDirectory, TenantRecord, TenantStore},
    verifier::RequestVerifier,
};

const NO_EXCLUSIONS: [&str; 0] = [];

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallPayload {
    /// Add-on key from the descriptor.
    pub key: String,
    pub client_key: String,
    pub shared_secret: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub base_api_url: Option<String>,
    /// e.g. `jira` or `confluence`
    #[serde(default)]
    pub product_type: Option<String>,
    #[serde(default)]
    pub oauth_client_id: Option<String>,
    #[serde(default)]
    pub public_key: Option<String>,
}

impl std::fmt::Debug for InstallPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallPayload")
            .field("key", &self.key)
            .field("client_key", &self.client_key)
            .field("base_url", &self.base_url)
            .field("product_type", &self.product_type)
            .finish_non_exhaustive()
    }
}

impl InstallPayload {
    fn validate(&self) -> Result<(), LifecycleError> {
        if self.key.is_empty() {
            return Err(LifecycleError::InvalidPayload("key"));
        }
        if self.client_key.is_empty() {
            return Err(LifecycleError::InvalidPayload("clientKey"));
        }
        if self.shared_secret.is_empty() {
            return Err(LifecycleError::InvalidPayload("sharedSecret"));
        }
        Ok(())
    }

    fn into_record(self) -> TenantRecord {
        let mut record = TenantRecord::new(self.client_key, self.key, self.shared_secret);
        record.api_base_url = self.base_api_url.or_else(|| self.base_url.clone());
        record.base_url = self.base_url;
        record.product_type = self.product_type.map(|p| format!("atlassian:{p}"));
        record.oauth_client_id = self.oauth_client_id;
        record.public_key = self.public_key;
        record
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UninstallPayload {
    pub key: String,
    pub client_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    Reinstalled,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("lifecycle payload is missing {0}")]
    InvalidPayload(&'static str),

    #[error(transparent)]
    Unauthorized(#[from] VerifyError),

    #[error("token for client_key={verified} cannot modify client_key={requested}")]
    Forbidden { verified: String, requested: String },

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl IntoResponse for LifecycleError {
    fn into_response(self) -> Response {
        match self {
            LifecycleError::InvalidPayload(_) => StatusCode::BAD_REQUEST.into_response(),
            LifecycleError::Unauthorized(err) => err.into_response(),
            LifecycleError::Forbidden { .. } => StatusCode::FORBIDDEN.into_response(),
            LifecycleError::Directory(_) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        }
    }
}

/// Applies install/uninstall callbacks to a tenant store.
pub struct LifecycleHandler<S: TenantStore> {
    store: Arc<S>,
    verifier: RequestVerifier,
}

impl<S: TenantStore> Clone for LifecycleHandler<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            verifier: self.verifier.clone(),
        }
    }
}

impl<S: TenantStore> LifecycleHandler<S> {
    pub fn new(store: Arc<S>, config: ConnectAuthConfig) -> Result<Self, ConfigError> {
        let directory: Arc<dyn TenantDirectory> = store.clone();
        Ok(Self {
            verifier: RequestVerifier::new(directory, config)?,
            store,
        })
    }

    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn VerificationLogger>) -> Self {
        self.verifier = self.verifier.with_logger(logger);
        self
    }

    pub async fn handle_installed(
        &self,
        payload: InstallPayload,
        token: Option<&str>,
        request: &RequestDescriptor,
    ) -> Result<InstallOutcome, LifecycleError> {
        payload.validate()?;

        let existing = self.store.find(&payload.client_key, &payload.key).await?;
        let outcome = match &existing {
            None => InstallOutcome::Installed,
            Some(_) => {
                let verified = self
                    .verifier
                    .verify(Some(&payload.key), token, request, &NO_EXCLUSIONS)
                    .await?;
                if verified.tenant.client_key != payload.client_key {
                    warn!(
                        verified = %verified.tenant.client_key,
                        requested = %payload.client_key,
                        "Re-install signed by another tenant"
                    );
                    return Err(LifecycleError::Forbidden {
                        verified: verified.tenant.client_key,
                        requested: payload.client_key,
                    });
                }
                InstallOutcome::Reinstalled
            }
        };

        let mut record = payload.into_record();
        if let Some(previous) = existing {
            record.installed_at = previous.installed_at;
        }
        info!(
            client_key = %record.client_key,
            addon_key = %record.addon_key,
            ?outcome,
            "Connect tenant installed"
        );
        self.store.upsert(record).await?;
        Ok(outcome)
    }

    /// Returns whether a record was removed.
    pub async fn handle_uninstalled(
        &self,
        payload: UninstallPayload,
        token: Option<&str>,
        request: &RequestDescriptor,
    ) -> Result<bool, LifecycleError> {
        let verified = self
            .verifier
            .verify(Some(&payload.key), token, request, &NO_EXCLUSIONS)
            .await?;
        if payload.client_key.is_empty() {
            return Err(LifecycleError::InvalidPayload("clientKey"));
        }
        if verified.tenant.client_key != payload.client_key {
            return Err(LifecycleError::Forbidden {
                verified: verified.tenant.client_key,
                requested: payload.client_key,
            });
        }

        let removed = self.store.remove(&payload.client_key, &payload.key).await?;
        info!(
            client_key = %payload.client_key,
            addon_key = %payload.key,
            removed,
            "Connect tenant uninstalled"
        );
        Ok(removed)
    }
}

fn header_token(
    headers: &HeaderMap,
    request: &RequestDescriptor,
    config: &ConnectAuthConfig,
) -> Option<String> {
    extract_token(headers, request, &config.token_param, TokenSource::HeaderOnly)
}

/// `POST /installed`
pub async fn installed_handler<S: TenantStore>(
    State(handler): State<LifecycleHandler<S>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Json(payload): Json<InstallPayload>,
) -> Result<StatusCode, LifecycleError> {
    let request = RequestDescriptor::from_head(&method, &uri, &headers);
    let token = header_token(&headers, &request, handler.verifier.config());
    handler
        .handle_installed(payload, token.as_deref(), &request)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /uninstalled`
pub async fn uninstalled_handler<S: TenantStore>(
    State(handler): State<LifecycleHandler<S>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Json(payload): Json<UninstallPayload>,
) -> Result<StatusCode, LifecycleError> {
    let request = RequestDescriptor::from_head(&method, &uri, &headers);
    let token = header_token(&headers, &request, handler.verifier.config());
    handler
        .handle_uninstalled(payload, token.as_deref(), &request)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
