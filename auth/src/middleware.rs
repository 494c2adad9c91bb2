//! axum middleware that authenticates Connect requests.
//!
//! On success the verified tenant and principal are stored in the request
//! extensions as a [`ConnectPrincipal`]. Every failure short-circuits with
//! the same bare `401 Unauthorized`.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;

use crate::{
    request::RequestDescriptor,
    tenant::TenantRecord,
    verifier::{RequestVerifier, Verified},
};

/// Authorization scheme used by Connect, e.g. `Authorization: JWT eyJ...`.
pub const AUTH_SCHEME: &str = "JWT";

/// Where a token may be read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// Only the `Authorization` header; used by lifecycle callbacks.
    HeaderOnly,
    /// Header, else the token query parameter.
    HeaderOrQuery,
}

/// Extracts the raw token.
///
/// A present `Authorization` header always decides: a non-`JWT` scheme yields
/// no token even when the query parameter is set.
pub fn extract_token(
    headers: &HeaderMap,
    request: &RequestDescriptor,
    token_param: &str,
    source: TokenSource,
) -> Option<String> {
    if let Some(value) = headers.get(AUTHORIZATION) {
        let value = value.to_str().ok()?;
        let (scheme, token) = value.trim().split_once(' ')?;
        if scheme != AUTH_SCHEME {
            return None;
        }
        let token = token.trim();
        return (!token.is_empty()).then(|| token.to_string());
    }

    match source {
        TokenSource::HeaderOnly => None,
        TokenSource::HeaderOrQuery => request
            .query_param(token_param)
            .filter(|t| !t.is_empty())
            .map(str::to_string),
    }
}

/// Authenticated caller attached to the request.
#[derive(Debug, Clone)]
pub struct ConnectPrincipal {
    pub tenant: TenantRecord,
    pub principal_id: Option<String>,
    pub context: Option<Value>,
}

impl ConnectPrincipal {
    pub fn client_key(&self) -> &str {
        &self.tenant.client_key
    }
}

impl From<Verified> for ConnectPrincipal {
    fn from(verified: Verified) -> Self {
        Self {
            tenant: verified.tenant,
            principal_id: verified.principal_id,
            context: verified.context,
        }
    }
}

/// Extension trait to read the principal from a request.
pub trait ConnectPrincipalExt {
    fn connect_principal(&self) -> Option<&ConnectPrincipal>;
}

impl<B> ConnectPrincipalExt for http::Request<B> {
    fn connect_principal(&self) -> Option<&ConnectPrincipal> {
        self.extensions().get::<ConnectPrincipal>()
    }
}

/// State for [`connect_auth_middleware`].
#[derive(Debug, Clone)]
pub struct ConnectAuthState {
    verifier: RequestVerifier,
    addon_key: Arc<str>,
    excluded: Arc<[String]>,
}

impl ConnectAuthState {
    pub fn new(verifier: RequestVerifier, addon_key: impl Into<Arc<str>>) -> Self {
        Self {
            verifier,
            addon_key: addon_key.into(),
            excluded: Arc::from(Vec::new()),
        }
    }

    /// Route-specific query parameters left out of the QSH.
    #[must_use]
    pub fn with_excluded_params(mut self, excluded: Vec<String>) -> Self {
        self.excluded = excluded.into();
        self
    }

    pub fn verifier(&self) -> &RequestVerifier {
        &self.verifier
    }

    pub fn addon_key(&self) -> &str {
        &self.addon_key
    }
}

pub async fn connect_auth_middleware(
    State(state): State<ConnectAuthState>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let descriptor = RequestDescriptor::from_parts(&parts);

    let config = state.verifier.config();
    let source = if config.accept_query_token {
        TokenSource::HeaderOrQuery
    } else {
        TokenSource::HeaderOnly
    };
    let token = extract_token(&parts.headers, &descriptor, &config.token_param, source);

    let verified = state
        .verifier
        .verify(
            Some(&*state.addon_key),
            token.as_deref(),
            &descriptor,
            &*state.excluded,
        )
        .await;

    match verified {
        Ok(verified) => {
            let mut request = Request::from_parts(parts, body);
            request
                .extensions_mut()
                .insert(ConnectPrincipal::from(verified));
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}
