//! Error types for token decoding and request verification.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Result alias for request verification.
pub type VerifyResult<T> = Result<T, VerifyError>;

/// Failure reported by the token decoder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Segment count, base64 or JSON is invalid.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// Header declares `none` or an algorithm other than HS256.
    #[error("disallowed signing algorithm: {0}")]
    DisallowedAlgorithm(String),

    #[error("signature does not verify against the tenant secret")]
    SignatureInvalid,

    #[error("token has expired")]
    Expired,

    #[error("token is not yet valid")]
    NotYetValid,
}

impl DecodeError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DecodeError::Malformed(_) => FailureKind::MalformedToken,
            DecodeError::DisallowedAlgorithm(_) => FailureKind::DisallowedAlgorithm,
            DecodeError::SignatureInvalid => FailureKind::SignatureInvalid,
            DecodeError::Expired | DecodeError::NotYetValid => FailureKind::TokenExpired,
        }
    }
}

impl From<jsonwebtoken::errors::Error> for DecodeError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => DecodeError::SignatureInvalid,
            ErrorKind::ExpiredSignature => DecodeError::Expired,
            ErrorKind::ImmatureSignature => DecodeError::NotYetValid,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                DecodeError::DisallowedAlgorithm(err.to_string())
            }
            _ => DecodeError::Malformed(err.to_string()),
        }
    }
}

/// Rejected verification settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid connect auth config: {0}")]
pub struct ConfigError(pub String);

/// Failure raised by a tenant directory backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("tenant directory unavailable: {0}")]
    Unavailable(String),

    #[error("tenant directory rejected the write: {0}")]
    Rejected(String),
}

/// Flat failure taxonomy, stable enough to match on and to log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MissingCredentials,
    MalformedToken,
    DisallowedAlgorithm,
    UnknownTenant,
    SignatureInvalid,
    TokenExpired,
    QshMismatch,
    DirectoryUnavailable,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::MissingCredentials => "missing_credentials",
            FailureKind::MalformedToken => "malformed_token",
            FailureKind::DisallowedAlgorithm => "disallowed_algorithm",
            FailureKind::UnknownTenant => "unknown_tenant",
            FailureKind::SignatureInvalid => "signature_invalid",
            FailureKind::TokenExpired => "token_expired",
            FailureKind::QshMismatch => "qsh_mismatch",
            FailureKind::DirectoryUnavailable => "directory_unavailable",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of a failed verification.
///
/// Carries enough detail for the caller's logs. The response sent to the
/// client is always a plain 401, see the `IntoResponse` impl.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("token or addon key is missing")]
    MissingCredentials,

    /// The untrusted peek failed, so no tenant could be selected.
    #[error("token rejected before tenant lookup: {0}")]
    MalformedToken(DecodeError),

    #[error("no tenant for client_key={client_key} addon_key={addon_key}")]
    UnknownTenant {
        client_key: String,
        addon_key: String,
    },

    #[error("verification failed for client_key={client_key}: {reason}")]
    VerificationFailed {
        client_key: String,
        reason: DecodeError,
    },

    #[error("qsh mismatch for client_key={client_key}")]
    QshMismatch { client_key: String },

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl VerifyError {
    pub fn kind(&self) -> FailureKind {
        match self {
            VerifyError::MissingCredentials => FailureKind::MissingCredentials,
            VerifyError::MalformedToken(reason) => match reason.kind() {
                kind @ (FailureKind::DisallowedAlgorithm | FailureKind::TokenExpired) => kind,
                _ => FailureKind::MalformedToken,
            },
            VerifyError::UnknownTenant { .. } => FailureKind::UnknownTenant,
            VerifyError::VerificationFailed { reason, .. } => reason.kind(),
            VerifyError::QshMismatch { .. } => FailureKind::QshMismatch,
            VerifyError::Directory(_) => FailureKind::DirectoryUnavailable,
        }
    }

    /// Tenant the token claimed to come from, once it is known.
    pub fn client_key(&self) -> Option<&str> {
        match self {
            VerifyError::UnknownTenant { client_key, .. }
            | VerifyError::VerificationFailed { client_key, .. }
            | VerifyError::QshMismatch { client_key } => Some(client_key),
            _ => None,
        }
    }
}

impl IntoResponse for VerifyError {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "JWT")],
            "Unauthorized",
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peek_failures_keep_specific_kind() {
        let alg = VerifyError::MalformedToken(DecodeError::DisallowedAlgorithm("none".into()));
        assert_eq!(alg.kind(), FailureKind::DisallowedAlgorithm);

        let expired = VerifyError::MalformedToken(DecodeError::Expired);
        assert_eq!(expired.kind(), FailureKind::TokenExpired);

        let garbage = VerifyError::MalformedToken(DecodeError::Malformed("x".into()));
        assert_eq!(garbage.kind(), FailureKind::MalformedToken);

        // A bad signature can only be observed after the keyed decode.
        let sig = VerifyError::MalformedToken(DecodeError::SignatureInvalid);
        assert_eq!(sig.kind(), FailureKind::MalformedToken);
    }

    #[test]
    fn test_verification_failed_uses_reason_kind() {
        let err = VerifyError::VerificationFailed {
            client_key: "T1".into(),
            reason: DecodeError::SignatureInvalid,
        };
        assert_eq!(err.kind(), FailureKind::SignatureInvalid);
        assert_eq!(err.client_key(), Some("T1"));
        assert_eq!(VerifyError::MissingCredentials.client_key(), None);
    }

    #[test]
    fn test_response_is_uniform() {
        let a = VerifyError::QshMismatch {
            client_key: "secret-tenant".into(),
        }
        .into_response();
        let b = VerifyError::MissingCredentials.into_response();
        assert_eq!(a.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(b.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(a.headers(), b.headers());
    }
}
