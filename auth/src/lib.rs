//! Authentication for multi-tenant Connect webhooks.
//!
//! This crate provides:
//! - Two-phase decoding of per-tenant HS256 tokens, rejecting `alg: none`
//! - Query string hash (QSH) canonicalization binding a token to its request
//! - Request verification against a pluggable tenant directory
//! - axum middleware and install/uninstall lifecycle handlers

mod audit;
mod claims;
mod config;
mod decoder;
mod error;
mod lifecycle;
mod middleware;
pub mod qsh;
mod request;
mod tenant;
mod verifier;

pub use audit::{AuditLog, TracingLogger, VerificationEvent, VerificationLogger, VerificationOutcome};
pub use claims::TokenClaims;
pub use config::ConnectAuthConfig;
pub use decoder::{inspect_algorithm, DecoderOptions, TokenDecoder, EXPECTED_ALGORITHM};
pub use error::{
    ConfigError, DecodeError, DirectoryError, FailureKind, VerifyError, VerifyResult,
};
pub use lifecycle::{
    installed_handler, uninstalled_handler, InstallOutcome, InstallPayload, LifecycleError,
    LifecycleHandler, UninstallPayload,
};
pub use middleware::{
    connect_auth_middleware, extract_token, ConnectAuthState, ConnectPrincipal,
    ConnectPrincipalExt, TokenSource, AUTH_SCHEME,
};
pub use qsh::compute_qsh;
pub use request::RequestDescriptor;
pub use tenant::{MemoryTenantDirectory, TenantDirectory, TenantRecord, TenantStore};
pub use verifier::{RequestVerifier, Verified};
