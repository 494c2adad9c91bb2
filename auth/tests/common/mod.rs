//! Shared helpers for connect-auth integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use connect_auth::{
    qsh::{canonical_path, canonical_query, canonical_request, hash_canonical_request},
    ConnectAuthConfig, MemoryTenantDirectory, RequestDescriptor, RequestVerifier, TenantRecord,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

pub const ADDON_KEY: &str = "com.example.addon";
pub const CLIENT_KEY: &str = "T1";
pub const SECRET: &str = "s1-shared-secret";
pub const BASE_URL: &str = "https://t1.example.net/wiki";

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[expect(
    clippy::expect_used,
    reason = "test helper: panic on failure is intentional"
)]
pub fn sign(claims: &Value, secret: &str) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("sign test token")
}

/// Token with the given header algorithm and an empty or junk signature.
pub fn forged(alg: &str, claims: &Value, signature: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(json!({"alg": alg, "typ": "JWT"}).to_string());
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.{signature}")
}

pub fn claims(extra: Value) -> Value {
    let mut base = json!({
        "iss": CLIENT_KEY,
        "sub": "sub-1",
        "iat": now(),
        "exp": now() + 180,
    });
    if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            base.insert(k.clone(), v.clone());
        }
    }
    base
}

/// QSH the way a signer computes it for `request`.
pub fn signer_qsh(request: &RequestDescriptor, base_url: Option<&str>, excluded: &[&str]) -> String {
    let mut skip = vec!["jwt"];
    skip.extend_from_slice(excluded);
    let path = canonical_path(request, base_url, "");
    let query = canonical_query(&request.query, &skip);
    hash_canonical_request(&canonical_request(&request.method, &path, &query))
}

pub fn tenant() -> TenantRecord {
    TenantRecord::new(CLIENT_KEY, ADDON_KEY, SECRET).with_base_url(BASE_URL)
}

pub fn directory() -> Arc<MemoryTenantDirectory> {
    Arc::new(MemoryTenantDirectory::with_records([tenant()]))
}

#[expect(
    clippy::expect_used,
    reason = "test helper: panic on failure is intentional"
)]
pub fn verifier(config: ConnectAuthConfig) -> RequestVerifier {
    RequestVerifier::new(directory(), config).expect("valid test config")
}
