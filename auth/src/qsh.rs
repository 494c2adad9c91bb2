//! Query string hash (QSH).
//!
//! The issuer hashes a canonical form of the request it signs the token
//! for:
//!
//! ```text
//! UPPERCASE_METHOD & PATH & SORTED_ENCODED_QUERY
//! ```
//!
//! and embeds the lowercase hex SHA-256 as the `qsh` claim. Every function
//! here is pure; the same inputs always produce the same string.

use std::collections::BTreeMap;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::request::RequestDescriptor;

/// Query parameter that carries the token.
pub const DEFAULT_TOKEN_PARAM: &str = "jwt";

/// RFC 3986 unreserved characters pass through, everything else is escaped.
const QSH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub fn encode_component(input: &str) -> String {
    utf8_percent_encode(input, QSH_ENCODE_SET).to_string()
}

pub fn canonical_method(method: &str) -> String {
    method.to_ascii_uppercase()
}

/// Path as the issuer saw it.
///
/// When the full URL contains the tenant base URL, the path is whatever
/// follows it, without query or fragment. Otherwise `context_path` is
/// stripped from the front of the request path. An empty result is `/`.
pub fn canonical_path(
    request: &RequestDescriptor,
    base_url: Option<&str>,
    context_path: &str,
) -> String {
    let after_base = base_url.filter(|b| !b.is_empty()).and_then(|base| {
        request
            .full_url
            .find(base)
            .map(|idx| &request.full_url[idx + base.len()..])
    });

    let path = match after_base {
        Some(rest) => rest.split(['?', '#']).next().unwrap_or(rest),
        None => strip_context_path(&request.path, context_path),
    };

    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

fn strip_context_path<'a>(path: &'a str, context_path: &str) -> &'a str {
    let context_path = context_path.trim_end_matches('/');
    if context_path.is_empty() {
        return path;
    }
    match path.strip_prefix(context_path) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => path,
    }
}

/// Sorted, encoded query string with `excluded` names removed.
///
/// Names sort byte-wise. A repeated name contributes one pair whose values
/// are sorted, encoded one by one and joined with a literal `,`.
pub fn canonical_query<S: AsRef<str>>(params: &[(String, String)], excluded: &[S]) -> String {
    let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (name, value) in params {
        if excluded.iter().any(|e| e.as_ref() == name.as_str()) {
            continue;
        }
        grouped
            .entry(name.as_str())
            .or_default()
            .push(value.as_str());
    }

    grouped
        .into_iter()
        .map(|(name, mut values)| {
            values.sort_unstable();
            let values = values
                .into_iter()
                .map(encode_component)
                .collect::<Vec<_>>()
                .join(",");
            format!("{}={}", encode_component(name), values)
        })
        .collect::<Vec<_>>()
        .join("&")
}

pub fn canonical_request(method: &str, path: &str, query: &str) -> String {
    format!("{}&{}&{}", canonical_method(method), path, query)
}

pub fn hash_canonical_request(canonical: &str) -> String {
    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}

/// QSH for an already canonical `path`.
///
/// `token_param` and every name in `excluded` are left out. Signers pass the
/// same `token_param` the verifier is configured with.
pub fn compute_qsh<S: AsRef<str>>(
    method: &str,
    path: &str,
    params: &[(String, String)],
    token_param: &str,
    excluded: &[S],
) -> String {
    let mut skip: Vec<&str> = excluded.iter().map(AsRef::<str>::as_ref).collect();
    skip.push(token_param);
    let query = canonical_query(params, &skip);
    hash_canonical_request(&canonical_request(method, path, &query))
}

/// QSH of a request as received, relative to one tenant.
pub fn qsh_for_request<S: AsRef<str>>(
    request: &RequestDescriptor,
    base_url: Option<&str>,
    context_path: &str,
    token_param: &str,
    excluded: &[S],
) -> String {
    let path = canonical_path(request, base_url, context_path);
    compute_qsh(&request.method, &path, &request.query, token_param, excluded)
}

/// Constant-time comparison of a claimed and a recomputed hash.
pub fn qsh_matches(claimed: &str, computed: &str) -> bool {
    claimed.as_bytes().ct_eq(computed.as_bytes()).into()
}
