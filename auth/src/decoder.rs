//! Two-phase token decoding.
//!
//! The signing secret is per tenant and the tenant is only named inside the
//! token, so decoding happens twice:
//! 1. `peek_unverified` reads the claims without a key, solely to learn `iss`.
//! 2. `verify_and_decode` decodes again with the tenant secret and checks the
//!    signature.
//!
//! Both phases reject any header algorithm other than HS256 before touching
//! the payload, so an `alg: none` token never reaches tenant lookup.
//!
//! Time claims are optional. `exp` and `nbf` are only checked when present
//! and when `DecoderOptions::verify_expiration` is set.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Header, Validation};
use serde::Deserialize;

use crate::{claims::TokenClaims, error::DecodeError};

/// The only accepted signing algorithm.
pub const EXPECTED_ALGORITHM: Algorithm = Algorithm::HS256;

/// Time-claim handling, passed explicitly to every decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderOptions {
    pub verify_expiration: bool,
    pub leeway_secs: u64,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            verify_expiration: true,
            leeway_secs: 0,
        }
    }
}

/// Only the algorithm is read from the raw header; `jsonwebtoken::Header`
/// cannot represent `none`.
#[derive(Deserialize)]
struct RawHeader {
    alg: String,
}

/// Splits a compact token into header and payload segments.
fn segments(token: &str) -> Result<(&str, &str), DecodeError> {
    let mut segments = token.split('.');
    let (Some(header), Some(payload), Some(_), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(DecodeError::Malformed(
            "expected three dot-separated segments".to_string(),
        ));
    };
    Ok((header, payload))
}

fn decode_segment<T: serde::de::DeserializeOwned>(
    segment: &str,
    what: &str,
) -> Result<T, DecodeError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| DecodeError::Malformed(format!("{what} is not base64url: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| DecodeError::Malformed(format!("{what} is not valid JSON: {e}")))
}

/// Returns the `alg` field of the unverified header.
pub fn inspect_algorithm(token: &str) -> Result<String, DecodeError> {
    let (header, _) = segments(token)?;
    let raw: RawHeader = decode_segment(header, "header")?;
    Ok(raw.alg)
}

fn ensure_expected_algorithm(token: &str) -> Result<(), DecodeError> {
    let alg = inspect_algorithm(token)?;
    if alg != "HS256" {
        return Err(DecodeError::DisallowedAlgorithm(alg));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenDecoder {
    options: DecoderOptions,
}

impl TokenDecoder {
    pub fn new(options: DecoderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> DecoderOptions {
        self.options
    }

    /// Decodes the claims without checking the signature.
    ///
    /// Time claims are still checked when expiration checking is enabled.
    /// The result may only be used to pick a lookup key.
    pub fn peek_unverified(&self, token: &str) -> Result<TokenClaims, DecodeError> {
        ensure_expected_algorithm(token)?;

        let (_, payload) = segments(token)?;
        let claims: TokenClaims = decode_segment(payload, "payload")?;
        self.check_time_claims(&claims)?;
        Ok(claims)
    }

    /// Decodes the token, checking the HS256 signature against `secret`.
    pub fn verify_and_decode(
        &self,
        token: &str,
        secret: &str,
    ) -> Result<(TokenClaims, Header), DecodeError> {
        ensure_expected_algorithm(token)?;

        let key = DecodingKey::from_secret(secret.as_bytes());
        let data = decode::<TokenClaims>(token, &key, &signature_only())?;
        self.check_time_claims(&data.claims)?;
        Ok((data.claims, data.header))
    }

    fn check_time_claims(&self, claims: &TokenClaims) -> Result<(), DecodeError> {
        if !self.options.verify_expiration {
            return Ok(());
        }
        let now = Utc::now().timestamp();
        let leeway = i64::try_from(self.options.leeway_secs).unwrap_or(i64::MAX);

        if let Some(exp) = claims.exp {
            if exp.saturating_add(leeway) < now {
                return Err(DecodeError::Expired);
            }
        }
        if let Some(nbf) = claims.nbf {
            if nbf > now.saturating_add(leeway) {
                return Err(DecodeError::NotYetValid);
            }
        }
        Ok(())
    }
}

/// HS256 signature check only; time claims are handled by
/// `TokenDecoder::check_time_claims`.
fn signature_only() -> Validation {
    let mut validation = Validation::new(EXPECTED_ALGORITHM);
    validation.validate_aud = false;
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.required_spec_claims.clear();
    validation
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{encode, EncodingKey};
    use serde_json::json;

    use super::*;

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn sign(payload: &serde_json::Value, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            payload,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn unsigned(alg: &str, payload: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(json!({"alg": alg, "typ": "JWT"}).to_string());
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{body}.")
    }

    #[test]
    fn test_peek_reads_issuer_without_secret() {
        let token = sign(&json!({"iss": "T1", "exp": now() + 60}), "s1");
        let claims = TokenDecoder::default().peek_unverified(&token).unwrap();
        assert_eq!(claims.iss, "T1");
    }

    #[test]
    fn test_peek_rejects_alg_none() {
        let token = unsigned("none", &json!({"iss": "T1", "exp": now() + 60}));
        let err = TokenDecoder::default().peek_unverified(&token).unwrap_err();
        assert_eq!(err, DecodeError::DisallowedAlgorithm("none".to_string()));
    }

    #[test]
    fn test_verify_rejects_other_algorithms() {
        let token = encode(
            &Header::new(Algorithm::HS512),
            &json!({"iss": "T1", "exp": now() + 60}),
            &EncodingKey::from_secret(b"s1"),
        )
        .unwrap();
        let err = TokenDecoder::default()
            .verify_and_decode(&token, "s1")
            .unwrap_err();
        assert_eq!(err, DecodeError::DisallowedAlgorithm("HS512".to_string()));
    }

    #[test]
    fn test_verify_checks_signature() {
        let token = sign(&json!({"iss": "T1", "exp": now() + 60}), "s1");
        let decoder = TokenDecoder::default();

        let (claims, header) = decoder.verify_and_decode(&token, "s1").unwrap();
        assert_eq!(claims.iss, "T1");
        assert_eq!(header.alg, Algorithm::HS256);

        assert_eq!(
            decoder.verify_and_decode(&token, "s2").unwrap_err(),
            DecodeError::SignatureInvalid
        );
    }

    #[test]
    fn test_expiration_is_optional() {
        let token = sign(&json!({"iss": "T1", "exp": now() - 3600}), "s1");

        let strict = TokenDecoder::default();
        assert_eq!(
            strict.peek_unverified(&token).unwrap_err(),
            DecodeError::Expired
        );
        assert_eq!(
            strict.verify_and_decode(&token, "s1").unwrap_err(),
            DecodeError::Expired
        );

        let lenient = TokenDecoder::new(DecoderOptions {
            verify_expiration: false,
            leeway_secs: 0,
        });
        assert!(lenient.peek_unverified(&token).is_ok());
        assert!(lenient.verify_and_decode(&token, "s1").is_ok());
    }

    #[test]
    fn test_leeway_tolerates_small_skew() {
        let token = sign(&json!({"iss": "T1", "exp": now() - 5}), "s1");
        let decoder = TokenDecoder::new(DecoderOptions {
            verify_expiration: true,
            leeway_secs: 60,
        });
        assert!(decoder.verify_and_decode(&token, "s1").is_ok());
    }

    #[test]
    fn test_time_claims_are_optional() {
        let token = sign(&json!({"iss": "T1", "sub": "u1"}), "s1");
        let decoder = TokenDecoder::default();

        assert_eq!(decoder.peek_unverified(&token).unwrap().iss, "T1");
        let (claims, _) = decoder.verify_and_decode(&token, "s1").unwrap();
        assert_eq!(claims.exp, None);
        assert_eq!(claims.sub.as_deref(), Some("u1"));
    }

    #[test]
    fn test_fractional_exp() {
        let decoder = TokenDecoder::default();

        let live = sign(&json!({"iss": "T1", "exp": now() as f64 + 60.5}), "s1");
        assert!(decoder.peek_unverified(&live).is_ok());
        assert!(decoder.verify_and_decode(&live, "s1").is_ok());

        let stale = sign(&json!({"iss": "T1", "exp": now() as f64 - 3600.25}), "s1");
        assert_eq!(
            decoder.verify_and_decode(&stale, "s1").unwrap_err(),
            DecodeError::Expired
        );
    }

    #[test]
    fn test_not_before_follows_expiration_flag() {
        let token = sign(&json!({"iss": "T1", "nbf": now() + 3600}), "s1");

        let strict = TokenDecoder::default();
        assert_eq!(
            strict.peek_unverified(&token).unwrap_err(),
            DecodeError::NotYetValid
        );
        assert_eq!(
            strict.verify_and_decode(&token, "s1").unwrap_err(),
            DecodeError::NotYetValid
        );

        let lenient = TokenDecoder::new(DecoderOptions {
            verify_expiration: false,
            leeway_secs: 0,
        });
        assert!(lenient.verify_and_decode(&token, "s1").is_ok());
    }

    #[test]
    fn test_malformed_tokens() {
        let decoder = TokenDecoder::default();
        for token in ["", "abc", "a.b", "a.b.c.d", "!!!.e30.sig"] {
            assert!(
                matches!(
                    decoder.peek_unverified(token),
                    Err(DecodeError::Malformed(_))
                ),
                "{token:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_missing_issuer_is_malformed() {
        let token = sign(&json!({"sub": "u", "exp": now() + 60}), "s1");
        assert!(matches!(
            TokenDecoder::default().peek_unverified(&token),
            Err(DecodeError::Malformed(_))
        ));
    }
}
