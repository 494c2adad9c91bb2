//! Claims carried by a Connect token.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Decoded token payload.
///
/// Untrusted until `TokenDecoder::verify_and_decode` has checked the
/// signature with the tenant secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Tenant client key.
    pub iss: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(
        default,
        deserialize_with = "numeric_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub exp: Option<i64>,
    #[serde(
        default,
        deserialize_with = "numeric_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub nbf: Option<i64>,
    #[serde(
        default,
        deserialize_with = "numeric_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub iat: Option<i64>,
    /// Query string hash binding the token to one request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qsh: Option<String>,
    /// Product specific context, e.g. `{"user": {"accountId": "..."}}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

/// Seconds since the epoch; fractional values are truncated toward the past.
fn numeric_date<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value.map(|secs| secs.floor() as i64))
}

impl TokenClaims {
    /// Acting principal: `context.user.accountId` when present, else `sub`.
    pub fn principal_id(&self) -> Option<String> {
        self.account_id()
            .map(str::to_string)
            .or_else(|| self.sub.clone())
    }

    fn account_id(&self) -> Option<&str> {
        self.context
            .as_ref()?
            .get("user")?
            .get("accountId")?
            .as_str()
    }
}
