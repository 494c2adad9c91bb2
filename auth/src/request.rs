//! Read-only view of the inbound request used for QSH computation.

use http::{header, request::Parts, HeaderMap, Method, Uri};
use url::{form_urlencoded, Url};

/// Method, path, full URL and decoded query pairs of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub method: String,
    pub path: String,
    pub full_url: String,
    /// Decoded `(name, value)` pairs in request order. Repeated names are
    /// kept as separate pairs.
    pub query: Vec<(String, String)>,
}

impl RequestDescriptor {
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        full_url: impl Into<String>,
        query: Vec<(String, String)>,
    ) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            full_url: full_url.into(),
            query,
        }
    }

    /// Builds a descriptor from an absolute URL.
    pub fn from_url(method: impl Into<String>, url: &str) -> Result<Self, url::ParseError> {
        let parsed = Url::parse(url)?;
        Ok(Self {
            method: method.into(),
            path: parsed.path().to_string(),
            full_url: url.to_string(),
            query: parsed.query_pairs().into_owned().collect(),
        })
    }

    /// Builds a descriptor from an HTTP request head.
    pub fn from_parts(parts: &Parts) -> Self {
        Self::from_head(&parts.method, &parts.uri, &parts.headers)
    }

    /// Origin-form URIs are made absolute from `X-Forwarded-Proto` and
    /// `X-Forwarded-Host`/`Host`.
    pub fn from_head(method: &Method, uri: &Uri, headers: &HeaderMap) -> Self {
        let path_and_query = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let full_url = match (uri.scheme_str(), uri.authority()) {
            (Some(scheme), Some(authority)) => format!("{scheme}://{authority}{path_and_query}"),
            _ => {
                let scheme = header_str(headers, "x-forwarded-proto").unwrap_or("http");
                let host = header_str(headers, "x-forwarded-host")
                    .or_else(|| header_str(headers, header::HOST.as_str()))
                    .unwrap_or("localhost");
                format!("{scheme}://{host}{path_and_query}")
            }
        };

        Self {
            method: method.as_str().to_string(),
            path: uri.path().to_string(),
            full_url,
            query: parse_query(uri.query().unwrap_or_default()),
        }
    }

    /// First value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Decodes an `application/x-www-form-urlencoded` query string.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use http::Request;

    use super::*;

    #[test]
    fn test_from_url() {
        let req =
            RequestDescriptor::from_url("get", "https://addon.example.com/hook?b=2&a=x%20y&a=z")
                .unwrap();
        assert_eq!(req.path, "/hook");
        assert_eq!(
            req.query,
            vec![
                ("b".to_string(), "2".to_string()),
                ("a".to_string(), "x y".to_string()),
                ("a".to_string(), "z".to_string()),
            ]
        );
        assert_eq!(req.query_param("a"), Some("x y"));
        assert_eq!(req.query_param("missing"), None);
    }

    #[test]
    fn test_from_parts_uses_forwarded_headers() {
        let (parts, _) = Request::post("/app/hook?jwt=t")
            .header("host", "internal:8080")
            .header("x-forwarded-proto", "https")
            .header("x-forwarded-host", "addon.example.com")
            .body(())
            .unwrap()
            .into_parts();

        let req = RequestDescriptor::from_parts(&parts);
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/app/hook");
        assert_eq!(req.full_url, "https://addon.example.com/app/hook?jwt=t");
        assert_eq!(req.query_param("jwt"), Some("t"));
    }

    #[test]
    fn test_from_parts_absolute_uri() {
        let (parts, _) = Request::get("http://h.example/x")
            .body(())
            .unwrap()
            .into_parts();
        let req = RequestDescriptor::from_parts(&parts);
        assert_eq!(req.full_url, "http://h.example/x");
        assert!(req.query.is_empty());
    }
}
