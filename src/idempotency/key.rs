use http::{HeaderMap, HeaderName, Method, Uri};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::observability::mask_sensitive;

/// Client-supplied idempotency token, trimmed and guaranteed non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyToken(String);

impl IdempotencyToken {
    /// Returns `None` for blank input, which disables the protocol for the request.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Reads the token from `header`. Values that are not visible ASCII count as absent.
    pub fn from_headers(headers: &HeaderMap, header: &HeaderName) -> Option<Self> {
        let value = headers.get(header)?;
        match value.to_str() {
            Ok(raw) => Self::parse(raw),
            Err(_) => {
                tracing::warn!(header = %header, "ignoring non-ASCII idempotency header value");
                None
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Token form safe to put in log lines.
    pub fn masked(&self) -> String {
        mask_sensitive(&self.0, 4)
    }
}

impl fmt::Display for IdempotencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives store keys for a token within one namespace.
#[derive(Debug, Clone)]
pub struct KeySpace {
    namespace: String,
}

impl KeySpace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// `<namespace>-Lock-<token>`
    pub fn lock_key(&self, token: &IdempotencyToken) -> String {
        format!("{}-Lock-{}", self.namespace, token.as_str())
    }

    /// `<namespace>-<token>`
    pub fn cache_key(&self, token: &IdempotencyToken) -> String {
        format!("{}-{}", self.namespace, token.as_str())
    }
}

/// SHA-256 over method, path and body, used to detect a token being reused
/// for a different request.
pub fn request_fingerprint(method: &Method, uri: &Uri, body: &[u8]) -> String {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());

    let mut hasher = Sha256::new();
    hasher.update(method.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(path.as_bytes());
    hasher.update(b"|");
    hasher.update(body);

    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_parse_trims_whitespace() {
        let token = IdempotencyToken::parse("  abc \t").unwrap();
        assert_eq!(token.as_str(), "abc");
    }

    #[test]
    fn test_parse_blank_is_none() {
        assert!(IdempotencyToken::parse("").is_none());
        assert!(IdempotencyToken::parse("   ").is_none());
    }

    #[test]
    fn test_from_headers() {
        let name = HeaderName::from_static("idempotency-key");
        let mut headers = HeaderMap::new();
        assert!(IdempotencyToken::from_headers(&headers, &name).is_none());

        headers.insert(name.clone(), HeaderValue::from_static(" order-42 "));
        let token = IdempotencyToken::from_headers(&headers, &name).unwrap();
        assert_eq!(token.as_str(), "order-42");

        headers.insert(name.clone(), HeaderValue::from_static("   "));
        assert!(IdempotencyToken::from_headers(&headers, &name).is_none());

        headers.insert(name.clone(), HeaderValue::from_bytes(b"\xffbad").unwrap());
        assert!(IdempotencyToken::from_headers(&headers, &name).is_none());
    }

    #[test]
    fn test_key_layout() {
        let keys = KeySpace::new("Idempotency-Key");
        let token = IdempotencyToken::parse("abc").unwrap();
        assert_eq!(keys.lock_key(&token), "Idempotency-Key-Lock-abc");
        assert_eq!(keys.cache_key(&token), "Idempotency-Key-abc");
    }

    #[test]
    fn test_masked_token() {
        let token = IdempotencyToken::parse("0123456789abcdef").unwrap();
        assert_eq!(token.masked(), "0123********cdef");
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let uri: Uri = "/user?x=1".parse().unwrap();
        let a = request_fingerprint(&Method::POST, &uri, b"{\"name\":\"a\"}");
        let b = request_fingerprint(&Method::POST, &uri, b"{\"name\":\"a\"}");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_differs_by_body_path_and_method() {
        let uri: Uri = "/user".parse().unwrap();
        let other: Uri = "/user?dry_run=true".parse().unwrap();
        let base = request_fingerprint(&Method::POST, &uri, b"a");
        assert_ne!(base, request_fingerprint(&Method::POST, &uri, b"b"));
        assert_ne!(base, request_fingerprint(&Method::POST, &other, b"a"));
        assert_ne!(base, request_fingerprint(&Method::PUT, &uri, b"a"));
    }
}
