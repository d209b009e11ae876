use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::IdempotencyError;

/// Standard response envelope produced by the service's handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseBody {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ResponseBody {
    pub fn success(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

/// Captured response body.
///
/// `Envelope` is only chosen when re-encoding the parsed envelope reproduces
/// the original bytes exactly; anything else is kept verbatim as `Raw`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CachedBody {
    Envelope(ResponseBody),
    Raw(String),
}

impl CachedBody {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdempotencyError> {
        if let Ok(envelope) = serde_json::from_slice::<ResponseBody>(bytes) {
            if serde_json::to_vec(&envelope).ok().as_deref() == Some(bytes) {
                return Ok(CachedBody::Envelope(envelope));
            }
        }

        let text = std::str::from_utf8(bytes).map_err(|e| IdempotencyError::Encode {
            reason: format!("response body is not UTF-8: {}", e),
        })?;
        Ok(CachedBody::Raw(text.to_string()))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, IdempotencyError> {
        match self {
            CachedBody::Envelope(envelope) => {
                serde_json::to_vec(envelope).map_err(|e| IdempotencyError::Encode {
                    reason: e.to_string(),
                })
            }
            CachedBody::Raw(text) => Ok(text.clone().into_bytes()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    pub name: String,
    pub value: String,
}

/// Headers that describe the transfer rather than the response itself.
fn is_transfer_header(name: &HeaderName) -> bool {
    *name == header::CONTENT_LENGTH
        || *name == header::TRANSFER_ENCODING
        || *name == header::CONNECTION
        || *name == header::DATE
}

fn deserialize_status<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let status = u16::deserialize(deserializer)?;
    StatusCode::from_u16(status)
        .map(|code| code.as_u16())
        .map_err(|_| serde::de::Error::custom(format!("invalid HTTP status {}", status)))
}

/// Snapshot of a completed response, persisted under the token's cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    #[serde(deserialize_with = "deserialize_status")]
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<HeaderEntry>,
    pub body: CachedBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_fingerprint: Option<String>,
    pub cached_at: DateTime<Utc>,
}

impl CachedResponse {
    /// Builds a snapshot from a buffered downstream response.
    pub fn capture(
        status: StatusCode,
        headers: &HeaderMap,
        body: &[u8],
        request_fingerprint: Option<String>,
    ) -> Result<Self, IdempotencyError> {
        let headers = headers
            .iter()
            .filter(|(name, _)| !is_transfer_header(name))
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| HeaderEntry {
                    name: name.as_str().to_string(),
                    value: v.to_string(),
                })
            })
            .collect();

        Ok(Self {
            status: status.as_u16(),
            headers,
            body: CachedBody::from_bytes(body)?,
            request_fingerprint,
            cached_at: Utc::now(),
        })
    }

    pub fn encode(&self) -> Result<String, IdempotencyError> {
        serde_json::to_string(self).map_err(|e| IdempotencyError::Encode {
            reason: e.to_string(),
        })
    }

    pub fn decode(key: &str, raw: &str) -> Result<Self, IdempotencyError> {
        serde_json::from_str(raw).map_err(|source| IdempotencyError::CorruptEntry {
            key: key.to_string(),
            source,
        })
    }

    /// Rebuilds the stored response: same status, headers and body bytes.
    pub fn to_response(&self) -> Result<Response, IdempotencyError> {
        let status = StatusCode::from_u16(self.status).map_err(|e| IdempotencyError::Encode {
            reason: format!("invalid stored status {}: {}", self.status, e),
        })?;
        let body = self.body.to_bytes()?;

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;

        let headers = response.headers_mut();
        for entry in &self.headers {
            match (
                HeaderName::from_bytes(entry.name.as_bytes()),
                HeaderValue::from_str(&entry.value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => tracing::warn!(header = %entry.name, "skipping unreplayable cached header"),
            }
        }

        Ok(response)
    }
}
