//! axum adapter for [`IdempotencyEnforcer`].
//!
//! ```rust,ignore
//! let enforcer = Arc::new(IdempotencyEnforcer::new(store, IdempotencyConfig::default()));
//! let app = Router::new()
//!     .route("/user", post(create_user))
//!     .route_layer(middleware::from_fn_with_state(enforcer, enforce_idempotency));
//! ```

use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;

use super::enforcer::IdempotencyEnforcer;
use super::error::IdempotencyError;
use super::key::{request_fingerprint, IdempotencyToken};

/// Middleware entry point: extracts the token, fingerprints the request if
/// configured, and hands the rest of the stack to the enforcer.
pub async fn enforce_idempotency(
    State(enforcer): State<Arc<IdempotencyEnforcer>>,
    request: Request,
    next: Next,
) -> Response {
    let config = enforcer.config();
    let token = match IdempotencyToken::from_headers(request.headers(), &config.header_name) {
        Some(token) if config.verify_fingerprint => token,
        token => {
            return enforcer
                .execute(token, None, move || next.run(request))
                .await
        }
    };

    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, config.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            // Nothing is locked yet, so there is nothing to release.
            let err = IdempotencyError::Capture {
                reason: format!("request body: {}", e),
            };
            return enforcer.reject(&token, &err);
        }
    };

    let fingerprint = request_fingerprint(&parts.method, &parts.uri, &bytes);
    let request = Request::from_parts(parts, Body::from(bytes));

    enforcer
        .execute(Some(token), Some(fingerprint), move || next.run(request))
        .await
}
