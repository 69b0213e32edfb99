use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::application::auth::ApiIdentity;

use super::error::ApiError;
use super::state::ApiState;

/// Resolves the caller identity before any handler runs. Requests without a
/// token proceed as anonymous; only the public read surface will serve them.
/// A token that is presented but wrong is rejected outright.
pub async fn attach_identity(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token =
        extract_token(request.headers().get(axum::http::header::AUTHORIZATION)).or_else(|| {
            request
                .headers()
                .get("x-api-key")
                .and_then(|v| v.to_str().ok().map(|s| s.to_string()))
        });

    let identity = match token {
        Some(token) => match state.auth.authenticate(&token) {
            Ok(_) => ApiIdentity::admin(),
            Err(_) => return ApiError::unauthorized().into_response(),
        },
        None => ApiIdentity::anonymous(),
    };

    request.extensions_mut().insert(identity);

    next.run(request).await
}

pub async fn api_rate_limit(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let identity = match request.extensions().get::<ApiIdentity>() {
        Some(identity) => *identity,
        None => {
            warn!("missing identity in rate limit middleware");
            ApiIdentity::anonymous()
        }
    };

    let key = if identity.is_admin() {
        "admin"
    } else {
        "anonymous"
    };

    if !state.rate_limiter.allow(key, &path) {
        return ApiError::rate_limited(state.rate_limiter.retry_after_secs());
    }

    next.run(request).await
}

fn extract_token(header: Option<&axum::http::HeaderValue>) -> Option<String> {
    let raw = header?.to_str().ok()?;
    let bearer = raw.strip_prefix("Bearer ")?;
    Some(bearer.to_string())
}
