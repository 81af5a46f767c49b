//! CORS/origin policy and admin-key authentication.

use axum::{
    extract::{Request, State},
    http::{HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

use flag_rush::errors::{AppError, ErrorKind};

use super::{ApiError, AppState};

const ALLOWED_METHODS: &str = "GET,POST,PUT,DELETE,OPTIONS";
const ALLOWED_HEADERS: &str = "content-type,x-api-key,x-request-id";
const MAX_AGE_SECS: &str = "86400";

/// Origin policy for the whole surface.
///
/// Browsers send `Origin` on cross-site requests; an allowed origin gets the
/// CORS headers, a disallowed one gets 403, and non-GET requests without an
/// origin are refused. Preflights short-circuit with 204.
pub async fn cors_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let allowed = match &origin {
        Some(origin) => state.config.allowed_origins.iter().any(|o| o == origin),
        None => true,
    };

    if !allowed {
        return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
    }

    if origin.is_none()
        && request.method() != Method::GET
        && request.method() != Method::OPTIONS
    {
        return (StatusCode::FORBIDDEN, "origin required").into_response();
    }

    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply_cors_headers(response.headers_mut(), origin.as_deref());
        response
            .headers_mut()
            .insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(MAX_AGE_SECS));
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut(), origin.as_deref());
    response
}

fn apply_cors_headers(headers: &mut axum::http::HeaderMap, origin: Option<&str>) {
    let Some(origin) = origin else {
        return;
    };
    if let Ok(value) = HeaderValue::from_str(origin) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
}

/// Gate `/api/admin` behind the shared `x-api-key` secret.
pub async fn admin_key_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());

    if presented != Some(state.config.admin_api_key.as_str()) {
        return ApiError::new(
            StatusCode::UNAUTHORIZED,
            AppError::new(ErrorKind::AuthenticationError, "invalid api key"),
        )
        .into_response();
    }

    next.run(request).await
}
