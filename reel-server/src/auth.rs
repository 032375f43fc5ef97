//! HTTP Basic guard for the admin surfaces.
//!
//! Ingestion routes never pass through here: the pages embedding the
//! recorder have no way to authenticate.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reel_core::config::AdminConfig;
use subtle::ConstantTimeEq;

use crate::http::HttpState;

pub const REALM: &str = r#"Basic realm="Restricted""#;

#[derive(Debug, Clone)]
pub struct AdminCredentials {
    username: String,
    password: String,
}

impl AdminCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Check an `Authorization` header. Both fields are always compared so
    /// the outcome does not reveal which one was wrong.
    pub fn verify(&self, header: Option<&HeaderValue>) -> bool {
        let Some((user, pass)) = header.and_then(parse_basic) else {
            return false;
        };

        let user_ok = user.as_bytes().ct_eq(self.username.as_bytes());
        let pass_ok = pass.as_bytes().ct_eq(self.password.as_bytes());
        (user_ok & pass_ok).into()
    }
}

impl From<&AdminConfig> for AdminCredentials {
    fn from(config: &AdminConfig) -> Self {
        Self::new(&config.username, &config.password)
    }
}

fn parse_basic(header: &HeaderValue) -> Option<(String, String)> {
    let value = header.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// 401 with a Basic challenge.
pub fn challenge() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(WWW_AUTHENTICATE, HeaderValue::from_static(REALM))],
        "Unauthorized",
    )
        .into_response()
}

/// Middleware for the admin router.
pub async fn require_admin(
    State(state): State<Arc<HttpState>>,
    request: Request,
    next: Next,
) -> Response {
    if state.credentials.verify(request.headers().get(AUTHORIZATION)) {
        next.run(request).await
    } else {
        tracing::debug!(path = %request.uri().path(), "Rejected admin request");
        challenge()
    }
}
