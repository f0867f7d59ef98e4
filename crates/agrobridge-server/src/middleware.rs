use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, RETRY_AFTER},
        HeaderValue, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Caller-supplied request ids longer than this are replaced.
const MAX_REQUEST_ID_LEN: usize = 128;

/// Rate-limit key shared by every request without an accepted bearer token.
const ANONYMOUS_CALLER: &str = "";

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Seller API key settings used by the write routes.
#[derive(Debug, Clone)]
pub struct AuthState {
    api_keys: Arc<HashSet<String>>,
    pub enabled: bool,
}

impl AuthState {
    /// Builds auth config from `AGROBRIDGE_API_KEYS` (comma-separated bearer tokens).
    ///
    /// # Errors
    ///
    /// Fails outside development when no keys are configured.
    pub fn from_env(is_development: bool) -> anyhow::Result<Self> {
        let raw = std::env::var("AGROBRIDGE_API_KEYS").unwrap_or_default();
        Self::from_keys(&raw, is_development)
    }

    /// Builds auth config from a comma-separated key list.
    ///
    /// In development an empty list disables auth for local iteration.
    /// Elsewhere an empty list is a startup error.
    ///
    /// # Errors
    ///
    /// Fails outside development when `raw` holds no keys.
    pub fn from_keys(raw: &str, is_development: bool) -> anyhow::Result<Self> {
        let keys: HashSet<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .collect();

        if keys.is_empty() {
            if is_development {
                tracing::warn!(
                    "AGROBRIDGE_API_KEYS not set; seller write routes are open in development"
                );
                return Ok(Self {
                    api_keys: Arc::new(HashSet::new()),
                    enabled: false,
                });
            }

            anyhow::bail!(
                "AGROBRIDGE_API_KEYS is required outside development; provide comma-separated bearer tokens"
            );
        }

        Ok(Self {
            api_keys: Arc::new(keys),
            enabled: true,
        })
    }

    fn allows(&self, token: &str) -> bool {
        self.api_keys.contains(token)
    }

    /// Rate-limit key for a request: its token when that token is a
    /// configured key, otherwise [`ANONYMOUS_CALLER`].
    fn caller_key<'a>(&self, authorization: Option<&'a HeaderValue>) -> &'a str {
        match extract_bearer_token(authorization) {
            Some(token) if self.enabled && self.allows(token) => token,
            _ => ANONYMOUS_CALLER,
        }
    }
}

/// Requests counted for one caller in the current window.
#[derive(Debug, Clone, Copy)]
struct Window {
    opened: Instant,
    used: usize,
}

/// Fixed-window limiter with one window per caller.
///
/// Callers are told apart by their accepted bearer token. Requests without
/// one, or with an unknown one, share a single anonymous window.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    callers: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            callers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Counts one request for `caller`.
    ///
    /// Returns how long until the caller's window reopens when it is full.
    async fn try_acquire(&self, caller: &str) -> Result<(), Duration> {
        let mut callers = self.callers.lock().await;
        let now = Instant::now();
        // Expired windows are dropped; the next request opens a fresh one.
        callers.retain(|_, w| now.duration_since(w.opened) < self.window);

        let window = callers.entry(caller.to_owned()).or_insert(Window {
            opened: now,
            used: 0,
        });
        if window.used >= self.max_requests {
            return Err(self.window.saturating_sub(now.duration_since(window.opened)));
        }
        window.used += 1;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct MiddlewareErrorBody {
    error: MiddlewareError,
    meta: MiddlewareMeta,
}

#[derive(Debug, Serialize)]
struct MiddlewareError {
    code: &'static str,
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct MiddlewareMeta {
    request_id: Option<String>,
}

fn reject(req: &Request, status: StatusCode, code: &'static str, message: &'static str) -> Response {
    let request_id = req.extensions().get::<RequestId>().map(|id| id.0.clone());
    (
        status,
        Json(MiddlewareErrorBody {
            error: MiddlewareError { code, message },
            meta: MiddlewareMeta { request_id },
        }),
    )
        .into_response()
}

/// Extracts or generates a request ID.
///
/// A usable incoming `x-request-id` header is kept; anything missing, empty,
/// or longer than 128 bytes is replaced by a fresh `UUIDv4`. The ID is stored
/// as a [`RequestId`] extension and echoed on the response.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }

    res
}

/// Enforces Bearer token auth when enabled.
pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    if !auth.enabled {
        return next.run(req).await;
    }

    match extract_bearer_token(req.headers().get(AUTHORIZATION)) {
        Some(token) if auth.allows(token) => next.run(req).await,
        _ => reject(
            &req,
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid bearer token",
        ),
    }
}

/// Enforces the per-caller request limit, answering 429 with `Retry-After`.
///
/// Runs ahead of [`require_bearer_auth`], so rejected tokens are still
/// counted against the anonymous window.
pub async fn enforce_rate_limit(
    State((rate_limit, auth)): State<(RateLimitState, AuthState)>,
    req: Request,
    next: Next,
) -> Response {
    let caller = auth.caller_key(req.headers().get(AUTHORIZATION)).to_owned();

    if let Err(retry_after) = rate_limit.try_acquire(&caller).await {
        let retry_secs = retry_after.as_secs().max(1);
        tracing::warn!(
            path = %req.uri().path(),
            retry_after_secs = retry_secs,
            anonymous = caller == ANONYMOUS_CALLER,
            "seller rate limit exceeded"
        );
        let mut res = reject(
            &req,
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "too many requests; retry later",
        );
        res.headers_mut().insert(RETRY_AFTER, HeaderValue::from(retry_secs));
        return res;
    }

    next.run(req).await
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
