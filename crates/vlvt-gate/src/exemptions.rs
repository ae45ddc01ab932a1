//! Exemption rules shared by the signing and CSRF guards.

use axum::http::{HeaderMap, Method, header::AUTHORIZATION};

/// Allow-list of request paths that bypass a guard.
///
/// Entry forms:
/// - `/health` matches `/health` and anything below it (`/health/live`)
/// - `/auth/callback*` matches any path starting with `/auth/callback`
#[derive(Debug, Clone, Default)]
pub struct PathRules {
    entries: Vec<String>,
}

impl PathRules {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(Into::into)
                .filter(|e: &String| !e.is_empty())
                .collect(),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.entries.iter().any(|entry| {
            if let Some(prefix) = entry.strip_suffix('*') {
                return path.starts_with(prefix);
            }
            let entry = entry.trim_end_matches('/');
            path == entry
                || path
                    .strip_prefix(entry)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// GET, HEAD and OPTIONS never mutate state
pub fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// True if the request carries `Authorization: Bearer <token>`.
///
/// Bearer callers are API clients, not browsers holding ambient cookies.
pub fn has_bearer_auth(headers: &HeaderMap) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.get(..7))
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("bearer "))
}
