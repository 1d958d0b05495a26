//! Optional bearer token on every API and WebSocket route

use axum::http::HeaderMap;
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct BearerAuth {
    token: Option<String>,
}

impl BearerAuth {
    /// An empty token disables auth
    pub fn new(token: &str) -> Self {
        let token = token.trim();
        Self {
            token: (!token.is_empty()).then(|| token.to_string()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.token.is_some()
    }

    /// Check the `Authorization: Bearer` header, then a `token` query value.
    /// Browsers cannot set headers on a WebSocket upgrade, hence the query.
    pub fn allows(&self, headers: &HeaderMap, query_token: Option<&str>) -> bool {
        let Some(expected) = &self.token else {
            return true;
        };
        let provided = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(bearer)
            .or(query_token.map(str::trim).filter(|t| !t.is_empty()));
        match provided {
            Some(token) => constant_time_eq(expected.as_bytes(), token.as_bytes()),
            None => {
                warn!("Gateway request without a token");
                false
            }
        }
    }
}

/// Token of an `Authorization: Bearer <token>` value
pub fn bearer(header_value: &str) -> Option<&str> {
    let token = header_value.trim().strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
