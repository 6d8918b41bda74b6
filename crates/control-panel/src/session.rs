//! Anonymous per-browser user context.
//!
//! Pending document uploads are keyed by this id. It is issued on first
//! contact and carried in an HTTP-only cookie.

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::Response,
};
use cookie::{Cookie, SameSite};

pub const SESSION_COOKIE_NAME: &str = "panel_session";

const SESSION_ID_LEN: usize = 32;

/// Identifies the browser making a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext(pub String);

/// Generate a random alphanumeric string
pub fn generate_random_string(len: usize) -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..len)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

fn is_valid_session_id(value: &str) -> bool {
    value.len() == SESSION_ID_LEN && value.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Read the session id from request headers
pub fn session_from_headers(headers: &HeaderMap) -> Option<String> {
    let cookie_str = headers.get(header::COOKIE)?.to_str().ok()?;

    for cookie_part in cookie_str.split(';') {
        if let Ok(cookie) = Cookie::parse(cookie_part.trim()) {
            if cookie.name() == SESSION_COOKIE_NAME && is_valid_session_id(cookie.value()) {
                return Some(cookie.value().to_string());
            }
        }
    }
    None
}

/// Middleware attaching a `UserContext`, issuing a cookie when needed.
pub async fn user_context(mut req: Request, next: Next) -> Response {
    let existing = session_from_headers(req.headers());
    let id = existing
        .clone()
        .unwrap_or_else(|| generate_random_string(SESSION_ID_LEN));
    req.extensions_mut().insert(UserContext(id.clone()));

    let mut response = next.run(req).await;

    if existing.is_none() {
        let cookie = Cookie::build((SESSION_COOKIE_NAME, id))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::days(30))
            .build();
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => tracing::error!("Failed to encode session cookie: {}", e),
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_random_string() {
        let id = generate_random_string(SESSION_ID_LEN);
        assert!(is_valid_session_id(&id));
        assert_ne!(id, generate_random_string(SESSION_ID_LEN));
    }

    #[test]
    fn test_session_from_headers() {
        let id = generate_random_string(SESSION_ID_LEN);
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {}={}", SESSION_COOKIE_NAME, id)).unwrap(),
        );
        assert_eq!(session_from_headers(&headers), Some(id));
    }

    #[test]
    fn test_malformed_session_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("panel_session=../../etc"),
        );
        assert_eq!(session_from_headers(&headers), None);
        assert_eq!(session_from_headers(&HeaderMap::new()), None);
    }
}
