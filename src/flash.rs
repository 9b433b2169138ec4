//! One-shot notices carried across a redirect in a `flash` cookie.

use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};

pub const COOKIE_NAME: &str = "flash";

/// A message and its Bootstrap alert category (`success`, `danger`, `info`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flash {
    pub category: String,
    pub message: String,
}

impl Flash {
    fn new(category: &str, message: impl Into<String>) -> Self {
        Flash {
            category: category.to_string(),
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Flash::new("success", message)
    }

    pub fn danger(message: impl Into<String>) -> Self {
        Flash::new("danger", message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Flash::new("info", message)
    }
}

/// Cookie carrying `messages` to the next page view.
pub fn cookie(messages: &[Flash]) -> Cookie<'static> {
    let json = serde_json::to_string(messages).unwrap_or_else(|_| "[]".to_string());
    Cookie::build((COOKIE_NAME, urlencoding::encode(&json).into_owned()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Queue a message, keeping any already waiting.
pub fn push(jar: CookieJar, message: Flash) -> CookieJar {
    let mut messages = peek(&jar);
    messages.push(message);
    jar.add(cookie(&messages))
}

/// Messages waiting in `jar`. A malformed cookie reads as empty.
///
/// Cookies parsed from a request arrive already percent-decoded; ones added
/// to the jar during this request do not.
pub fn peek(jar: &CookieJar) -> Vec<Flash> {
    let Some(cookie) = jar.get(COOKIE_NAME) else {
        return Vec::new();
    };
    let raw = cookie.value();
    serde_json::from_str(raw)
        .ok()
        .or_else(|| {
            let json = urlencoding::decode(raw).ok()?;
            serde_json::from_str(&json).ok()
        })
        .unwrap_or_default()
}

/// See-other redirect to `to` carrying `message`.
pub fn redirect(jar: CookieJar, to: &str, message: Flash) -> Response {
    (push(jar, message), Redirect::to(to)).into_response()
}

/// Read and clear the pending messages.
pub fn take(jar: CookieJar) -> (CookieJar, Vec<Flash>) {
    let messages = peek(&jar);
    if jar.get(COOKIE_NAME).is_none() {
        return (jar, messages);
    }
    let jar = jar.remove(Cookie::build(COOKIE_NAME).path("/"));
    (jar, messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_survive_the_cookie() {
        let jar = push(CookieJar::new(), Flash::success("Saved."));
        let jar = push(jar, Flash::danger("But, also: \"careful\"; 100%"));

        let raw = jar.get(COOKIE_NAME).unwrap().value().to_string();
        assert!(!raw.contains(';'));
        assert!(!raw.contains('"'));

        let (jar, messages) = take(jar);
        assert_eq!(
            messages,
            vec![Flash::success("Saved."), Flash::danger("But, also: \"careful\"; 100%")]
        );
        assert!(peek(&jar).is_empty());
    }

    #[test]
    fn garbage_cookie_reads_as_empty() {
        let jar = CookieJar::new().add(Cookie::new(COOKIE_NAME, "%%%not-json"));
        assert!(peek(&jar).is_empty());
    }
}
