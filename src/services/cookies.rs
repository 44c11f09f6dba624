//! Request/response cookie jar
//!
//! Parses the `Cookie` request header once and collects `Set-Cookie` values
//! for the response. Handlers take the jar as an extractor, hand it to the
//! session manager, and return it as part of the response.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, HeaderValue},
    response::{IntoResponseParts, ResponseParts},
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;

/// `SameSite` cookie attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SameSite::Strict => f.write_str("Strict"),
            SameSite::Lax => f.write_str("Lax"),
            SameSite::None => f.write_str("None"),
        }
    }
}

/// A cookie queued for the `Set-Cookie` response header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub expires: Option<DateTime<Utc>>,
    pub max_age: Option<i64>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: Option<SameSite>,
}

impl SetCookie {
    /// A cookie scoped to `/` with no other attributes
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: "/".to_string(),
            expires: None,
            max_age: None,
            http_only: false,
            secure: false,
            same_site: None,
        }
    }

    /// Session cookie attributes: `HttpOnly; SameSite=Lax; Path=/`, `Secure`
    /// as requested, expiring at `expires`.
    pub fn session(
        name: impl Into<String>,
        value: impl Into<String>,
        expires: DateTime<Utc>,
        secure: bool,
    ) -> Self {
        Self {
            expires: Some(expires),
            http_only: true,
            secure,
            same_site: Some(SameSite::Lax),
            ..Self::new(name, value)
        }
    }

    /// A deletion for `name`: empty value, expired in the past.
    ///
    /// `__Secure-` and `__Host-` names are only accepted by browsers with the
    /// `Secure` attribute, so they always get it.
    pub fn removal(name: impl Into<String>, secure: bool) -> Self {
        let name = name.into();
        let secure = secure || name.starts_with("__Secure-") || name.starts_with("__Host-");
        Self {
            expires: DateTime::from_timestamp(0, 0),
            max_age: Some(0),
            http_only: true,
            secure,
            same_site: Some(SameSite::Lax),
            ..Self::new(name, "")
        }
    }

    pub fn is_removal(&self) -> bool {
        self.max_age == Some(0)
    }
}

impl fmt::Display for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}; Path={}", self.name, self.value, self.path)?;
        if let Some(expires) = self.expires {
            write!(f, "; Expires={}", expires.format("%a, %d %b %Y %H:%M:%S GMT"))?;
        }
        if let Some(max_age) = self.max_age {
            write!(f, "; Max-Age={}", max_age)?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        if let Some(same_site) = self.same_site {
            write!(f, "; SameSite={}", same_site)?;
        }
        Ok(())
    }
}

/// Cookies of one request plus the changes queued for its response
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    values: HashMap<String, String>,
    pending: Vec<SetCookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse every `Cookie` header. The first occurrence of a name wins.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut values = HashMap::new();

        for header_value in headers.get_all(header::COOKIE) {
            let Ok(cookie_str) = header_value.to_str() else {
                continue;
            };
            for pair in cookie_str.split(';') {
                let Some((name, value)) = pair.trim().split_once('=') else {
                    continue;
                };
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                let value = value.trim().trim_matches('"');
                values
                    .entry(name.to_string())
                    .or_insert_with(|| value.to_string());
            }
        }

        Self {
            values,
            pending: Vec::new(),
        }
    }

    /// Current value of a cookie, reflecting queued changes
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Queue a cookie. A later change to the same name replaces an earlier one.
    pub fn add(&mut self, cookie: SetCookie) {
        if cookie.is_removal() {
            self.values.remove(&cookie.name);
        } else {
            self.values.insert(cookie.name.clone(), cookie.value.clone());
        }
        self.pending.retain(|c| c.name != cookie.name);
        self.pending.push(cookie);
    }

    /// Queue deletion of a cookie, whether or not the request carried it
    pub fn remove(&mut self, name: &str, secure: bool) {
        self.add(SetCookie::removal(name, secure));
    }

    /// Changes queued so far
    pub fn pending(&self) -> &[SetCookie] {
        &self.pending
    }

    /// Queued change for `name`, if any
    pub fn pending_for(&self, name: &str) -> Option<&SetCookie> {
        self.pending.iter().find(|c| c.name == name)
    }

    /// Encode queued changes as `Set-Cookie` header values.
    ///
    /// A cookie that cannot be encoded is logged and skipped; the rest are
    /// still sent.
    pub fn into_header_values(self) -> Vec<HeaderValue> {
        self.pending
            .into_iter()
            .filter_map(|cookie| match HeaderValue::from_str(&cookie.to_string()) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!("Failed to encode cookie '{}': {}", cookie.name, e);
                    None
                }
            })
            .collect()
    }
}

impl<S> FromRequestParts<S> for CookieJar
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

impl IntoResponseParts for CookieJar {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        for value in self.into_header_values() {
            res.headers_mut().append(header::SET_COOKIE, value);
        }
        Ok(res)
    }
}
