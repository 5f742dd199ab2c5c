//! Session cookie parsing and formatting.

use axum::http::{HeaderMap, header::COOKIE};

/// Default session cookie name.
pub const DEFAULT_COOKIE_NAME: &str = "realm_session";

/// How the session cookie is named and issued.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub name: String,
    /// Adds the `Secure` attribute. Disable only for plain-http development.
    pub secure: bool,
    /// `Max-Age` of issued cookies, normally the session TTL.
    pub max_age_secs: u64,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_COOKIE_NAME.to_string(),
            secure: true,
            max_age_secs: crate::session::DEFAULT_TTL_SECS,
        }
    }
}

impl CookieSettings {
    /// Session id carried by the request, if any. Empty values count as absent.
    pub fn session_id<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|header| token_from_cookie_header(header, &self.name))
            .filter(|value| !value.is_empty())
    }

    /// `Set-Cookie` value issuing `session_id`.
    pub fn issue(&self, session_id: &str) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax;{} Max-Age={}",
            self.name,
            session_id,
            self.secure_flag(),
            self.max_age_secs
        )
    }

    /// `Set-Cookie` value that makes the browser drop the cookie.
    pub fn clear(&self) -> String {
        format!(
            "{}=; Path=/; HttpOnly; SameSite=Lax;{} Max-Age=0",
            self.name,
            self.secure_flag()
        )
    }

    fn secure_flag(&self) -> &'static str {
        if self.secure { " Secure;" } else { "" }
    }
}

fn token_from_cookie_header<'a>(cookie_header: &'a str, cookie_name: &str) -> Option<&'a str> {
    cookie_header.split(';').map(str::trim).find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        if name.trim() == cookie_name {
            Some(value.trim())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    #[test]
    fn test_session_id_from_cookie_header() {
        let settings = CookieSettings::default();
        let headers = headers("theme=dark; realm_session=abc123; other=1");
        assert_eq!(settings.session_id(&headers), Some("abc123"));
    }

    #[test]
    fn test_session_id_missing_or_empty() {
        let settings = CookieSettings::default();
        assert_eq!(settings.session_id(&HeaderMap::new()), None);
        assert_eq!(settings.session_id(&headers("theme=dark")), None);
        assert_eq!(settings.session_id(&headers("realm_session=")), None);
    }

    #[test]
    fn test_issue_and_clear() {
        let mut settings = CookieSettings {
            max_age_secs: 60,
            ..CookieSettings::default()
        };
        assert_eq!(
            settings.issue("abc"),
            "realm_session=abc; Path=/; HttpOnly; SameSite=Lax; Secure; Max-Age=60"
        );

        settings.secure = false;
        assert_eq!(
            settings.clear(),
            "realm_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"
        );
    }
}
