//! Caller identity from the authenticating gateway.
//!
//! Sources, in order: the gateway's identity header, then the `email` claim
//! of the gateway's token cookie. The token signature is not verified here;
//! the gateway in front of the control plane already did that. Anything
//! unreadable counts as no identity.

use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use serde::Deserialize;

/// Identity used when neither source yields an email.
pub const ANONYMOUS: &str = "anonymous";

/// Where the gateway puts the caller's identity.
#[derive(Debug, Clone)]
pub struct IdentitySource {
    pub header: String,
    pub cookie: String,
}

impl From<&pifleet_core::config::AuthConfig> for IdentitySource {
    fn from(cfg: &pifleet_core::config::AuthConfig) -> Self {
        Self {
            header: cfg.identity_header.clone(),
            cookie: cfg.identity_cookie.clone(),
        }
    }
}

#[derive(Deserialize)]
struct TokenClaims {
    email: Option<String>,
}

/// Email of the caller, if the request carries one.
pub fn extract_identity(headers: &HeaderMap, source: &IdentitySource) -> Option<String> {
    header_identity(headers, &source.header).or_else(|| cookie_identity(headers, &source.cookie))
}

/// [`extract_identity`] with the [`ANONYMOUS`] fallback.
pub fn identity_or_anonymous(headers: &HeaderMap, source: &IdentitySource) -> String {
    extract_identity(headers, source).unwrap_or_else(|| ANONYMOUS.to_string())
}

fn header_identity(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn cookie_identity(headers: &HeaderMap, name: &str) -> Option<String> {
    let token = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim())?;
    email_claim(token)
}

/// `email` claim of the gateway's JWT. Signature and expiry are not checked.
pub fn email_claim(token: &str) -> Option<String> {
    let data = jsonwebtoken::dangerous::insecure_decode::<TokenClaims>(token).ok()?;
    data.claims
        .email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    fn source() -> IdentitySource {
        IdentitySource {
            header: "cf-access-authenticated-user-email".into(),
            cookie: "CF_Authorization".into(),
        }
    }

    fn token(payload: &str) -> String {
        format!("eyJhbGciOiJSUzI1NiJ9.{}.c2ln", URL_SAFE_NO_PAD.encode(payload))
    }

    #[test]
    fn header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "cf-access-authenticated-user-email",
            HeaderValue::from_static("ops@example.com"),
        );
        let cookie = format!("CF_Authorization={}", token(r#"{"email":"other@example.com"}"#));
        headers.insert(COOKIE, HeaderValue::from_str(&cookie).unwrap());

        assert_eq!(
            extract_identity(&headers, &source()).as_deref(),
            Some("ops@example.com")
        );
    }

    #[test]
    fn cookie_payload_email_is_used() {
        let mut headers = HeaderMap::new();
        let cookie = format!(
            "theme=dark; CF_Authorization={}; other=1",
            token(r#"{"email":"field@example.com","sub":"x"}"#)
        );
        headers.insert(COOKIE, HeaderValue::from_str(&cookie).unwrap());

        assert_eq!(
            extract_identity(&headers, &source()).as_deref(),
            Some("field@example.com")
        );
    }

    #[test]
    fn signed_token_is_read_without_the_key() {
        let claims = serde_json::json!({"email": "a@example.com"});
        let t = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(b"gateway-only"),
        )
        .unwrap();
        assert_eq!(email_claim(&t).as_deref(), Some("a@example.com"));
    }

    #[test]
    fn payload_behind_bad_header_is_ignored() {
        let t = format!(
            "h.{}.s",
            URL_SAFE_NO_PAD.encode(r#"{"email":"a@example.com"}"#)
        );
        assert!(email_claim(&t).is_none());
    }

    #[test]
    fn garbage_falls_back_to_anonymous() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("CF_Authorization=not-a-token"),
        );
        assert_eq!(identity_or_anonymous(&headers, &source()), ANONYMOUS);

        headers.insert(
            COOKIE,
            HeaderValue::from_static("CF_Authorization=a.!!!.b"),
        );
        assert_eq!(identity_or_anonymous(&headers, &source()), ANONYMOUS);

        assert_eq!(identity_or_anonymous(&HeaderMap::new(), &source()), ANONYMOUS);
    }

    #[test]
    fn token_without_email_is_no_identity() {
        assert!(email_claim(&token(r#"{"sub":"svc"}"#)).is_none());
        assert!(email_claim(&token(r#"{"email":""}"#)).is_none());
    }
}
