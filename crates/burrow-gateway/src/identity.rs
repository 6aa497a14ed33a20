//! Cookie based user identity.
//!
//! Every client is identified by a `user_id` cookie of the form
//! `<id>.<signature>`, where the signature is an HMAC-SHA256 of the id under
//! the server secret. Requests without a valid cookie get a freshly minted
//! id, which is also set on the response so the client keeps it. A cookie
//! with a bad signature is treated as absent.

use std::convert::Infallible;
use std::fmt;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use burrow_storage::ANONYMOUS_USER;
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};
use uuid::Uuid;

pub const USER_COOKIE: &str = "user_id";

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies user cookies with a server secret.
#[derive(Clone)]
pub struct CookieSigner {
    mac: HmacSha256,
}

impl fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieSigner").finish_non_exhaustive()
    }
}

impl CookieSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(secret.as_ref())?,
        })
    }

    /// A signer keyed with a random secret. Cookies it issues do not survive
    /// a restart.
    pub fn ephemeral() -> Result<Self, InvalidLength> {
        let secret = [*Uuid::new_v4().as_bytes(), *Uuid::new_v4().as_bytes()].concat();
        Self::new(secret)
    }

    /// Returns the cookie value carrying `user_id`.
    pub fn sign(&self, user_id: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(user_id.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{user_id}.{signature}")
    }

    /// Returns the user id of a cookie value signed with this secret.
    pub fn verify(&self, value: &str) -> Option<String> {
        let (user_id, signature) = value.rsplit_once('.')?;
        if user_id.is_empty() {
            return None;
        }
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;

        let mut mac = self.mac.clone();
        mac.update(user_id.as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(user_id.to_owned())
    }
}

/// The id of the user behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Middleware that makes sure every request carries a verified user id.
pub async fn ensure_user_cookie(
    State(signer): State<CookieSigner>,
    mut request: Request,
    next: Next,
) -> Response {
    let verified = cookie_value(request.headers(), USER_COOKIE).and_then(|value| {
        let user_id = signer.verify(value);
        if user_id.is_none() {
            warn!("ignoring user cookie with a bad signature");
        }
        user_id
    });

    if let Some(user_id) = verified {
        request.extensions_mut().insert(UserId(user_id));
        return next.run(request).await;
    }

    let user_id = Uuid::new_v4().to_string();
    debug!(user_id = %user_id, "issuing user cookie");
    let cookie = signer.sign(&user_id);
    request.extensions_mut().insert(UserId(user_id));

    let mut response = next.run(request).await;
    match HeaderValue::from_str(&format!("{USER_COOKIE}={cookie}; Path=/; HttpOnly")) {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Err(err) => warn!(error = %err, "could not encode user cookie"),
    }
    response
}

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .extensions
            .get::<UserId>()
            .cloned()
            .unwrap_or_else(|| UserId(ANONYMOUS_USER.to_owned()));
        Ok(user)
    }
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(cookies: &[&'static str]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for cookie in cookies {
            headers.append(COOKIE, HeaderValue::from_static(cookie));
        }
        headers
    }

    fn signer() -> CookieSigner {
        CookieSigner::new(b"test-secret").unwrap()
    }

    #[test]
    fn signed_cookie_verifies() {
        let signer = signer();
        let value = signer.sign("u1");

        assert!(value.starts_with("u1."));
        assert_eq!(signer.verify(&value), Some("u1".to_string()));
    }

    #[test]
    fn tampered_cookie_is_rejected() {
        let signer = signer();
        let value = signer.sign("u1");
        let (_, signature) = value.rsplit_once('.').unwrap();

        assert_eq!(signer.verify(&format!("u2.{signature}")), None);
        assert_eq!(signer.verify("u1"), None);
        assert_eq!(signer.verify("u1.not-base64!"), None);
        assert_eq!(signer.verify(&format!(".{signature}")), None);
    }

    #[test]
    fn other_secret_is_rejected() {
        let value = signer().sign("u1");
        let other = CookieSigner::new(b"another-secret").unwrap();

        assert_eq!(other.verify(&value), None);
    }

    #[test]
    fn finds_cookie_among_others() {
        let headers = headers(&["theme=dark; user_id=u1; lang=en"]);
        assert_eq!(cookie_value(&headers, USER_COOKIE), Some("u1"));
    }

    #[test]
    fn searches_every_cookie_header() {
        let headers = headers(&["theme=dark", "user_id=u2"]);
        assert_eq!(cookie_value(&headers, USER_COOKIE), Some("u2"));
    }

    #[test]
    fn ignores_empty_and_missing_values() {
        assert_eq!(cookie_value(&headers(&["user_id="]), USER_COOKIE), None);
        assert_eq!(cookie_value(&headers(&["other=1"]), USER_COOKIE), None);
        assert_eq!(cookie_value(&HeaderMap::new(), USER_COOKIE), None);
    }
}
