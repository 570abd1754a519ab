//! Session tokens and the extractors that read them off a request.
//!
//! A session is one HS256 JWT. Browsers carry it in the httpOnly `session`
//! cookie set at login; other clients send it as `Authorization: Bearer`.
//! Tokens are stateless: logout only drops the cookie.

use axum::async_trait;
use axum::extract::{Extension, FromRequest, RequestParts};
use axum::headers::authorization::Bearer;
use axum::headers::{Authorization, Cookie, HeaderMapExt};
use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::credentials::{authorize, find_user_by_id, Capability};
use crate::err::Error;
use crate::models::UserRecord;
use crate::AppState;

pub const ISSUER: &str = "atestado-stock-app";
pub const AUDIENCE: &str = "atestado-stock-users";
pub const SESSION_COOKIE: &str = "session";
pub const TOKEN_LIFETIME_DAYS: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub uid: String,
    pub session_id: String,
    /// Issuance time in milliseconds.
    pub timestamp: i64,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

#[derive(Clone)]
pub struct TokenService {
    secret: Option<String>,
}

impl TokenService {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    fn secret(&self) -> Result<&[u8], Error> {
        self.secret
            .as_deref()
            .map(str::as_bytes)
            .ok_or_else(|| Error::Configuration {
                message: "JWT_SECRET is not set".to_string(),
            })
    }

    pub fn issue_token(&self, user_id: &str) -> Result<String, Error> {
        self.issue_token_at(user_id, Utc::now())
    }

    pub fn issue_token_at(&self, user_id: &str, now: DateTime<Utc>) -> Result<String, Error> {
        let secret = self.secret()?;
        let millis = now.timestamp_millis();
        let claims = Claims {
            uid: user_id.to_string(),
            session_id: format!("session_{}", millis),
            timestamp: millis,
            iat: now.timestamp(),
            exp: (now + Duration::days(TOKEN_LIFETIME_DAYS)).timestamp(),
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret),
        )
        .map_err(|err| Error::InternalError {
            kind: "TokenError",
            message: format!("Failed to sign session token: {}", err),
        })
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, Error> {
        let secret = self.secret()?;
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_audience(&[AUDIENCE]);
        validation.leeway = 0;

        decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => Error::invalid_token("Sessão expirada"),
                _ => {
                    log::debug!("Token verification failed: {}", err);
                    Error::invalid_token("Token inválido")
                }
            })
    }
}

pub fn session_cookie(token: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE,
        token,
        Duration::days(TOKEN_LIFETIME_DAYS).num_seconds()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn clear_session_cookie(secure: bool) -> String {
    let mut cookie = format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", SESSION_COOKIE);
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Bearer header first, then the session cookie.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(authorization) = headers.typed_get::<Authorization<Bearer>>() {
        return Some(authorization.token().to_string());
    }
    headers
        .typed_get::<Cookie>()
        .and_then(|cookie| cookie.get(SESSION_COOKIE).map(str::to_string))
        .filter(|token| !token.is_empty())
}

async fn app_state<B: Send>(req: &mut RequestParts<B>) -> Result<AppState, Error> {
    let Extension(state) = Extension::<AppState>::from_request(req)
        .await
        .map_err(|err| Error::InternalError {
            kind: "ExtensionError",
            message: format!("{:?}", err),
        })?;
    Ok(state)
}

/// Verified claims of the caller.
#[derive(Debug, Clone)]
pub struct Session(pub Claims);

#[async_trait]
impl<B: Send> FromRequest<B> for Session {
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let state = app_state(req).await?;
        let token = token_from_headers(req.headers())
            .ok_or_else(|| Error::invalid_token("Token de autorização necessário"))?;
        state.tokens.verify_token(&token).map(Session)
    }
}

/// The caller's user document, loaded after the token checks out.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub claims: Claims,
    pub user: UserRecord,
}

impl CurrentUser {
    pub fn require(&self, capability: Capability) -> Result<(), Error> {
        authorize(self.user.cargo, capability)
    }
}

#[async_trait]
impl<B: Send> FromRequest<B> for CurrentUser {
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let Session(claims) = Session::from_request(req).await?;
        let state = app_state(req).await?;
        let user = find_user_by_id(&state.store, &claims.uid)
            .await?
            .ok_or_else(|| Error::not_found("Usuário não encontrado"))?;
        Ok(CurrentUser { claims, user })
    }
}
