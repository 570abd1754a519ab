use axum::extract::multipart::MultipartError;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;

use serde::Serialize;

use crate::store::StoreError;

pub const INTERNAL_MESSAGE: &str = "Erro interno do servidor";

pub async fn handler404(path: Uri) -> Error {
    Error::NotFound {
        message: format!("Invalid path: {}", path),
    }
}

/// A successful reply: status code, optional `Set-Cookie` and a body of
/// `{ "success": true, ...value }`.
#[derive(Debug, Clone)]
pub struct Reply<V> {
    status: StatusCode,
    cookie: Option<String>,
    body: Success<V>,
}

impl<V: Serialize> Reply<V> {
    pub fn ok(value: V) -> Self {
        Self {
            status: StatusCode::OK,
            cookie: None,
            body: Success::of(value),
        }
    }

    pub fn created(value: V) -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::ok(value)
        }
    }

    pub fn with_cookie(mut self, cookie: String) -> Self {
        self.cookie = Some(cookie);
        self
    }
}

impl<V> IntoResponse for Reply<V>
where
    V: Serialize,
{
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        if let Some(cookie) = self.cookie {
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    response.headers_mut().insert(SET_COOKIE, value);
                }
                Err(err) => log::error!("Refusing to send malformed cookie: {}", err),
            }
        }
        response
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Success<V> {
    success: bool,
    #[serde(flatten)]
    value: V,
}

impl<V: Serialize> Success<V> {
    pub fn of(value: V) -> Self {
        Self {
            success: true,
            value,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Error {
    Validation { message: String, details: Vec<String> },
    InvalidCredentials { message: String },
    InvalidToken { message: String },
    Forbidden { message: String },
    Conflict { message: String },
    NotFound { message: String },
    PayloadTooLarge { message: String },
    Configuration { message: String },
    InternalError { kind: &'static str, message: String },
}

#[derive(Debug, Serialize)]
struct Failure<'a> {
    success: bool,
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a [String]>,
}

impl Error {
    pub fn validation<S: Into<String>>(details: Vec<S>) -> Error {
        Error::Validation {
            message: "Dados inválidos".to_string(),
            details: details.into_iter().map(Into::into).collect(),
        }
    }

    pub fn invalid_credentials() -> Error {
        Error::InvalidCredentials {
            message: "Email ou senha incorretos".to_string(),
        }
    }

    pub fn invalid_token<S: Into<String>>(msg: S) -> Error {
        Error::InvalidToken {
            message: msg.into(),
        }
    }

    pub fn forbidden() -> Error {
        Error::Forbidden {
            message: "Acesso negado".to_string(),
        }
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Error {
        Error::NotFound {
            message: msg.into(),
        }
    }

    pub fn payload_too_large() -> Error {
        Error::PayloadTooLarge {
            message: "Requisição excede o tamanho máximo permitido".to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::InvalidCredentials { .. } | Error::InvalidToken { .. } => {
                StatusCode::UNAUTHORIZED
            }
            Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Configuration { .. } | Error::InternalError { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to hand to a client.
    pub fn public_message(&self) -> &str {
        match self {
            Error::Validation { message, .. }
            | Error::InvalidCredentials { message }
            | Error::InvalidToken { message }
            | Error::Forbidden { message }
            | Error::Conflict { message }
            | Error::NotFound { message }
            | Error::PayloadTooLarge { message } => message,
            Error::Configuration { .. } | Error::InternalError { .. } => INTERNAL_MESSAGE,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Configuration { message } => log::error!("Configuration error: {}", message),
            Error::InternalError { kind, message } => log::error!("{}: {}", kind, message),
            _ => {}
        }
        let details = match &self {
            Error::Validation { details, .. } if !details.is_empty() => Some(details.as_slice()),
            _ => None,
        };
        let body = Failure {
            success: false,
            error: self.public_message(),
            details,
        };
        (self.status(), Json(body)).into_response()
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Configuration { message } => write!(f, "configuration: {}", message),
            Error::InternalError { kind, message } => write!(f, "{}: {}", kind, message),
            other => f.write_str(other.public_message()),
        }
    }
}

impl std::error::Error for Error {}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { column } => Error::Conflict {
                message: match column.as_str() {
                    "email" => "Usuário com este email já existe".to_string(),
                    "ra" => "RA já está sendo usado por outro usuário".to_string(),
                    other => format!("Valor duplicado para `{}`", other),
                },
            },
            other => Self::InternalError {
                kind: "DatabaseError",
                message: other.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(io: std::io::Error) -> Self {
        Self::InternalError {
            kind: "IOError",
            message: io.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InternalError {
            kind: "SerializationError",
            message: err.to_string(),
        }
    }
}

impl From<argon2::password_hash::Error> for Error {
    fn from(err: argon2::password_hash::Error) -> Self {
        Self::InternalError {
            kind: "PasswordHashError",
            message: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::InternalError {
            kind: "TaskError",
            message: err.to_string(),
        }
    }
}

impl From<MultipartError> for Error {
    fn from(err: MultipartError) -> Self {
        Error::validation(vec![format!("multipart: {}", err)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_hide_their_cause() {
        let err = Error::InternalError {
            kind: "DatabaseError",
            message: "connection refused on 10.0.0.3".to_string(),
        };
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), INTERNAL_MESSAGE);
    }

    #[test]
    fn unique_violations_become_conflicts() {
        let err = Error::from(StoreError::UniqueViolation {
            column: "ra".to_string(),
        });
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(
            err.public_message(),
            "RA já está sendo usado por outro usuário"
        );
    }

    #[test]
    fn credential_failures_share_one_message() {
        let err = Error::invalid_credentials();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.public_message(), "Email ou senha incorretos");
    }
}
