#![allow(non_snake_case)]

use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;

use serde::Serialize;

use crate::codec::CodecError;
use crate::qrtoken::TokenFailure;
use crate::session::AuthFailure;

pub async fn handler404(path: Uri) -> (StatusCode, Json<Error>) {
    (
        StatusCode::NOT_FOUND,
        Json(Error::NotFound {
            message: format!("Invalid path: {}", path),
        }),
    )
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Maybe<T> {
    Nothing(Error),
    Fine(Success<T>),
}

pub fn Fine<V>(v: V) -> Maybe<V>
where
    V: Serialize,
{
    Maybe::Fine(Success::of(v))
}

pub fn Nothing<V>(err: Error) -> Maybe<V> {
    Maybe::Nothing(err)
}

#[derive(Debug, Clone, Serialize)]
pub struct Success<V> {
    success: bool,
    #[serde(flatten)]
    value: V,
}

impl<T> IntoResponse for Maybe<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        match self {
            Maybe::Nothing(err) => err.into_response(),
            Maybe::Fine(success) => Json::into_response(Json(success)),
        }
    }
}

impl<V: Serialize> Success<V> {
    pub fn of(value: V) -> Self {
        Self {
            success: true,
            value,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "error")]
pub enum Error {
    NotFound { message: String },
    InvalidPayload { message: String },
    Unauthorized { message: String },
    Forbidden { message: String },
    InternalError { kind: &'static str, message: String },
}

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::InvalidPayload { .. } => StatusCode::BAD_REQUEST,
            Error::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The uniform reply for any session that is missing, undecryptable or
    /// malformed. Clients never learn which one it was.
    pub fn invalid_session() -> Error {
        Error::Unauthorized {
            message: "Invalid session".to_string(),
        }
    }

    pub fn access_denied() -> Error {
        Error::Forbidden {
            message: "Access denied".to_string(),
        }
    }

    pub fn invalid_token() -> Error {
        Error::Unauthorized {
            message: "Invalid or expired token".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<AuthFailure> for Error {
    fn from(failure: AuthFailure) -> Self {
        match failure {
            AuthFailure::InvalidSession | AuthFailure::MalformedSession => Error::invalid_session(),
            AuthFailure::Forbidden => Error::access_denied(),
        }
    }
}

impl From<TokenFailure> for Error {
    fn from(_: TokenFailure) -> Self {
        Error::invalid_token()
    }
}

impl From<CodecError> for Error {
    fn from(err: CodecError) -> Self {
        log::error!("Token codec failure: {}", err);
        Self::InternalError {
            kind: "CodecError",
            message: "Failed to create token".to_string(),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        // Internal detail goes to the log, never to the client.
        log::error!("Database failure: {:?}", err);
        Self::InternalError {
            kind: "DatabaseError",
            message: "Database error".to_string(),
        }
    }
}

impl From<axum::http::header::InvalidHeaderValue> for Error {
    fn from(err: axum::http::header::InvalidHeaderValue) -> Self {
        log::error!("Header build failure: {}", err);
        Self::InternalError {
            kind: "HeaderError",
            message: "Failed to build response headers".to_string(),
        }
    }
}

impl From<pbkdf2::password_hash::Error> for Error {
    fn from(err: pbkdf2::password_hash::Error) -> Self {
        log::error!("Password hash failure: {}", err);
        Self::InternalError {
            kind: "HashError",
            message: "Credential verification failed".to_string(),
        }
    }
}
