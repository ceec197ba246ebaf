use axum::extract::TypedHeader;
use axum::headers::Cookie;
use axum::http::header::{HeaderMap, HeaderValue, SET_COOKIE};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use pbkdf2::password_hash::{PasswordHash, PasswordVerifier};
use pbkdf2::Pbkdf2;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::err::{Error, Fine};
use crate::models::User;
use crate::session::{
    self, expired_session_cookie, session_cookie, Role, Session, SessionManager,
};
use crate::{breaks, proceeds, Payload};

/// Pulls the session token out of the request cookies and validates it. A
/// missing cookie and a failed validation are indistinguishable to the client.
pub fn require_session(
    cookies: &Option<TypedHeader<Cookie>>,
    sessions: &SessionManager,
) -> Result<Session, Error> {
    let cookies = cookies.as_ref().ok_or_else(Error::invalid_session)?;
    let token = cookies
        .get(session::SESSION_COOKIE)
        .ok_or_else(Error::invalid_session)?;
    sessions.validate(token).map_err(Error::from)
}

pub fn require_role(session: &Session, role: Role) -> Result<(), Error> {
    if session.role != role {
        return Err(Error::access_denied());
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    message: String,
    fullname: String,
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    groupid: Option<i64>,
}

pub async fn login(
    Extension(pg): Extension<PgPool>,
    Extension(sessions): Extension<SessionManager>,
    Json(auth): Json<AuthRequest>,
) -> Result<Response, Error> {
    if auth.login.is_empty() || auth.password.is_empty() {
        return Err(Error::InvalidPayload {
            message: "Login and password are required".to_string(),
        });
    }

    let user = sqlx::query_as::<_, User>(
        "SELECT id, login, pass_hash, full_name, role, group_id FROM users WHERE login = $1 LIMIT 1",
    )
    .bind(&auth.login)
    .fetch_optional(&pg)
    .await
    .map_err(Error::from)?;

    // One rejection for unknown login and wrong password alike.
    let rejected = Error::Unauthorized {
        message: "Invalid login or password".to_string(),
    };
    let user = match user {
        Some(user) => user,
        None => return Err(rejected),
    };

    let hash = PasswordHash::new(&user.pass_hash).map_err(Error::from)?;
    if Pbkdf2
        .verify_password(auth.password.as_bytes(), &hash)
        .is_err()
    {
        return Err(rejected);
    }

    let role = Role::parse(&user.role).ok_or(Error::InternalError {
        kind: "DataError",
        message: "Unknown role in user record".to_string(),
    })?;
    if role == Role::Student && user.group_id.is_none() {
        return Err(Error::InternalError {
            kind: "DataError",
            message: "Student record has no group".to_string(),
        });
    }

    let identity = Session {
        user_id: user.id,
        login: user.login.clone(),
        role,
        full_name: user.full_name.clone(),
        group_id: user.group_id,
    };
    let token = sessions.issue(&identity).map_err(Error::from)?;

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, HeaderValue::from_str(&session_cookie(&token))?);

    log::info!("Session issued for user {} [{}]", user.login, role.as_str());
    Ok((
        headers,
        Fine(AuthResponse {
            message: "Authentication successful".to_string(),
            fullname: user.full_name,
            role: role.as_str(),
            groupid: user.group_id,
        }),
    )
        .into_response())
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggedOut {
    message: String,
}

/// There is no server-side session record to destroy; logout just overwrites
/// the cookie with an already-expired one.
pub async fn logout() -> Result<Response, Error> {
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, HeaderValue::from_str(&expired_session_cookie())?);

    Ok((
        headers,
        Fine(LoggedOut {
            message: "Session cleared".to_string(),
        }),
    )
        .into_response())
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentInfo {
    message: String,
    fullname: String,
    groupid: i64,
}

pub async fn student_info(
    cookies: Option<TypedHeader<Cookie>>,
    Extension(sessions): Extension<SessionManager>,
) -> Payload<StudentInfo> {
    let session = match require_session(&cookies, &sessions) {
        Ok(session) => session,
        Err(err) => return breaks(err),
    };
    if let Err(err) = require_role(&session, Role::Student) {
        return breaks(err);
    }

    proceeds(StudentInfo {
        message: "Profile loaded successfully".to_string(),
        fullname: session.full_name,
        // validate() guarantees a group for students
        groupid: session.group_id.unwrap_or_default(),
    })
}
