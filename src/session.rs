use serde::{Deserialize, Serialize};

use crate::codec::{self, CodecError, KEY_SIZE};

/// Cookie name carrying the sealed session token.
pub const SESSION_COOKIE: &str = "session";
/// Client-side session lifetime, 24 hours.
pub const SESSION_TTL_SECS: i64 = 86400;

/// Key for sealing session cookies. A distinct type from [`crate::qrtoken::QrTokenKey`]
/// so the two token classes can never share key material.
#[derive(Clone)]
pub struct SessionKey(pub(crate) [u8; KEY_SIZE]);

impl SessionKey {
    pub fn from_hex(encoded: &str) -> Result<Self, CodecError> {
        codec::key_from_hex(encoded).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Teacher => "Teacher",
            Role::Student => "Student",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "Teacher" => Some(Role::Teacher),
            "Student" => Some(Role::Student),
            _ => None,
        }
    }
}

/// A validated session identity. `group_id` is present iff the role is Student.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user_id: i64,
    pub login: String,
    pub role: Role,
    pub full_name: String,
    pub group_id: Option<i64>,
}

/// Wire shape of the session claim set. The role travels as a plain string and
/// is checked against the known enum exactly once, in [`SessionManager::validate`].
#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    user_id: i64,
    login: String,
    role: String,
    full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    group_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// The token failed decryption or decoding. Indistinguishable from a
    /// missing session as far as clients are concerned.
    InvalidSession,
    /// The token decrypted but its claims are not a well-formed session.
    MalformedSession,
    /// A valid session lacking the required role or ownership.
    Forbidden,
}

#[derive(Clone)]
pub struct SessionManager {
    key: SessionKey,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionManager {{ ... }}")
    }
}

impl SessionManager {
    pub fn new(key: SessionKey) -> Self {
        Self { key }
    }

    /// Seals a verified identity into an opaque session token. The session has
    /// no server-side record; its lifetime is bounded only by the cookie TTL.
    pub fn issue(&self, identity: &Session) -> Result<String, CodecError> {
        let claims = SessionClaims {
            user_id: identity.user_id,
            login: identity.login.clone(),
            role: identity.role.as_str().to_string(),
            full_name: identity.full_name.clone(),
            group_id: identity.group_id,
        };
        codec::seal(&claims, &self.key.0)
    }

    pub fn validate(&self, token: &str) -> Result<Session, AuthFailure> {
        let claims: SessionClaims = codec::open(token, &self.key.0).map_err(|err| match err {
            CodecError::Encoding(_) => AuthFailure::MalformedSession,
            _ => AuthFailure::InvalidSession,
        })?;

        let role = Role::parse(&claims.role).ok_or(AuthFailure::MalformedSession)?;
        if role == Role::Student && claims.group_id.is_none() {
            return Err(AuthFailure::MalformedSession);
        }

        Ok(Session {
            user_id: claims.user_id,
            login: claims.login,
            role,
            full_name: claims.full_name,
            group_id: claims.group_id,
        })
    }
}

/// `Set-Cookie` value installing a fresh session.
pub fn session_cookie(token: &str) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; Max-Age={}",
        SESSION_COOKIE, token, SESSION_TTL_SECS
    )
}

/// `Set-Cookie` value replacing the session with an already-expired one.
pub fn expired_session_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; Max-Age=0", SESSION_COOKIE)
}
