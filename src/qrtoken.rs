use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::codec::{self, CodecError, KEY_SIZE};

/// Default consumer-side validity window for attendance tokens, 24 hours.
/// The codec itself cannot express expiry; without this window a captured QR
/// code would stay redeemable forever.
pub const DEFAULT_MAX_AGE_SECS: i64 = 86400;

/// Key for sealing attendance tokens, distinct from [`crate::session::SessionKey`].
#[derive(Clone)]
pub struct QrTokenKey(pub(crate) [u8; KEY_SIZE]);

impl QrTokenKey {
    pub fn from_hex(encoded: &str) -> Result<Self, CodecError> {
        codec::key_from_hex(encoded).map(Self)
    }
}

/// Claim set carried by a QR token. Issued once per lesson at creation time,
/// immutable afterwards, distributed out-of-band as a QR code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrToken {
    pub id: i64,
    #[serde(rename = "nameLesson")]
    pub name: String,
    pub date: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "teacherName")]
    pub teacher_name: String,
    pub created: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFailure {
    /// Covers malformed, tampered, wrong-key and stale tokens alike. A holder
    /// learns nothing about which one it was.
    InvalidOrExpired,
}

#[derive(Clone)]
pub struct QrTokenManager {
    key: QrTokenKey,
    max_age_secs: i64,
}

impl std::fmt::Debug for QrTokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "QrTokenManager {{ ... }}")
    }
}

impl QrTokenManager {
    pub fn new(key: QrTokenKey, max_age_secs: i64) -> Self {
        Self { key, max_age_secs }
    }

    /// Seals the lesson claims into an opaque QR token, stamping `created`
    /// with the current time.
    pub fn issue(
        &self,
        lesson_id: i64,
        name: &str,
        date: &str,
        kind: &str,
        teacher_name: &str,
    ) -> Result<String, CodecError> {
        let claims = QrToken {
            id: lesson_id,
            name: name.to_string(),
            date: date.to_string(),
            kind: kind.to_string(),
            teacher_name: teacher_name.to_string(),
            created: Utc::now().timestamp(),
        };
        codec::seal(&claims, &self.key.0)
    }

    /// Opens a scanned token and enforces the validity window.
    pub fn resolve(&self, token: &str) -> Result<QrToken, TokenFailure> {
        let claims: QrToken =
            codec::open(token, &self.key.0).map_err(|_| TokenFailure::InvalidOrExpired)?;

        let age = Utc::now().timestamp() - claims.created;
        if age > self.max_age_secs {
            return Err(TokenFailure::InvalidOrExpired);
        }
        Ok(claims)
    }
}
