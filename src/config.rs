use std::net::SocketAddr;

use anyhow::{anyhow, Context};

use crate::qrtoken::{self, QrTokenKey};
use crate::session::SessionKey;

/// Process configuration, read once in `main` and passed down explicitly.
/// The two AEAD keys are independent; provisioning them from one value is not
/// supported on purpose.
pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub session_key: SessionKey,
    pub qr_token_key: QrTokenKey,
    pub qr_token_max_age_secs: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr = std::env::var("BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .context("BIND_ADDR is not a valid socket address")?;

        let database_url = std::env::var("DATABASE_URL").context("Supply DATABASE_URL")?;

        let session_key = std::env::var("SESSION_KEY").context("Supply SESSION_KEY")?;
        let session_key = SessionKey::from_hex(&session_key)
            .map_err(|_| anyhow!("SESSION_KEY must be 64 hex characters (32 bytes)"))?;

        let qr_token_key = std::env::var("QR_TOKEN_KEY").context("Supply QR_TOKEN_KEY")?;
        let qr_token_key = QrTokenKey::from_hex(&qr_token_key)
            .map_err(|_| anyhow!("QR_TOKEN_KEY must be 64 hex characters (32 bytes)"))?;

        let qr_token_max_age_secs = match std::env::var("QR_TOKEN_MAX_AGE_SECS") {
            Ok(raw) => raw
                .parse()
                .context("QR_TOKEN_MAX_AGE_SECS is not a number")?,
            Err(_) => qrtoken::DEFAULT_MAX_AGE_SECS,
        };

        Ok(Self {
            bind_addr,
            database_url,
            session_key,
            qr_token_key,
            qr_token_max_age_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The only test touching process environment; keep it that way.
    #[test]
    fn reads_full_environment() {
        std::env::set_var("BIND_ADDR", "127.0.0.1:9090");
        std::env::set_var("DATABASE_URL", "postgres://localhost/attendance");
        std::env::set_var("SESSION_KEY", "11".repeat(32));
        std::env::set_var("QR_TOKEN_KEY", "22".repeat(32));
        std::env::set_var("QR_TOKEN_MAX_AGE_SECS", "3600");

        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_addr.port(), 9090);
        assert_eq!(config.qr_token_max_age_secs, 3600);

        std::env::set_var("SESSION_KEY", "too-short");
        assert!(Config::from_env().is_err());
    }
}
