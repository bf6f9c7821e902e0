use std::{env, str::FromStr};

use anyhow::{Context, bail};
use chrono::FixedOffset;
use tracing::Level;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_register_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    // Storage
    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub auto_migrate: bool,

    /// Canonical gym calendar; `None` means the server's local zone.
    pub gym_utc_offset: Option<FixedOffset>,
    pub log_level: Level,
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn parsed<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{key}={raw:?} is invalid: {e}")),
        Err(_) => Ok(default),
    }
}

/// Parses `+02:00`, `-0530`, `Z` or `UTC`.
pub fn parse_utc_offset(raw: &str) -> anyhow::Result<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).context("zero offset");
    }

    let (sign, rest) = match raw.as_bytes().first() {
        Some(b'+') => (1, &raw[1..]),
        Some(b'-') => (-1, &raw[1..]),
        _ => bail!("offset {raw:?} must start with + or -"),
    };

    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        // `get` is None when byte 2 is inside a multi-byte character.
        None if rest.len() == 4 => match (rest.get(..2), rest.get(2..)) {
            (Some(h), Some(m)) => (h, m),
            _ => bail!("offset {raw:?} is not ASCII"),
        },
        None => (rest, "0"),
    };

    let hours: i32 = hours.parse().with_context(|| format!("bad hours in {raw:?}"))?;
    let minutes: i32 = minutes
        .parse()
        .with_context(|| format!("bad minutes in {raw:?}"))?;
    if hours > 14 || minutes >= 60 {
        bail!("offset {raw:?} is out of range");
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .with_context(|| format!("offset {raw:?} is out of range"))
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let gym_utc_offset = match env::var("GYM_UTC_OFFSET") {
            Ok(raw) if !raw.trim().is_empty() => Some(parse_utc_offset(&raw)?),
            _ => None,
        };

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            access_token_ttl: parsed("ACCESS_TOKEN_TTL", 900)?, // 15 min
            refresh_token_ttl: parsed("REFRESH_TOKEN_TTL", 604_800)?, // 7 days

            rate_login_per_min: parsed("RATE_LOGIN_PER_MIN", 60)?,
            rate_register_per_min: parsed("RATE_REGISTER_PER_MIN", 30)?,
            rate_refresh_per_min: parsed("RATE_REFRESH_PER_MIN", 30)?,
            rate_protected_per_min: parsed("RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),

            db_max_connections: parsed("DB_MAX_CONNECTIONS", 10)?,
            db_acquire_timeout_secs: parsed("DB_ACQUIRE_TIMEOUT_SECS", 5)?,
            auto_migrate: parsed("AUTO_MIGRATE", true)?,

            gym_utc_offset,
            log_level: parsed("LOG_LEVEL", Level::DEBUG)?,
        })
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            database_url: String::new(),
            jwt_secret: "test-secret".into(),
            server_addr: "127.0.0.1:0".into(),
            access_token_ttl: 900,
            refresh_token_ttl: 3600,
            rate_login_per_min: 60,
            rate_register_per_min: 30,
            rate_refresh_per_min: 30,
            rate_protected_per_min: 1000,
            api_prefix: "/api".into(),
            db_max_connections: 1,
            db_acquire_timeout_secs: 1,
            auto_migrate: false,
            gym_utc_offset: FixedOffset::east_opt(0),
            log_level: Level::INFO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_in_common_spellings() {
        assert_eq!(parse_utc_offset("+02:00").unwrap().local_minus_utc(), 7200);
        assert_eq!(parse_utc_offset("-0530").unwrap().local_minus_utc(), -19_800);
        assert_eq!(parse_utc_offset("+3").unwrap().local_minus_utc(), 10_800);
        assert_eq!(parse_utc_offset("Z").unwrap().local_minus_utc(), 0);
    }

    #[test]
    fn malformed_offsets_are_rejected() {
        for raw in ["02:00", "+25:00", "+02:75", "+ab", ""] {
            assert!(parse_utc_offset(raw).is_err(), "{raw:?} accepted");
        }
    }

    #[test]
    fn non_ascii_compact_offset_is_an_error() {
        // Four bytes, but byte 2 falls inside the accented character.
        for raw in ["+1é1", "-é12", "+12é"] {
            assert!(parse_utc_offset(raw).is_err(), "{raw:?} accepted");
        }
    }
}
