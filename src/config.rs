use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::models::auth::LockoutPolicy;

/// Minimum password length accepted at registration.
pub const MIN_PASSWORD_LEN: usize = 8;

pub const BCRYPT_COST: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Which persistence backend the service runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    /// Process-local store, for local development only.
    Memory,
}

#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub name: String,
    pub secure: bool,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: "auth_token".to_string(),
            secure: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreKind,

    /// Postgres connection URL. Required for [`StoreKind::Postgres`].
    pub database_url: Option<String>,

    pub jwt_secret: String,

    pub bind_addr: String,

    pub max_connections: u32,

    pub acquire_timeout: Duration,

    pub cookie: CookieConfig,

    pub lockout: LockoutPolicy,

    /// Currency for wallets created implicitly on first access.
    pub default_currency: String,
}

impl AppConfig {
    /// Create a config with the given signing secret and defaults elsewhere.
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            store: StoreKind::Postgres,
            database_url: None,
            jwt_secret: jwt_secret.into(),
            bind_addr: "0.0.0.0:8000".to_string(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(10),
            cookie: CookieConfig::default(),
            lockout: LockoutPolicy::default(),
            default_currency: "USD".to_string(),
        }
    }

    /// Load configuration from process environment variables.
    ///
    /// The signing secret is mandatory: there is no generated fallback.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let jwt_secret = var("JWT_SECRET")
            .or_else(|| var("JWT_SECRET_KEY"))
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let mut config = Self::new(jwt_secret);

        config.store = match var("STORE").as_deref() {
            None | Some("postgres") => StoreKind::Postgres,
            Some("memory") => StoreKind::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "STORE",
                    value: other.to_string(),
                })
            }
        };

        config.database_url = var("DATABASE_URL");
        if config.store == StoreKind::Postgres && config.database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        if let Some(addr) = var("BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(n) = var("DB_MAX_CONNECTIONS") {
            config.max_connections = parse("DB_MAX_CONNECTIONS", &n)?;
        }
        if let Some(secs) = var("DB_ACQUIRE_TIMEOUT_SECS") {
            config.acquire_timeout = Duration::from_secs(parse("DB_ACQUIRE_TIMEOUT_SECS", &secs)?);
        }

        config.cookie.secure = match var("COOKIE_SECURE") {
            Some(v) => parse_bool("COOKIE_SECURE", &v)?,
            None => var("APP_ENV").is_some_and(|e| e.eq_ignore_ascii_case("production")),
        };

        if let Some(n) = var("LOCKOUT_MAX_ATTEMPTS") {
            config.lockout.max_failed_attempts = parse("LOCKOUT_MAX_ATTEMPTS", &n)?;
        }
        if let Some(secs) = var("LOCKOUT_WINDOW_SECS") {
            config.lockout.window = Some(Duration::from_secs(parse("LOCKOUT_WINDOW_SECS", &secs)?));
        }
        if let Some(v) = var("LOCKOUT_RESET_ON_SUCCESS") {
            config.lockout.reset_on_success = parse_bool("LOCKOUT_RESET_ON_SUCCESS", &v)?;
        }

        if let Some(currency) = var("WALLET_DEFAULT_CURRENCY") {
            config.default_currency = currency.to_ascii_uppercase();
        }

        Ok(config)
    }

    pub fn lockout(mut self, policy: LockoutPolicy) -> Self {
        self.lockout = policy;
        self
    }

    pub fn secure_cookie(mut self, secure: bool) -> Self {
        self.cookie.secure = secure;
        self
    }

    pub fn default_currency(mut self, currency: impl Into<String>) -> Self {
        self.default_currency = currency.into();
        self
    }
}

fn parse<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: value.to_string(),
    })
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        }),
    }
}
