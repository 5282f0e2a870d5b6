use std::str::FromStr;

use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgSslMode};

fn default_max_connections() -> u32 {
    1
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

/// Configuration for the client store
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Connection string, either a `postgres://` URL or libpq `key=value` pairs
    pub database_url: String,
    /// Upper bound on pooled connections. One reproduces a single dedicated connection.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Variables from a `.env` file are loaded first if one exists, then
    /// `DATABASE_URL`, `MAX_CONNECTIONS` and `ACQUIRE_TIMEOUT_SECS` are read.
    pub fn load() -> Result<Self> {
        dotenv().ok();

        Self::from_vars(std::env::vars())
    }

    /// Deserialize configuration from `(NAME, value)` pairs named like the environment variables
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::from_iter::<_, Config>(vars)?;

        Ok(config)
    }

    /// Build a configuration around an explicit connection string with default pool settings
    pub fn from_database_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }

    /// Get a direct reference to the database URL
    pub fn database_url(&self) -> &str {
        &self.database_url
    }
}

/// Load configuration, including any `.env` file
pub fn init() -> Result<Config> {
    let config = Config::load()?;

    Ok(config)
}

/// Parse a connection string into connect options.
///
/// Accepts `postgres://` / `postgresql://` URLs as well as the libpq keyword
/// form, e.g. `host=127.0.0.1 port=5432 dbname=postgres user=postgres password=secret`.
/// Values in the keyword form may be single-quoted; `\'` and `\\` escape inside quotes.
pub fn connect_options(conn_str: &str) -> Result<PgConnectOptions, sqlx::Error> {
    let trimmed = conn_str.trim();
    if trimmed.starts_with("postgres://") || trimmed.starts_with("postgresql://") {
        return PgConnectOptions::from_str(trimmed);
    }

    let mut options = PgConnectOptions::new();
    for (key, value) in parse_keywords(trimmed)? {
        options = match key.as_str() {
            "host" | "hostaddr" => options.host(&value),
            "port" => {
                let port = value
                    .parse::<u16>()
                    .map_err(|_| config_error(format!("invalid port: {value:?}")))?;
                options.port(port)
            }
            "dbname" => options.database(&value),
            "user" => options.username(&value),
            "password" => options.password(&value),
            "sslmode" => options.ssl_mode(PgSslMode::from_str(&value)?),
            "application_name" => options.application_name(&value),
            other => return Err(config_error(format!("unsupported connection keyword: {other:?}"))),
        };
    }

    Ok(options)
}

fn config_error(message: String) -> sqlx::Error {
    sqlx::Error::Configuration(message.into())
}

fn parse_keywords(input: &str) -> Result<Vec<(String, String)>, sqlx::Error> {
    let mut pairs = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && !c.is_whitespace()) {
            key.push(c);
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.next() != Some('=') {
            return Err(config_error(format!("missing \"=\" after {key:?}")));
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut value = String::new();
        if chars.next_if_eq(&'\'').is_some() {
            loop {
                match chars.next() {
                    Some('\\') => match chars.next() {
                        Some(escaped) => value.push(escaped),
                        None => return Err(config_error("unterminated quoted value".into())),
                    },
                    Some('\'') => break,
                    Some(c) => value.push(c),
                    None => return Err(config_error("unterminated quoted value".into())),
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                value.push(c);
            }
        }

        pairs.push((key, value));
    }

    Ok(pairs)
}
