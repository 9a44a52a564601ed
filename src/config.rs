//! Runtime configuration parsed from environment variables.
//!
//! `from_env` reads the process environment (after loading `.env`);
//! `from_vars` takes any lookup so parsing can be tested without touching
//! global state.

use std::time::Duration;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_STORE_URL: &str = "memory://";
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_EVENTS_KEY: &str = "whiteboard_events";
pub const DEFAULT_UPDATES_CHANNEL: &str = "whiteboard_updates";
pub const DEFAULT_MAX_EVENTS: i64 = 500;
pub const DEFAULT_SHUTDOWN_DRAIN_SECS: u64 = 10;
pub const DEFAULT_CLIENT_QUEUE_CAPACITY: usize = 256;

/// Allowed cross-origin callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
    Any,
    List(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub cors: CorsOrigins,
    pub store_url: String,
    pub db_max_connections: u32,
    pub events_key: String,
    pub updates_channel: String,
    /// Retained events. `None` means unbounded.
    pub max_events: Option<usize>,
    pub shutdown_drain: Duration,
    pub client_queue_capacity: usize,
}

impl Config {
    /// Build config from the process environment, loading `.env` first.
    ///
    /// Optional:
    /// - `WS_HOST` (default `0.0.0.0`), `WS_PORT` or `PORT` (default 8080)
    /// - `CORS_ORIGIN`: comma-separated origins, `*` for any (default)
    /// - `STORE_URL` or `DATABASE_URL`: `postgres://…` or `memory://` (default)
    /// - `DB_MAX_CONNECTIONS` (default 5)
    /// - `WHITEBOARD_EVENTS_KEY`, `WHITEBOARD_UPDATES_CHANNEL`
    /// - `WHITEBOARD_MAX_EVENTS` (default 500, `<= 0` keeps everything)
    /// - `SHUTDOWN_DRAIN_SECS` (default 10)
    /// - `CLIENT_QUEUE_CAPACITY` (default 256)
    #[must_use]
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = var("WS_HOST").unwrap_or_else(|| DEFAULT_HOST.into());
        let port = var("WS_PORT")
            .or_else(|| var("PORT"))
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let cors = parse_cors(var("CORS_ORIGIN").as_deref());
        let store_url = var("STORE_URL")
            .or_else(|| var("DATABASE_URL"))
            .unwrap_or_else(|| DEFAULT_STORE_URL.into());
        let max_events = parse_max_events(parse_or(var("WHITEBOARD_MAX_EVENTS"), DEFAULT_MAX_EVENTS));

        Self {
            host,
            port,
            cors,
            store_url,
            db_max_connections: parse_or(var("DB_MAX_CONNECTIONS"), DEFAULT_DB_MAX_CONNECTIONS),
            events_key: var("WHITEBOARD_EVENTS_KEY").unwrap_or_else(|| DEFAULT_EVENTS_KEY.into()),
            updates_channel: var("WHITEBOARD_UPDATES_CHANNEL").unwrap_or_else(|| DEFAULT_UPDATES_CHANNEL.into()),
            max_events,
            shutdown_drain: Duration::from_secs(parse_or(var("SHUTDOWN_DRAIN_SECS"), DEFAULT_SHUTDOWN_DRAIN_SECS)),
            client_queue_capacity: parse_or(var("CLIENT_QUEUE_CAPACITY"), DEFAULT_CLIENT_QUEUE_CAPACITY).max(1),
        }
    }

    /// `host:port` for the listener.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_max_events(raw: i64) -> Option<usize> {
    if raw <= 0 {
        return None;
    }
    usize::try_from(raw).ok()
}

fn parse_cors(raw: Option<&str>) -> CorsOrigins {
    let Some(raw) = raw else {
        return CorsOrigins::Any;
    };
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_owned)
        .collect();
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        CorsOrigins::Any
    } else {
        CorsOrigins::List(origins)
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
