use crate::app_config::{AppConfig, ClientConfig, Environment};
use crate::geo::Coordinates;
use crate::ConfigError;

/// Load server configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load server configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Load feed client configuration from environment variables (after `.env`).
///
/// Every client setting has a default, so this only fails on malformed values.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` if a value cannot be parsed.
pub fn load_client_config() -> Result<ClientConfig, ConfigError> {
    dotenvy::dotenv().ok();
    build_client_config(|key| std::env::var(key))
}

/// Typed lookups over an env-var source, shared by both config builders.
struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    fn require(&self, var: &str) -> Result<String, ConfigError> {
        (self.lookup)(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    }

    fn or_default(&self, var: &str, default: &str) -> String {
        (self.lookup)(var).unwrap_or_else(|_| default.to_string())
    }

    fn parse<T>(&self, var: &str, default: &str) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.or_default(var, default);
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Build server configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let env_reader = EnvReader { lookup };

    let database_url = env_reader.require("DATABASE_URL")?;
    let env = parse_environment(&env_reader.or_default("AGROBRIDGE_ENV", "development"))?;

    let bind_addr: SocketAddr = env_reader.parse("AGROBRIDGE_BIND_ADDR", "0.0.0.0:8080")?;
    let log_level = env_reader.or_default("AGROBRIDGE_LOG_LEVEL", "info");
    let allowed_origins = parse_origins(
        &env_reader.or_default("AGROBRIDGE_ALLOWED_ORIGINS", "http://localhost:5173"),
    );
    let catalog_path = PathBuf::from(
        env_reader.or_default("AGROBRIDGE_CATALOG_PATH", "./config/catalog.yaml"),
    );

    let db_max_connections: u32 = env_reader.parse("AGROBRIDGE_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections: u32 = env_reader.parse("AGROBRIDGE_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs: u64 =
        env_reader.parse("AGROBRIDGE_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    if db_min_connections > db_max_connections {
        return Err(ConfigError::InvalidEnvVar {
            var: "AGROBRIDGE_DB_MIN_CONNECTIONS".to_string(),
            reason: format!(
                "min connections ({db_min_connections}) exceeds max connections ({db_max_connections})"
            ),
        });
    }

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        allowed_origins,
        catalog_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
    })
}

fn build_client_config<F>(lookup: F) -> Result<ClientConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let env_reader = EnvReader { lookup };

    let api_url = env_reader.or_default("AGROBRIDGE_API_URL", "http://localhost:8080");
    let log_level = env_reader.or_default("AGROBRIDGE_LOG_LEVEL", "info");
    let request_timeout_secs: u64 = env_reader.parse("AGROBRIDGE_CLIENT_TIMEOUT_SECS", "30")?;
    let user_agent = env_reader.or_default(
        "AGROBRIDGE_CLIENT_USER_AGENT",
        "agrobridge/0.1 (marketplace-feed)",
    );
    let page_size: u32 = env_reader.parse("AGROBRIDGE_PAGE_SIZE", "50")?;
    if page_size == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "AGROBRIDGE_PAGE_SIZE".to_string(),
            reason: "page size must be at least 1".to_string(),
        });
    }

    let fallback_lng: f64 = env_reader.parse("AGROBRIDGE_FALLBACK_LNG", "78.96")?;
    let fallback_lat: f64 = env_reader.parse("AGROBRIDGE_FALLBACK_LAT", "20.59")?;
    let fallback_location = Coordinates::try_new(fallback_lng, fallback_lat).map_err(|e| {
        ConfigError::InvalidEnvVar {
            var: "AGROBRIDGE_FALLBACK_LNG/AGROBRIDGE_FALLBACK_LAT".to_string(),
            reason: e.to_string(),
        }
    })?;

    Ok(ClientConfig {
        api_url,
        log_level,
        request_timeout_secs,
        user_agent,
        page_size,
        fallback_location,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "AGROBRIDGE_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

/// Split a comma-separated origin list, dropping blanks.
fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
