use serde::{Deserialize, Serialize};
use std::env;

use crate::limiter::RateRule;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub rate_limits: RateLimitConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    /// Replaces the database named in `url` when set
    pub name: Option<String>,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
    pub use_memory_store: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub token_secret: String,
    pub token_lifetime_secs: u64,
    pub password_hash_cost: u32,
    pub enable_cors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub customer_create: RateRule,
    pub customer_login: RateRule,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub list_ttl_secs: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("SECURITY_TOKEN_SECRET must be set in {0:?}")]
    MissingTokenSecret(Environment),

    #[error("DATABASE_URL must be set unless the memory store is enabled")]
    MissingDatabaseUrl,
}

const DEV_TOKEN_SECRET: &str = "mechanic-shop-development-secret-change-me";

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Ok(v) = env::var("BIND_HOST") {
            self.server.bind_host = v;
        }
        if let Ok(v) = env::var("PORT") {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_NAME") {
            self.database.name = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connect_timeout_secs = v.parse().unwrap_or(self.database.connect_timeout_secs);
        }
        if let Ok(v) = env::var("DATABASE_MEMORY") {
            self.database.use_memory_store = v.parse().unwrap_or(self.database.use_memory_store);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_TOKEN_SECRET") {
            self.security.token_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_TOKEN_LIFETIME_SECS") {
            self.security.token_lifetime_secs = v.parse().unwrap_or(self.security.token_lifetime_secs);
        }
        if let Ok(v) = env::var("SECURITY_PASSWORD_HASH_COST") {
            self.security.password_hash_cost = v.parse().unwrap_or(self.security.password_hash_cost);
        }
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }

        // Rate limit overrides
        if let Ok(v) = env::var("RATE_LIMIT_ENABLED") {
            self.rate_limits.enabled = v.parse().unwrap_or(self.rate_limits.enabled);
        }
        if let Ok(v) = env::var("RATE_LIMIT_CUSTOMER_CREATE") {
            self.rate_limits.customer_create = parse_rule(&v).unwrap_or(self.rate_limits.customer_create);
        }
        if let Ok(v) = env::var("RATE_LIMIT_CUSTOMER_LOGIN") {
            self.rate_limits.customer_login = parse_rule(&v).unwrap_or(self.rate_limits.customer_login);
        }

        // Cache overrides
        if let Ok(v) = env::var("CACHE_ENABLED") {
            self.cache.enabled = v.parse().unwrap_or(self.cache.enabled);
        }
        if let Ok(v) = env::var("CACHE_LIST_TTL_SECS") {
            self.cache.list_ttl_secs = v.parse().unwrap_or(self.cache.list_ttl_secs);
        }

        self
    }

    /// Startup checks that can't be expressed as defaults
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.environment != Environment::Development
            && (self.security.token_secret.is_empty() || self.security.token_secret == DEV_TOKEN_SECRET)
        {
            return Err(ConfigError::MissingTokenSecret(self.environment));
        }
        if !self.database.use_memory_store && self.database.url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }
        Ok(())
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                bind_host: "127.0.0.1".to_string(),
                port: 5000,
            },
            database: DatabaseConfig {
                url: None,
                name: None,
                max_connections: 5,
                connect_timeout_secs: 30,
                use_memory_store: false,
            },
            security: SecurityConfig {
                token_secret: DEV_TOKEN_SECRET.to_string(),
                token_lifetime_secs: 3600,
                password_hash_cost: 4,
                enable_cors: true,
            },
            rate_limits: RateLimitConfig {
                enabled: true,
                customer_create: RateRule::new(5, 3600),
                customer_login: RateRule::new(10, 60),
            },
            cache: CacheConfig {
                enabled: true,
                list_ttl_secs: 60,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                bind_host: "0.0.0.0".to_string(),
                port: 5000,
            },
            database: DatabaseConfig {
                url: None,
                name: None,
                max_connections: 10,
                connect_timeout_secs: 10,
                use_memory_store: false,
            },
            security: SecurityConfig {
                token_secret: String::new(),
                token_lifetime_secs: 3600,
                password_hash_cost: bcrypt::DEFAULT_COST,
                enable_cors: true,
            },
            rate_limits: RateLimitConfig {
                enabled: true,
                customer_create: RateRule::new(5, 3600),
                customer_login: RateRule::new(10, 60),
            },
            cache: CacheConfig {
                enabled: true,
                list_ttl_secs: 60,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                bind_host: "0.0.0.0".to_string(),
                port: 5000,
            },
            database: DatabaseConfig {
                url: None,
                name: None,
                max_connections: 20,
                connect_timeout_secs: 5,
                use_memory_store: false,
            },
            security: SecurityConfig {
                token_secret: String::new(),
                token_lifetime_secs: 3600,
                password_hash_cost: bcrypt::DEFAULT_COST,
                enable_cors: false,
            },
            rate_limits: RateLimitConfig {
                enabled: true,
                customer_create: RateRule::new(5, 3600),
                customer_login: RateRule::new(5, 60),
            },
            cache: CacheConfig {
                enabled: true,
                list_ttl_secs: 60,
            },
        }
    }
}

/// `"<requests>/<window_secs>"`, e.g. `5/3600`
fn parse_rule(raw: &str) -> Option<RateRule> {
    let (requests, window) = raw.split_once('/')?;
    Some(RateRule::new(
        requests.trim().parse().ok()?,
        window.trim().parse().ok()?,
    ))
}
