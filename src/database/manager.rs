use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;

/// Errors from the entity store
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Map constraint violations to `Conflict` / `NotFound`, everything else passes through
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if let Some(mapped) = db.code().and_then(|code| Self::from_sqlstate(&code, db.message())) {
                return mapped;
            }
        }
        DatabaseError::Sqlx(err)
    }

    fn from_sqlstate(code: &str, message: &str) -> Option<Self> {
        match code {
            // unique_violation
            "23505" => Some(DatabaseError::Conflict(message.to_string())),
            // foreign_key_violation: the referenced row is gone
            "23503" => Some(DatabaseError::NotFound(message.to_string())),
            _ => None,
        }
    }
}

/// Builds the PostgreSQL pool the store runs on
pub struct DatabaseManager;

impl DatabaseManager {
    pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
        let connection_string = Self::build_connection_string(config)?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&connection_string)
            .await?;

        info!(
            "Created database pool ({} max connections) for: {}",
            config.max_connections,
            config.name.as_deref().unwrap_or("<url default>")
        );
        Ok(pool)
    }

    /// Use `DATABASE_URL`, swapping in `database.name` as the path when set
    fn build_connection_string(config: &DatabaseConfig) -> Result<String, DatabaseError> {
        let base = config
            .url
            .as_deref()
            .ok_or(DatabaseError::ConfigMissing("DATABASE_URL"))?;

        let mut url = url::Url::parse(base).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        if !matches!(url.scheme(), "postgres" | "postgresql") {
            return Err(DatabaseError::InvalidDatabaseUrl);
        }
        if let Some(name) = &config.name {
            url.set_path(&format!("/{}", name));
        }
        Ok(url.into())
    }
}
