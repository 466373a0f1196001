use std::{fs, path::Path};

use sqlx::SqlitePool;
use thiserror::Error;

use crate::{
    auth::{AuthError, AuthProvider},
    config::Config,
    hours::OperatingHours,
    models::{ROLE_ADMIN, SETTING_OPERATING_HOURS, SETTING_SHOP_NAME},
};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("admin account: {0}")]
    Auth(#[from] AuthError),
    #[error("operating hours: {0}")]
    Hours(#[from] serde_json::Error),
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    if let Some(parent) = Path::new(path).parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// First-run data: an admin account and the settings the public pages read.
/// Existing rows are never overwritten.
pub async fn seed_defaults(pool: &SqlitePool, auth: &AuthProvider, config: &Config) -> Result<(), SeedError> {
    seed_admin(pool, auth, config).await?;
    seed_settings(pool, config).await?;
    Ok(())
}

async fn seed_admin(pool: &SqlitePool, auth: &AuthProvider, config: &Config) -> Result<(), SeedError> {
    let existing = sqlx::query_scalar::<_, String>("SELECT id FROM users WHERE role = ? LIMIT 1")
        .bind(ROLE_ADMIN)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    if config.uses_default_admin_password() {
        log::warn!("ADMIN_PASSWORD not set. Using the default admin password. Set ADMIN_PASSWORD in production.");
    }
    let admin = auth
        .create_user(&config.admin_email, &config.admin_password, ROLE_ADMIN)
        .await?;
    log::info!("Created admin account {}", admin.email);
    Ok(())
}

async fn seed_settings(pool: &SqlitePool, config: &Config) -> Result<(), SeedError> {
    let defaults = [
        (SETTING_SHOP_NAME, config.shop_name.clone()),
        (SETTING_OPERATING_HOURS, OperatingHours::default().to_setting_value()?),
    ];
    for (key, value) in defaults {
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(pool)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{gateway::Gateway, test_utils::setup_pool};

    #[tokio::test]
    async fn seeding_twice_keeps_one_admin_and_edited_settings() {
        let pool = setup_pool().await;
        let auth = AuthProvider::new(pool.clone(), chrono::Duration::hours(1));
        let config = Config::default();

        seed_defaults(&pool, &auth, &config).await.unwrap();
        let gateway = Gateway::new(pool.clone());
        gateway
            .upsert_settings(&[(SETTING_SHOP_NAME.to_string(), "Renamed".to_string())])
            .await
            .unwrap();
        seed_defaults(&pool, &auth, &config).await.unwrap();

        let admins = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE role = 'admin'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(admins, 1);
        let session = auth.sign_in(&config.admin_email, &config.admin_password).await.unwrap();
        assert!(session.user.is_admin());

        let name = gateway.get_setting(SETTING_SHOP_NAME).await.unwrap();
        assert_eq!(name.as_deref(), Some("Renamed"));
        let hours = gateway.get_setting(SETTING_OPERATING_HOURS).await.unwrap().unwrap();
        assert_eq!(OperatingHours::parse(&hours).unwrap(), OperatingHours::default());
    }

    #[test]
    fn memory_urls_need_no_directory() {
        assert!(ensure_sqlite_dir("sqlite::memory:").is_ok());
        assert!(ensure_sqlite_dir("postgres://elsewhere").is_ok());
    }
}
