use std::{env, path::PathBuf};

const DEFAULT_DATABASE_URL: &str = "sqlite://./data/barbershop.db";
const DEFAULT_ADMIN_EMAIL: &str = "admin@barbershop.local";
const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub session_ttl_hours: i64,
    pub admin_email: String,
    pub admin_password: String,
    pub shop_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            port: 8080,
            upload_dir: PathBuf::from("./uploads"),
            session_ttl_hours: 24,
            admin_email: DEFAULT_ADMIN_EMAIL.to_string(),
            admin_password: DEFAULT_ADMIN_PASSWORD.to_string(),
            shop_name: "The Barber Shop".to_string(),
        }
    }
}

impl Config {
    /// Reads the process environment; call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            port: env::var("PORT")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(defaults.port),
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            session_ttl_hours: env::var("SESSION_TTL_HOURS")
                .ok()
                .and_then(|value| value.parse().ok())
                .filter(|hours: &i64| *hours > 0)
                .unwrap_or(defaults.session_ttl_hours),
            admin_email: env::var("ADMIN_EMAIL").unwrap_or(defaults.admin_email),
            admin_password: env::var("ADMIN_PASSWORD").unwrap_or(defaults.admin_password),
            shop_name: env::var("SHOP_NAME").unwrap_or(defaults.shop_name),
        }
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours)
    }

    pub fn uses_default_admin_password(&self) -> bool {
        self.admin_password == DEFAULT_ADMIN_PASSWORD
    }
}
