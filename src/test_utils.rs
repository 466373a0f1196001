use std::sync::Arc;

use chrono::NaiveDateTime;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use uuid::Uuid;

use crate::{
    auth::{new_id, AuthProvider},
    config::Config,
    gateway::Gateway,
    models::{now_rfc3339, parse_timestamp, NewProduct, NewService, ROLE_CUSTOMER},
    session::SessionProvider,
    state::AppState,
    storage::ImageStore,
};

/// Fresh in-memory database with the schema applied. A single connection keeps every
/// query on the same in-memory instance.
pub async fn setup_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

pub async fn setup_gateway() -> Gateway {
    Gateway::new(setup_pool().await)
}

pub async fn setup_state() -> AppState {
    let pool = setup_pool().await;
    let auth = AuthProvider::new(pool.clone(), chrono::Duration::hours(1));
    let sessions = SessionProvider::start(&auth).await;
    let store = temp_store();
    let config = Config {
        upload_dir: store.root().to_path_buf(),
        ..Config::default()
    };
    AppState {
        gateway: Gateway::new(pool),
        auth,
        sessions,
        storage: store,
        config: Arc::new(config),
    }
}

pub fn temp_store() -> ImageStore {
    ImageStore::new(std::env::temp_dir().join(format!("barbershop-test-{}", Uuid::new_v4())))
}

/// Inserts an auth user row directly and returns its id.
pub async fn create_user(gateway: &Gateway, email: &str) -> String {
    let id = new_id();
    sqlx::query(
        "INSERT INTO users (id, email, password_hash, role, created_at) VALUES (?, ?, 'x', ?, ?)",
    )
    .bind(&id)
    .bind(email)
    .bind(ROLE_CUSTOMER)
    .bind(now_rfc3339())
    .execute(gateway.pool())
    .await
    .unwrap();
    id
}

pub fn sample_service(name: &str, minutes: i64) -> NewService {
    NewService {
        name: name.to_string(),
        description: None,
        duration_minutes: minutes,
        price: 25.0,
        active: true,
        category: Some("Hair".to_string()),
    }
}

pub fn sample_product(name: &str) -> NewProduct {
    NewProduct {
        name: name.to_string(),
        description: None,
        brand: Some("House".to_string()),
        category: Some("Styling".to_string()),
        purchase_price: 5.0,
        original_price: 10.0,
        discount_percentage: 0.0,
        quantity: 10,
        reorder_level: 3,
        image_url: None,
    }
}

pub fn at(value: &str) -> NaiveDateTime {
    parse_timestamp(value).unwrap()
}
