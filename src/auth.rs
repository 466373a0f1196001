use std::sync::{Arc, Mutex, Weak};

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::HttpRequest;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use rand_core::OsRng;
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{now_rfc3339, ROLE_ADMIN, ROLE_CUSTOMER};

pub const SESSION_COOKIE: &str = "bs_session";
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid email address")]
    InvalidEmail,
    #[error("password is too short")]
    WeakPassword,
    #[error("email already registered")]
    EmailTaken,
    #[error("invalid login credentials")]
    InvalidCredentials,
    #[error("password hashing failed")]
    Hash,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AuthError {
    /// Text for login and registration forms.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidEmail => "Please enter a valid email address.",
            Self::WeakPassword => "Password must be at least 6 characters.",
            Self::EmailTaken => "An account with this email already exists.",
            Self::InvalidCredentials => "Invalid email or password.",
            Self::Hash | Self::Database(_) => "Something went wrong. Please try again.",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user: AuthUser,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Less than half of the lifetime remains.
    pub fn needs_refresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.expires_at - now < ttl / 2
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

#[derive(Clone, Debug)]
pub struct AuthChange {
    pub event: AuthEvent,
    pub token: String,
    pub session: Option<Session>,
}

type Listener = Arc<dyn Fn(&AuthChange) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

/// Keeps an auth-state listener registered; dropping it unregisters.
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            let mut guard = listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.entries.retain(|(id, _)| *id != self.id);
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    password_hash: String,
    role: String,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    token: String,
    expires_at: String,
    user_id: String,
    email: String,
    role: String,
}

impl SessionRow {
    fn into_session(self) -> Option<Session> {
        let expires_at = DateTime::parse_from_rfc3339(&self.expires_at)
            .ok()?
            .with_timezone(&Utc);
        Some(Session {
            token: self.token,
            user: AuthUser {
                id: self.user_id,
                email: self.email,
                role: self.role,
            },
            expires_at,
        })
    }
}

const SESSION_SELECT: &str = r#"SELECT s.token, s.expires_at, u.id AS user_id, u.email, u.role
FROM auth_sessions s
JOIN users u ON u.id = s.user_id"#;

/// Email/password accounts and their sessions.
#[derive(Clone)]
pub struct AuthProvider {
    db: SqlitePool,
    ttl: Duration,
    listeners: Arc<Mutex<Listeners>>,
}

impl AuthProvider {
    pub fn new(db: SqlitePool, ttl: Duration) -> Self {
        Self {
            db,
            ttl,
            listeners: Arc::new(Mutex::new(Listeners::default())),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn on_auth_state_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&AuthChange) + Send + Sync + 'static,
    {
        let mut guard = self.lock_listeners();
        guard.next_id += 1;
        let id = guard.next_id;
        guard.entries.push((id, Arc::new(listener)));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }
        let user = self.create_user(&email, password, ROLE_CUSTOMER).await?;
        log::info!("Registered account {}", user.email);
        self.open_session(user).await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = normalize_email(email).map_err(|_| AuthError::InvalidCredentials)?;
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, role FROM users WHERE email = ? LIMIT 1",
        )
        .bind(&email)
        .fetch_optional(&self.db)
        .await?;

        let Some(row) = row else {
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password(password, &row.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        self.open_session(AuthUser {
            id: row.id,
            email: row.email,
            role: row.role,
        })
        .await
    }

    pub async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        sqlx::query("DELETE FROM auth_sessions WHERE token = ?")
            .bind(token)
            .execute(&self.db)
            .await?;
        self.emit(AuthChange {
            event: AuthEvent::SignedOut,
            token: token.to_string(),
            session: None,
        });
        Ok(())
    }

    /// The session for `token` when it exists and has not expired.
    pub async fn get_session(&self, token: &str) -> Result<Option<Session>, AuthError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!("{SESSION_SELECT} WHERE s.token = ?"))
            .bind(token)
            .fetch_optional(&self.db)
            .await?;
        let now = Utc::now();
        Ok(row
            .and_then(SessionRow::into_session)
            .filter(|session| !session.is_expired(now)))
    }

    pub async fn active_sessions(&self) -> Result<Vec<Session>, AuthError> {
        let rows = sqlx::query_as::<_, SessionRow>(SESSION_SELECT)
            .fetch_all(&self.db)
            .await?;
        let now = Utc::now();
        Ok(rows
            .into_iter()
            .filter_map(SessionRow::into_session)
            .filter(|session| !session.is_expired(now))
            .collect())
    }

    /// Extends a live session by a full lifetime.
    pub async fn refresh_session(&self, token: &str) -> Result<Option<Session>, AuthError> {
        let Some(mut session) = self.get_session(token).await? else {
            return Ok(None);
        };
        let now = Utc::now();
        self.prune_expired(now).await?;
        session.expires_at = self.expiry_from(now);
        sqlx::query("UPDATE auth_sessions SET expires_at = ? WHERE token = ?")
            .bind(format_expiry(session.expires_at))
            .bind(token)
            .execute(&self.db)
            .await?;
        self.emit(AuthChange {
            event: AuthEvent::TokenRefreshed,
            token: token.to_string(),
            session: Some(session.clone()),
        });
        Ok(Some(session))
    }

    pub async fn user_exists(&self, email: &str) -> Result<bool, AuthError> {
        let found = sqlx::query_scalar::<_, String>("SELECT id FROM users WHERE email = ? LIMIT 1")
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.db)
            .await?;
        Ok(found.is_some())
    }

    pub async fn create_user(
        &self,
        email: &str,
        password: &str,
        role: &str,
    ) -> Result<AuthUser, AuthError> {
        let email = normalize_email(email)?;
        let password_hash = hash_password(password)?;
        let id = new_id();
        let result = sqlx::query(
            r#"INSERT INTO users (id, email, password_hash, role, created_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(&email)
        .bind(password_hash)
        .bind(role)
        .bind(now_rfc3339())
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => Ok(AuthUser {
                id,
                email,
                role: role.to_string(),
            }),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(AuthError::EmailTaken)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn open_session(&self, user: AuthUser) -> Result<Session, AuthError> {
        let now = Utc::now();
        self.prune_expired(now).await?;
        let session = Session {
            token: new_token(),
            user,
            expires_at: self.expiry_from(now),
        };
        sqlx::query(
            r#"INSERT INTO auth_sessions (token, user_id, expires_at, created_at)
               VALUES (?, ?, ?, ?)"#,
        )
        .bind(&session.token)
        .bind(&session.user.id)
        .bind(format_expiry(session.expires_at))
        .bind(now_rfc3339())
        .execute(&self.db)
        .await?;

        self.emit(AuthChange {
            event: AuthEvent::SignedIn,
            token: session.token.clone(),
            session: Some(session.clone()),
        });
        Ok(session)
    }

    /// Expiry for a session opened or refreshed at `now`, at the whole-second
    /// precision it is stored with.
    fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        (now + self.ttl).trunc_subsecs(0)
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthError> {
        let removed = sqlx::query("DELETE FROM auth_sessions WHERE expires_at <= ?")
            .bind(format_expiry(now))
            .execute(&self.db)
            .await?
            .rows_affected();
        if removed > 0 {
            log::debug!("Removed {removed} expired session(s)");
        }
        Ok(removed)
    }

    fn emit(&self, change: AuthChange) {
        let listeners: Vec<Listener> = self
            .lock_listeners()
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&change);
        }
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Listeners> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn format_expiry(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    if valid && !email.contains(char::is_whitespace) {
        Ok(email)
    } else {
        Err(AuthError::InvalidEmail)
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| AuthError::Hash)?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, password_hash: &str) -> bool {
    let parsed_hash = PasswordHash::new(password_hash);
    match parsed_hash {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn new_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

pub fn session_cookie(req: &HttpRequest, token: &str, ttl: Duration) -> Cookie<'static> {
    let mut builder = Cookie::build(SESSION_COOKIE, token.to_string())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::seconds(ttl.num_seconds()));
    if req.connection_info().scheme() == "https" {
        builder = builder.secure(true);
    }
    builder.finish()
}

pub fn clear_session_cookie(req: &HttpRequest) -> Cookie<'static> {
    let mut builder = Cookie::build(SESSION_COOKIE, "")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::seconds(0));
    if req.connection_info().scheme() == "https" {
        builder = builder.secure(true);
    }
    builder.finish()
}

pub fn session_token(req: &HttpRequest) -> Option<String> {
    req.cookie(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_pool;

    async fn provider() -> AuthProvider {
        AuthProvider::new(setup_pool().await, Duration::hours(24))
    }

    #[tokio::test]
    async fn sign_up_then_sign_in() {
        let auth = provider().await;
        let registered = auth.sign_up(" Pat@Example.com ", "secret1").await.unwrap();
        assert_eq!(registered.user.email, "pat@example.com");
        assert_eq!(registered.user.role, ROLE_CUSTOMER);

        let session = auth.sign_in("pat@example.com", "secret1").await.unwrap();
        assert_ne!(session.token, registered.token);
        assert_eq!(auth.get_session(&session.token).await.unwrap(), Some(session));
    }

    #[tokio::test]
    async fn bad_credentials_and_inputs_are_rejected() {
        let auth = provider().await;
        auth.sign_up("pat@example.com", "secret1").await.unwrap();

        assert!(matches!(
            auth.sign_in("pat@example.com", "wrong").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.sign_up("pat@example.com", "secret1").await,
            Err(AuthError::EmailTaken)
        ));
        assert!(matches!(auth.sign_up("nope", "secret1").await, Err(AuthError::InvalidEmail)));
        assert!(matches!(
            auth.sign_up("new@example.com", "123").await,
            Err(AuthError::WeakPassword)
        ));
    }

    #[tokio::test]
    async fn listeners_see_sign_in_and_out_until_dropped() {
        let auth = provider().await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = auth.on_auth_state_change(move |change| {
            sink.lock().unwrap().push(change.event);
        });

        let session = auth.sign_up("lee@example.com", "secret1").await.unwrap();
        auth.refresh_session(&session.token).await.unwrap();
        auth.sign_out(&session.token).await.unwrap();
        drop(subscription);
        auth.sign_in("lee@example.com", "secret1").await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![AuthEvent::SignedIn, AuthEvent::TokenRefreshed, AuthEvent::SignedOut]
        );
        assert_eq!(auth.get_session(&session.token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_sessions_are_not_returned() {
        let auth = AuthProvider::new(setup_pool().await, Duration::seconds(-1));
        let session = auth.sign_up("old@example.com", "secret1").await.unwrap();

        assert_eq!(auth.get_session(&session.token).await.unwrap(), None);
        assert!(auth.active_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn announced_sessions_match_what_is_read_back() {
        let auth = provider().await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _subscription = auth.on_auth_state_change(move |change| {
            sink.lock().unwrap().extend(change.session.clone());
        });

        let session = auth.sign_up("exact@example.com", "secret1").await.unwrap();
        let refreshed = auth.refresh_session(&session.token).await.unwrap().unwrap();

        let stored = auth.get_session(&session.token).await.unwrap();
        assert_eq!(stored.as_ref(), Some(&refreshed));
        assert_eq!(seen.lock().unwrap().last(), stored.as_ref());
        assert_eq!(session.expires_at.timestamp_subsec_nanos(), 0);
    }

    #[tokio::test]
    async fn expired_rows_are_deleted_when_a_session_opens() {
        let pool = setup_pool().await;
        let stale = AuthProvider::new(pool.clone(), Duration::seconds(-1));
        stale.sign_up("stale@example.com", "secret1").await.unwrap();

        let auth = AuthProvider::new(pool, Duration::hours(1));
        let fresh = auth.sign_up("fresh@example.com", "secret1").await.unwrap();

        let tokens = sqlx::query_scalar::<_, String>("SELECT token FROM auth_sessions")
            .fetch_all(&auth.db)
            .await
            .unwrap();
        assert_eq!(tokens, vec![fresh.token]);
    }

    #[test]
    fn refresh_is_due_in_second_half_of_lifetime() {
        let now = Utc::now();
        let session = Session {
            token: "t".to_string(),
            user: AuthUser {
                id: "u".to_string(),
                email: "u@example.com".to_string(),
                role: ROLE_CUSTOMER.to_string(),
            },
            expires_at: now + Duration::hours(10),
        };
        assert!(session.needs_refresh(now, Duration::hours(24)));
        assert!(!session.needs_refresh(now, Duration::hours(12)));
        assert!(!session.is_expired(now));
    }

    #[test]
    fn unrecognised_failures_get_generic_message() {
        assert_eq!(
            AuthError::Hash.user_message(),
            "Something went wrong. Please try again."
        );
    }
}
