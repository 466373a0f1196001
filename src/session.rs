//! Process-wide view of who is signed in.
//!
//! The provider is the single source of authentication state for guards, navigation
//! and the booking wizard. Its auth-change listener is the only writer; readers get
//! owned [`SessionState`] snapshots.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use chrono::{DateTime, Utc};

use crate::auth::{AuthChange, AuthError, AuthEvent, AuthProvider, Session, Subscription};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Loading,
    Anonymous,
    Authenticated(Session),
}

impl SessionState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

#[derive(Default)]
struct SessionTable {
    loaded: bool,
    sessions: HashMap<String, Session>,
}

impl SessionTable {
    fn apply(&mut self, change: &AuthChange) {
        match (change.event, &change.session) {
            (AuthEvent::SignedIn | AuthEvent::TokenRefreshed, Some(session)) => {
                self.sessions.insert(change.token.clone(), session.clone());
            }
            _ => {
                self.sessions.remove(&change.token);
            }
        }
        self.prune_expired(Utc::now());
    }

    fn prune_expired(&mut self, now: DateTime<Utc>) {
        self.sessions.retain(|_, session| !session.is_expired(now));
    }
}

pub struct SessionProvider {
    table: Arc<RwLock<SessionTable>>,
    subscription: Mutex<Option<Subscription>>,
}

impl SessionProvider {
    /// A provider that has not fetched anything yet; every read is `Loading`.
    pub fn new() -> Self {
        Self {
            table: Arc::new(RwLock::new(SessionTable::default())),
            subscription: Mutex::new(None),
        }
    }

    /// Subscribes to auth changes and performs the one initial session fetch.
    pub async fn start(auth: &AuthProvider) -> Arc<Self> {
        let provider = Arc::new(Self::new());
        provider.attach(auth);
        let initial = auth.active_sessions().await;
        provider.finish_loading(initial);
        provider
    }

    fn attach(&self, auth: &AuthProvider) {
        let table = Arc::clone(&self.table);
        let subscription = auth.on_auth_state_change(move |change| {
            let mut guard = table.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.apply(change);
        });
        *self.lock_subscription() = Some(subscription);
    }

    fn finish_loading(&self, initial: Result<Vec<Session>, AuthError>) {
        let mut table = self.write_table();
        match initial {
            Ok(sessions) => {
                log::info!("Session provider ready with {} active session(s)", sessions.len());
                for session in sessions {
                    // Keep anything a listener already wrote during the fetch.
                    table.sessions.entry(session.token.clone()).or_insert(session);
                }
            }
            Err(err) => {
                log::warn!("Initial session fetch failed, treating everyone as signed out: {err}");
            }
        }
        table.prune_expired(Utc::now());
        table.loaded = true;
    }

    pub fn state(&self, token: Option<&str>) -> SessionState {
        let table = self.read_table();
        if !table.loaded {
            return SessionState::Loading;
        }
        let now = Utc::now();
        let state = token
            .and_then(|token| table.sessions.get(token))
            .filter(|session| !session.is_expired(now))
            .cloned()
            .map(SessionState::Authenticated)
            .unwrap_or(SessionState::Anonymous);
        state
    }

    pub async fn sign_out(&self, auth: &AuthProvider, token: &str) -> Result<(), AuthError> {
        auth.sign_out(token).await
    }

    /// Releases the auth subscription. Later auth changes are no longer observed.
    pub fn shutdown(&self) {
        if self.lock_subscription().take().is_some() {
            log::info!("Session provider detached from auth changes");
        }
    }

    fn read_table(&self) -> RwLockReadGuard<'_, SessionTable> {
        self.table.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, SessionTable> {
        self.table.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_subscription(&self) -> std::sync::MutexGuard<'_, Option<Subscription>> {
        self.subscription
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SessionProvider {
    fn default() -> Self {
        Self::new()
    }
}
