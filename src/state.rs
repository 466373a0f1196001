use std::sync::Arc;

use actix_web::HttpRequest;
use chrono::Utc;

use crate::{
    auth::{session_token, AuthProvider},
    config::Config,
    gateway::Gateway,
    session::{SessionProvider, SessionState},
    storage::ImageStore,
};

#[derive(Clone)]
pub struct AppState {
    pub gateway: Gateway,
    pub auth: AuthProvider,
    pub sessions: Arc<SessionProvider>,
    pub storage: ImageStore,
    pub config: Arc<Config>,
}

impl AppState {
    /// Snapshot of the caller's session, refreshing it once half its lifetime is gone.
    pub async fn session_state(&self, req: &HttpRequest) -> SessionState {
        let token = session_token(req);
        let state = self.sessions.state(token.as_deref());
        let Some(session) = state.session() else {
            return state;
        };
        if !session.needs_refresh(Utc::now(), self.auth.ttl()) {
            return state;
        }
        if let Err(err) = self.auth.refresh_session(&session.token).await {
            log::warn!("Session refresh failed: {err}");
            return state;
        }
        self.sessions.state(token.as_deref())
    }
}
