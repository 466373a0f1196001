use actix_web::{http::StatusCode, HttpRequest, HttpResponse};
use askama::Template;

use crate::{
    auth::Session,
    guards::requested_path,
    i18n::{Labels, Language},
    state::AppState,
};

pub fn render<T: Template>(template: T) -> HttpResponse {
    render_status(StatusCode::OK, template)
}

pub fn render_status<T: Template>(status: StatusCode, template: T) -> HttpResponse {
    match template.render() {
        Ok(body) => HttpResponse::build(status)
            .content_type("text/html; charset=utf-8")
            .body(body),
        Err(err) => {
            log::error!("Template render error: {err}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

/// Page frame shared by every template: navigation, language and flash notice.
pub struct Chrome {
    pub shop_name: String,
    pub lang: &'static str,
    pub labels: &'static Labels,
    pub signed_in: bool,
    pub is_admin: bool,
    pub user_email: String,
    pub return_to: String,
    pub active: &'static str,
    pub notice: String,
}

impl Chrome {
    /// Navigation state for a public page, read from the shared session provider.
    pub async fn load(state: &AppState, req: &HttpRequest, active: &'static str) -> Self {
        let snapshot = state.session_state(req).await;
        let mut chrome = Self::base(state, req, active);
        if let Some(session) = snapshot.session() {
            chrome.signed_in = true;
            chrome.is_admin = session.user.is_admin();
            chrome.user_email = session.user.email.clone();
        }
        chrome
    }

    pub fn admin(state: &AppState, req: &HttpRequest, session: &Session, active: &'static str) -> Self {
        let mut chrome = Self::base(state, req, active);
        chrome.signed_in = true;
        chrome.is_admin = session.user.is_admin();
        chrome.user_email = session.user.email.clone();
        chrome
    }

    fn base(state: &AppState, req: &HttpRequest, active: &'static str) -> Self {
        let language = Language::from_request(req);
        Self {
            shop_name: state.config.shop_name.clone(),
            lang: language.code(),
            labels: language.labels(),
            signed_in: false,
            is_admin: false,
            user_email: String::new(),
            return_to: urlencoding::encode(&requested_path(req)).into_owned(),
            active,
            notice: String::new(),
        }
    }

    pub fn with_notice(mut self, code: Option<&str>) -> Self {
        self.notice = code.and_then(notice_text).unwrap_or_default().to_string();
        self
    }

    pub fn has_notice(&self) -> bool {
        !self.notice.is_empty()
    }
}

/// Flash messages passed through the `notice` query parameter after a redirect.
pub fn notice_text(code: &str) -> Option<&'static str> {
    let text = match code {
        "created" => "Created successfully.",
        "saved" => "Changes saved.",
        "deleted" => "Deleted.",
        "status" => "Status updated.",
        "image" => "Image updated.",
        "image_removed" => "Image removed.",
        "image_rejected" => "That image couldn't be used. Upload a JPG, PNG, GIF or WebP file up to 5 MB.",
        "sent" => "Thanks! Your message has been sent.",
        "signed_out" => "You have been signed out.",
        "welcome" => "Welcome! Your account is ready.",
        "not_found" => "That record no longer exists.",
        "failed" => "Something went wrong. Please try again.",
        _ => return None,
    };
    Some(text)
}
