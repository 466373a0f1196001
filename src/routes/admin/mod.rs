//! Admin console. Everything under `/admin` except the login page sits behind
//! [`admin_guard`]; handlers receive the checked [`Session`] through request data.

mod bookings;
mod calendar;
mod customers;
mod dashboard;
mod messages;
mod products;
mod services;
mod settings;
mod staff;

use actix_web::{http::header, middleware::from_fn, web, HttpRequest, HttpResponse, Result};
use askama::Template;

use crate::{
    gateway::GatewayError,
    guards::{admin_guard, safe_redirect_target},
    listing::ListControls,
    routes::public::{signed_in_response, CredentialsForm, LoginTemplate, RedirectQuery},
    state::AppState,
    templates::{render, Chrome},
};

const ADMIN_HOME: &str = "/admin/dashboard";

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/admin/login")
            .route(web::get().to(login_form))
            .route(web::post().to(login)),
    )
    .service(
        web::scope("/admin")
            .wrap(from_fn(admin_guard))
            .service(web::resource("").route(web::get().to(index)))
            .service(web::resource("/").route(web::get().to(index)))
            .configure(dashboard::configure)
            .configure(calendar::configure)
            .configure(bookings::configure)
            .configure(customers::configure)
            .configure(services::configure)
            .configure(staff::configure)
            .configure(products::configure)
            .configure(messages::configure)
            .configure(settings::configure),
    );
}

async fn index() -> HttpResponse {
    HttpResponse::Found()
        .append_header((header::LOCATION, ADMIN_HOME))
        .finish()
}

fn admin_login_page(chrome: Chrome, redirect: String, email: String, error: String) -> HttpResponse {
    render(LoginTemplate {
        chrome,
        title: "Admin login".to_string(),
        action: "/admin/login",
        redirect_encoded: urlencoding::encode(&redirect).into_owned(),
        redirect,
        email,
        error,
        show_register: false,
    })
}

async fn login_form(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<RedirectQuery>,
) -> Result<HttpResponse> {
    let redirect = safe_redirect_target(query.redirect.as_deref(), ADMIN_HOME);
    let chrome = Chrome::load(&state, &req, "login").await;
    Ok(admin_login_page(chrome, redirect, String::new(), String::new()))
}

async fn login(
    state: web::Data<AppState>,
    req: HttpRequest,
    form: web::Form<CredentialsForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let redirect = safe_redirect_target(form.redirect.as_deref(), ADMIN_HOME);

    let error = match state.auth.sign_in(&form.email, &form.password).await {
        Ok(session) if session.user.is_admin() => {
            log::info!("Admin {} signed in", session.user.email);
            return Ok(signed_in_response(&state, &req, &session, &redirect));
        }
        Ok(session) => {
            log::warn!("{} tried to sign in to the admin area", session.user.email);
            if let Err(err) = state.sessions.sign_out(&state.auth, &session.token).await {
                log::warn!("Sign-out after refused admin login failed: {err}");
            }
            "This account does not have admin access.".to_string()
        }
        Err(err) => {
            log::warn!("Admin sign-in failed for {}: {err}", form.email.trim());
            err.user_message().to_string()
        }
    };

    let chrome = Chrome::load(&state, &req, "login").await;
    Ok(admin_login_page(chrome, redirect, form.email, error))
}

pub(super) struct Header {
    label: &'static str,
    href: String,
    indicator: &'static str,
}

impl Header {
    pub fn sortable(label: &'static str, column: &str, controls: &ListControls) -> Self {
        Self {
            label,
            href: controls.sort_href(column),
            indicator: controls.indicator(column),
        }
    }

    pub fn plain(label: &'static str) -> Self {
        Self {
            label,
            href: String::new(),
            indicator: "",
        }
    }
}

#[derive(Default)]
pub(super) struct Cell {
    text: String,
    href: String,
    badge: &'static str,
    image: String,
}

impl Cell {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn link(text: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            href: href.into(),
            ..Default::default()
        }
    }

    pub fn badge(text: impl Into<String>, class: &'static str) -> Self {
        Self {
            text: text.into(),
            badge: class,
            ..Default::default()
        }
    }

    pub fn with_image(mut self, url: Option<&str>) -> Self {
        self.image = url.unwrap_or_default().to_string();
        self
    }
}

pub(super) struct RowAction {
    label: String,
    href: String,
    post: bool,
    field: &'static str,
    value: String,
}

impl RowAction {
    pub fn link(label: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            href: href.into(),
            post: false,
            field: "",
            value: String::new(),
        }
    }

    pub fn post(label: impl Into<String>, href: impl Into<String>, field: &'static str, value: &str) -> Self {
        Self {
            label: label.into(),
            href: href.into(),
            post: true,
            field,
            value: value.to_string(),
        }
    }

    /// The usual pair for editable rows.
    pub fn edit_delete(base: &str, id: &str) -> Vec<Self> {
        vec![
            Self::link("Edit", format!("{base}/{id}/edit")),
            Self::link("Delete", format!("{base}/{id}/delete")),
        ]
    }
}

pub(super) struct TableRow {
    pub cells: Vec<Cell>,
    pub actions: Vec<RowAction>,
    pub detail: String,
}

pub(super) struct FilterLink {
    pub label: String,
    pub href: String,
    pub active: bool,
}

#[derive(Template)]
#[template(path = "admin_list.html")]
pub(super) struct AdminListTemplate {
    pub chrome: Chrome,
    pub title: &'static str,
    pub new_href: String,
    pub controls: ListControls,
    pub status_value: String,
    pub filters: Vec<FilterLink>,
    pub headers: Vec<Header>,
    pub rows: Vec<TableRow>,
    pub error: String,
}

pub(super) struct SelectOption {
    value: String,
    label: String,
    selected: bool,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>, selected: bool) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
            selected,
        }
    }
}

pub(super) struct FormField {
    name: &'static str,
    label: &'static str,
    kind: &'static str,
    value: String,
    checked: bool,
    required: bool,
    step: &'static str,
    help: &'static str,
    options: Vec<SelectOption>,
}

impl FormField {
    fn new(kind: &'static str, name: &'static str, label: &'static str, value: impl Into<String>) -> Self {
        Self {
            name,
            label,
            kind,
            value: value.into(),
            checked: false,
            required: false,
            step: "",
            help: "",
            options: Vec::new(),
        }
    }

    pub fn text(name: &'static str, label: &'static str, value: impl Into<String>) -> Self {
        Self::new("text", name, label, value)
    }

    pub fn email(name: &'static str, label: &'static str, value: impl Into<String>) -> Self {
        Self::new("email", name, label, value)
    }

    pub fn tel(name: &'static str, label: &'static str, value: impl Into<String>) -> Self {
        Self::new("tel", name, label, value)
    }

    pub fn textarea(name: &'static str, label: &'static str, value: impl Into<String>) -> Self {
        Self::new("textarea", name, label, value)
    }

    pub fn number(name: &'static str, label: &'static str, value: impl Into<String>, step: &'static str) -> Self {
        let mut field = Self::new("number", name, label, value);
        field.step = step;
        field
    }

    pub fn datetime(name: &'static str, label: &'static str, value: impl Into<String>) -> Self {
        Self::new("datetime-local", name, label, value)
    }

    pub fn checkbox(name: &'static str, label: &'static str, checked: bool) -> Self {
        let mut field = Self::new("checkbox", name, label, "");
        field.checked = checked;
        field
    }

    pub fn select(name: &'static str, label: &'static str, options: Vec<SelectOption>) -> Self {
        let mut field = Self::new("select", name, label, "");
        field.options = options;
        field
    }

    /// One checkbox per option, submitted as `<name>_<option value>`.
    pub fn checkboxes(name: &'static str, label: &'static str, options: Vec<SelectOption>) -> Self {
        let mut field = Self::new("checkboxes", name, label, "");
        field.options = options;
        field
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn help(mut self, help: &'static str) -> Self {
        self.help = help;
        self
    }
}

#[derive(Template)]
#[template(path = "admin_form.html")]
pub(super) struct AdminFormTemplate {
    pub chrome: Chrome,
    pub title: String,
    pub action: String,
    pub cancel_href: &'static str,
    pub fields: Vec<FormField>,
    pub errors: Vec<String>,
    pub image_panel: bool,
    pub image_url: String,
    pub image_action: String,
}

impl AdminFormTemplate {
    pub fn new(chrome: Chrome, title: impl Into<String>, action: impl Into<String>, cancel_href: &'static str) -> Self {
        Self {
            chrome,
            title: title.into(),
            action: action.into(),
            cancel_href,
            fields: Vec::new(),
            errors: Vec::new(),
            image_panel: false,
            image_url: String::new(),
            image_action: String::new(),
        }
    }
}

#[derive(Template)]
#[template(path = "admin_confirm.html")]
pub(super) struct AdminConfirmTemplate {
    pub chrome: Chrome,
    pub title: String,
    pub message: String,
    pub action: String,
    pub cancel_href: &'static str,
}

/// Inline text for a list or page whose data could not be fetched.
pub(super) fn fetch_error(what: &str, err: &GatewayError) -> String {
    log::error!("Failed to load {what}: {err}");
    format!("Couldn't load {what}. Refresh to try again.")
}

/// Maps a failed write to a form error, or `None` for a missing record.
pub(super) fn write_error(what: &str, err: &GatewayError) -> Option<String> {
    match err {
        GatewayError::NotFound(_) => None,
        err if err.is_unique_violation() => Some(format!("Another {what} already uses that value.")),
        err => {
            log::error!("Failed to save {what}: {err}");
            Some(format!("Couldn't save the {what}. Please try again."))
        }
    }
}

pub(super) fn parse_number<T: std::str::FromStr>(
    raw: &str,
    label: &str,
    errors: &mut Vec<String>,
) -> Option<T> {
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            errors.push(format!("{label} must be a number."));
            None
        }
    }
}

pub(super) fn is_checked(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|value| !value.is_empty())
}
