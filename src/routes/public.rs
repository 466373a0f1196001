use std::collections::HashMap;

use actix_web::{http::header, web, HttpRequest, HttpResponse, Result};
use askama::Template;
use serde::Deserialize;

use crate::{
    auth::{clear_session_cookie, session_cookie, session_token, Session},
    guards::safe_redirect_target,
    hours::{title_case, OperatingHours},
    i18n::Language,
    listing,
    models::{
        non_blank, NewMessage, Product, Service, SETTING_OPERATING_HOURS, SETTING_SHOP_ADDRESS,
        SETTING_SHOP_EMAIL, SETTING_SHOP_NAME, SETTING_SHOP_PHONE,
    },
    routes::{format_money, redirect_with_notice, see_other},
    state::AppState,
    templates::{render, Chrome},
};

const FEATURED_PRODUCTS: usize = 4;

pub(crate) struct ShopInfo {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
}

struct ServiceCard {
    name: String,
    description: String,
    duration: i64,
    price: String,
}

impl From<Service> for ServiceCard {
    fn from(service: Service) -> Self {
        Self {
            name: service.name,
            description: service.description.unwrap_or_default(),
            duration: service.duration_minutes,
            price: format_money(service.price),
        }
    }
}

struct ProductCard {
    name: String,
    brand: String,
    price: String,
    original: String,
    on_sale: bool,
    in_stock: bool,
    image_url: String,
}

impl From<Product> for ProductCard {
    fn from(product: Product) -> Self {
        Self {
            on_sale: product.on_sale(),
            in_stock: product.quantity > 0,
            price: format_money(product.sale_price),
            original: format_money(product.original_price),
            name: product.name,
            brand: product.brand.unwrap_or_default(),
            image_url: product.image_url.unwrap_or_default(),
        }
    }
}

struct HoursRow {
    day: String,
    open: bool,
    range: String,
}

#[derive(Template)]
#[template(path = "home.html")]
struct HomeTemplate {
    chrome: Chrome,
    shop: ShopInfo,
    services: Vec<ServiceCard>,
    hours: Vec<HoursRow>,
    products: Vec<ProductCard>,
    error: String,
}

#[derive(Template)]
#[template(path = "products.html")]
struct ProductsTemplate {
    chrome: Chrome,
    q: String,
    products: Vec<ProductCard>,
    error: String,
    empty_message: String,
}

#[derive(Default)]
struct ContactView {
    name: String,
    email: String,
    phone: String,
    subject: String,
    body: String,
}

#[derive(Template)]
#[template(path = "contact.html")]
struct ContactTemplate {
    chrome: Chrome,
    shop: ShopInfo,
    form: ContactView,
    errors: Vec<String>,
}

#[derive(Template)]
#[template(path = "login.html")]
pub(crate) struct LoginTemplate {
    pub chrome: Chrome,
    pub title: String,
    pub action: &'static str,
    pub redirect: String,
    pub redirect_encoded: String,
    pub email: String,
    pub error: String,
    pub show_register: bool,
}

#[derive(Template)]
#[template(path = "register.html")]
struct RegisterTemplate {
    chrome: Chrome,
    redirect: String,
    redirect_encoded: String,
    email: String,
    error: String,
}

#[derive(Deserialize)]
pub(crate) struct NoticeQuery {
    pub notice: Option<String>,
}

#[derive(Deserialize)]
struct SearchQuery {
    q: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct RedirectQuery {
    pub redirect: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct CredentialsForm {
    pub email: String,
    pub password: String,
    pub redirect: Option<String>,
}

#[derive(Deserialize)]
struct ContactForm {
    name: String,
    email: String,
    phone: Option<String>,
    subject: Option<String>,
    body: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(home)))
        .service(web::resource("/products").route(web::get().to(products)))
        .service(
            web::resource("/contact")
                .route(web::get().to(contact))
                .route(web::post().to(send_message)),
        )
        .service(
            web::resource("/login")
                .route(web::get().to(login_form))
                .route(web::post().to(login)),
        )
        .service(
            web::resource("/register")
                .route(web::get().to(register_form))
                .route(web::post().to(register)),
        )
        .service(web::resource("/logout").route(web::get().to(logout)))
        .service(web::resource("/lang/{code}").route(web::get().to(set_language)))
        .service(web::resource("/health").route(web::get().to(health)));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

pub(crate) async fn load_shop(state: &AppState) -> (ShopInfo, Option<String>) {
    let settings: HashMap<String, String> = match state.gateway.all_settings().await {
        Ok(rows) => rows.into_iter().map(|row| (row.key, row.value)).collect(),
        Err(err) => {
            log::error!("Failed to load settings: {err}");
            HashMap::new()
        }
    };
    let value = |key: &str| settings.get(key).cloned().unwrap_or_default();
    let name = non_blank(settings.get(SETTING_SHOP_NAME).cloned())
        .unwrap_or_else(|| state.config.shop_name.clone());
    (
        ShopInfo {
            name,
            address: value(SETTING_SHOP_ADDRESS),
            phone: value(SETTING_SHOP_PHONE),
            email: value(SETTING_SHOP_EMAIL),
        },
        settings.get(SETTING_OPERATING_HOURS).cloned(),
    )
}

fn hours_rows(hours: &OperatingHours) -> Vec<HoursRow> {
    hours
        .days()
        .iter()
        .map(|(key, day)| HoursRow {
            day: title_case(key),
            open: day.span().is_some(),
            range: format!("{} – {}", day.start, day.end),
        })
        .collect()
}

async fn home(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<NoticeQuery>,
) -> Result<HttpResponse> {
    let chrome = Chrome::load(&state, &req, "home")
        .await
        .with_notice(query.notice.as_deref());
    let (shop, hours_value) = load_shop(&state).await;
    let hours = OperatingHours::from_setting(hours_value.as_deref());

    let mut error = String::new();
    let services = match state.gateway.list_active_services().await {
        Ok(services) => services.into_iter().map(ServiceCard::from).collect(),
        Err(err) => {
            log::error!("Failed to load services: {err}");
            error = "We couldn't load our services right now.".to_string();
            Vec::new()
        }
    };
    let products = match state.gateway.list_products().await {
        Ok(mut products) => {
            products.retain(|product| product.quantity > 0);
            products.sort_by_key(|product| !product.on_sale());
            products
                .into_iter()
                .take(FEATURED_PRODUCTS)
                .map(ProductCard::from)
                .collect()
        }
        Err(err) => {
            log::error!("Failed to load products: {err}");
            Vec::new()
        }
    };

    Ok(render(HomeTemplate {
        chrome,
        shop,
        services,
        hours: hours_rows(&hours),
        products,
        error,
    }))
}

async fn products(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse> {
    let chrome = Chrome::load(&state, &req, "products").await;
    let q = query.q.clone().unwrap_or_default().trim().to_string();

    let (products, error) = match state.gateway.list_products().await {
        Ok(products) => (listing::search(products, &q), String::new()),
        Err(err) => {
            log::error!("Failed to load products: {err}");
            (Vec::new(), "We couldn't load the catalog right now.".to_string())
        }
    };
    let empty_message = if q.is_empty() {
        "No products yet. Check back soon."
    } else {
        "No products match your search."
    };

    Ok(render(ProductsTemplate {
        chrome,
        q,
        products: products.into_iter().map(ProductCard::from).collect(),
        error,
        empty_message: empty_message.to_string(),
    }))
}

async fn contact(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<NoticeQuery>,
) -> Result<HttpResponse> {
    let chrome = Chrome::load(&state, &req, "contact")
        .await
        .with_notice(query.notice.as_deref());
    let (shop, _) = load_shop(&state).await;
    let mut form = ContactView::default();
    if let Some(session) = state.session_state(&req).await.session() {
        form.email = session.user.email.clone();
    }
    Ok(render(ContactTemplate {
        chrome,
        shop,
        form,
        errors: Vec::new(),
    }))
}

fn validate_contact(form: &ContactForm) -> Vec<String> {
    let mut errors = Vec::new();
    if form.name.trim().is_empty() {
        errors.push("Please tell us your name.".to_string());
    }
    let email = form.email.trim();
    if email.is_empty() || !email.contains('@') {
        errors.push("Please enter a valid email address.".to_string());
    }
    if form.body.trim().is_empty() {
        errors.push("Please write a message.".to_string());
    }
    errors
}

async fn send_message(
    state: web::Data<AppState>,
    req: HttpRequest,
    form: web::Form<ContactForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let mut errors = validate_contact(&form);

    if errors.is_empty() {
        let created = state
            .gateway
            .create_message(NewMessage {
                name: form.name.trim().to_string(),
                email: form.email.trim().to_string(),
                phone: non_blank(form.phone.clone()),
                subject: non_blank(form.subject.clone()),
                body: form.body.trim().to_string(),
            })
            .await;
        match created {
            Ok(message) => {
                log::info!("Contact message {} received from {}", message.id, message.email);
                return Ok(redirect_with_notice("/contact", "sent"));
            }
            Err(err) => {
                log::error!("Failed to store contact message: {err}");
                errors.push("We couldn't send your message. Please try again.".to_string());
            }
        }
    }

    let chrome = Chrome::load(&state, &req, "contact").await;
    let (shop, _) = load_shop(&state).await;
    Ok(render(ContactTemplate {
        chrome,
        shop,
        form: ContactView {
            name: form.name,
            email: form.email,
            phone: form.phone.unwrap_or_default(),
            subject: form.subject.unwrap_or_default(),
            body: form.body,
        },
        errors,
    }))
}

async fn login_form(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<RedirectQuery>,
) -> Result<HttpResponse> {
    let redirect = safe_redirect_target(query.redirect.as_deref(), "/");
    let chrome = Chrome::load(&state, &req, "login").await;
    Ok(render(LoginTemplate {
        title: chrome.labels.login.to_string(),
        chrome,
        action: "/login",
        redirect_encoded: urlencoding::encode(&redirect).into_owned(),
        redirect,
        email: String::new(),
        error: String::new(),
        show_register: true,
    }))
}

/// Signed-in redirect carrying the session cookie.
pub(crate) fn signed_in_response(
    state: &AppState,
    req: &HttpRequest,
    session: &Session,
    target: &str,
) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, target.to_string()))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .cookie(session_cookie(req, &session.token, state.auth.ttl()))
        .finish()
}

async fn login(
    state: web::Data<AppState>,
    req: HttpRequest,
    form: web::Form<CredentialsForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let redirect = safe_redirect_target(form.redirect.as_deref(), "/");
    match state.auth.sign_in(&form.email, &form.password).await {
        Ok(session) => {
            log::info!("{} signed in", session.user.email);
            Ok(signed_in_response(&state, &req, &session, &redirect))
        }
        Err(err) => {
            log::warn!("Sign-in failed for {}: {err}", form.email.trim());
            let chrome = Chrome::load(&state, &req, "login").await;
            Ok(render(LoginTemplate {
                title: chrome.labels.login.to_string(),
                chrome,
                action: "/login",
                redirect_encoded: urlencoding::encode(&redirect).into_owned(),
                redirect,
                email: form.email,
                error: err.user_message().to_string(),
                show_register: true,
            }))
        }
    }
}

async fn register_form(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<RedirectQuery>,
) -> Result<HttpResponse> {
    let redirect = safe_redirect_target(query.redirect.as_deref(), "/");
    Ok(render(RegisterTemplate {
        chrome: Chrome::load(&state, &req, "login").await,
        redirect_encoded: urlencoding::encode(&redirect).into_owned(),
        redirect,
        email: String::new(),
        error: String::new(),
    }))
}

async fn register(
    state: web::Data<AppState>,
    req: HttpRequest,
    form: web::Form<CredentialsForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let redirect = safe_redirect_target(form.redirect.as_deref(), "/");
    match state.auth.sign_up(&form.email, &form.password).await {
        Ok(session) => {
            log::info!("New customer account {}", session.user.email);
            let target = if redirect == "/" { "/?notice=welcome".to_string() } else { redirect };
            Ok(signed_in_response(&state, &req, &session, &target))
        }
        Err(err) => {
            log::warn!("Registration failed for {}: {err}", form.email.trim());
            Ok(render(RegisterTemplate {
                chrome: Chrome::load(&state, &req, "login").await,
                redirect_encoded: urlencoding::encode(&redirect).into_owned(),
                redirect,
                email: form.email,
                error: err.user_message().to_string(),
            }))
        }
    }
}

async fn logout(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    if let Some(token) = session_token(&req) {
        if let Err(err) = state.sessions.sign_out(&state.auth, &token).await {
            log::warn!("Sign-out failed: {err}");
        }
    }
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, "/?notice=signed_out"))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .cookie(clear_session_cookie(&req))
        .finish()
}

async fn set_language(
    path: web::Path<String>,
    query: web::Query<RedirectQuery>,
) -> HttpResponse {
    let target = safe_redirect_target(query.redirect.as_deref(), "/");
    match Language::parse(&path.into_inner()) {
        Some(language) => HttpResponse::SeeOther()
            .insert_header((header::LOCATION, target))
            .cookie(language.cookie())
            .finish(),
        None => see_other(&target),
    }
}
