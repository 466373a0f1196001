use std::collections::HashMap;

use actix_web::{web, HttpRequest, HttpResponse, Result};
use askama::Template;

use crate::{
    auth::Session,
    hours::{title_case, OperatingHours, DAY_KEYS},
    listing::ListQuery,
    models::{
        non_blank, SETTING_OPERATING_HOURS, SETTING_SHOP_ADDRESS, SETTING_SHOP_EMAIL,
        SETTING_SHOP_NAME, SETTING_SHOP_PHONE,
    },
    routes::{public::load_shop, redirect_with_notice},
    state::AppState,
    templates::{render, Chrome},
};

const BASE: &str = "/admin/settings";

struct DayRow {
    key: &'static str,
    label: String,
    is_open: bool,
    start: String,
    end: String,
}

#[derive(Template)]
#[template(path = "admin_settings.html")]
struct SettingsTemplate {
    chrome: Chrome,
    shop_name: String,
    shop_email: String,
    shop_phone: String,
    shop_address: String,
    days: Vec<DayRow>,
    errors: Vec<String>,
}

impl SettingsTemplate {
    fn from_form(chrome: Chrome, fields: &HashMap<String, String>, errors: Vec<String>) -> Self {
        let text = |key: &str| fields.get(key).cloned().unwrap_or_default();
        let days = DAY_KEYS
            .into_iter()
            .map(|key| DayRow {
                key,
                label: title_case(key),
                is_open: fields.contains_key(&format!("{key}_open")),
                start: text(&format!("{key}_start")),
                end: text(&format!("{key}_end")),
            })
            .collect();
        Self {
            chrome,
            shop_name: text(SETTING_SHOP_NAME),
            shop_email: text(SETTING_SHOP_EMAIL),
            shop_phone: text(SETTING_SHOP_PHONE),
            shop_address: text(SETTING_SHOP_ADDRESS),
            days,
            errors,
        }
    }
}

/// Checks the whole form and returns the rows to store, hours serialised as JSON.
fn settings_pairs(fields: &HashMap<String, String>) -> Result<Vec<(String, String)>, Vec<String>> {
    let mut errors = Vec::new();
    let value = |key: &str| non_blank(fields.get(key).cloned()).unwrap_or_default();

    let shop_name = value(SETTING_SHOP_NAME);
    if shop_name.is_empty() {
        errors.push("Shop name is required.".to_string());
    }
    let shop_email = value(SETTING_SHOP_EMAIL);
    if !shop_email.is_empty() && !shop_email.contains('@') {
        errors.push("Shop email looks invalid.".to_string());
    }
    let hours = match OperatingHours::from_form(fields) {
        Ok(hours) => match hours.to_setting_value() {
            Ok(value) => Some(value),
            Err(err) => {
                log::error!("Couldn't serialise operating hours: {err}");
                errors.push("Couldn't save the opening hours.".to_string());
                None
            }
        },
        Err(day_errors) => {
            errors.extend(day_errors);
            None
        }
    };

    match hours {
        Some(hours) if errors.is_empty() => Ok(vec![
            (SETTING_SHOP_NAME.to_string(), shop_name),
            (SETTING_SHOP_EMAIL.to_string(), shop_email),
            (SETTING_SHOP_PHONE.to_string(), value(SETTING_SHOP_PHONE)),
            (SETTING_SHOP_ADDRESS.to_string(), value(SETTING_SHOP_ADDRESS)),
            (SETTING_OPERATING_HOURS.to_string(), hours),
        ]),
        _ => Err(errors),
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/settings")
            .route(web::get().to(edit))
            .route(web::post().to(save)),
    );
}

async fn edit(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse> {
    let chrome = Chrome::admin(&state, &req, &session, "settings").with_notice(query.notice.as_deref());
    let (shop, hours_value) = load_shop(&state).await;
    let hours = OperatingHours::from_setting(hours_value.as_deref());

    let days = hours
        .days()
        .into_iter()
        .map(|(key, day)| DayRow {
            key,
            label: title_case(key),
            is_open: day.is_open,
            start: day.start.clone(),
            end: day.end.clone(),
        })
        .collect();
    Ok(render(SettingsTemplate {
        chrome,
        shop_name: shop.name,
        shop_email: shop.email,
        shop_phone: shop.phone,
        shop_address: shop.address,
        days,
        errors: Vec::new(),
    }))
}

async fn save(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
    fields: web::Form<HashMap<String, String>>,
) -> Result<HttpResponse> {
    let errors = match settings_pairs(&fields) {
        Ok(pairs) => match state.gateway.upsert_settings(&pairs).await {
            Ok(()) => {
                log::info!("Shop settings updated by {}", session.user.email);
                return Ok(redirect_with_notice(BASE, "saved"));
            }
            Err(err) => {
                log::error!("Failed to save settings: {err}");
                vec!["Couldn't save the settings. Please try again.".to_string()]
            }
        },
        Err(errors) => errors,
    };
    let chrome = Chrome::admin(&state, &req, &session, "settings");
    Ok(render(SettingsTemplate::from_form(chrome, &fields, errors)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::SESSION_COOKIE, models::ROLE_ADMIN, test_utils::setup_state};
    use actix_web::{cookie::Cookie, http::StatusCode, test as actix_test, App};

    fn week_form() -> Vec<(String, String)> {
        let mut fields = vec![
            (SETTING_SHOP_NAME.to_string(), "Sharp & Co".to_string()),
            (SETTING_SHOP_EMAIL.to_string(), "hello@sharp.test".to_string()),
            (SETTING_SHOP_PHONE.to_string(), "555-0100".to_string()),
            (SETTING_SHOP_ADDRESS.to_string(), "1 Main St".to_string()),
        ];
        for key in DAY_KEYS {
            fields.push((format!("{key}_start"), "10:00".to_string()));
            fields.push((format!("{key}_end"), "19:00".to_string()));
            if key != "sunday" {
                fields.push((format!("{key}_open"), "on".to_string()));
            }
        }
        fields
    }

    #[test]
    fn invalid_hours_and_missing_name_are_collected_together() {
        let mut fields: HashMap<String, String> = week_form().into_iter().collect();
        fields.insert(SETTING_SHOP_NAME.to_string(), " ".to_string());
        fields.insert("monday_end".to_string(), "08:00".to_string());

        let errors = settings_pairs(&fields).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0], "Shop name is required.");
        assert!(errors[1].starts_with("Monday"));
    }

    #[actix_web::test]
    async fn saving_stores_flat_keys_and_serialised_hours() {
        let state = setup_state().await;
        state
            .auth
            .create_user("boss@example.com", "secret1", ROLE_ADMIN)
            .await
            .unwrap();
        let admin = state.auth.sign_in("boss@example.com", "secret1").await.unwrap();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(crate::routes::admin::configure),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri(BASE)
            .cookie(Cookie::new(SESSION_COOKIE, admin.token.clone()))
            .set_form(week_form())
            .to_request();
        assert_eq!(actix_test::call_service(&app, req).await.status(), StatusCode::SEE_OTHER);

        let name = state.gateway.get_setting(SETTING_SHOP_NAME).await.unwrap();
        assert_eq!(name.as_deref(), Some("Sharp & Co"));
        let stored = state.gateway.get_setting(SETTING_OPERATING_HOURS).await.unwrap().unwrap();
        let hours = OperatingHours::parse(&stored).unwrap();
        assert!(hours.saturday.is_open);
        assert!(!hours.sunday.is_open);
        assert_eq!(hours.monday.start, "10:00");
        assert_eq!(hours.friday.end, "19:00");

        let req = actix_test::TestRequest::get()
            .uri(BASE)
            .cookie(Cookie::new(SESSION_COOKIE, admin.token.clone()))
            .to_request();
        let body = actix_test::call_and_read_body(&app, req).await;
        assert!(String::from_utf8_lossy(&body).contains("1 Main St"));
    }
}
