//! HTTP surface of the booking wizard. Each request rebuilds the wizard from the query
//! string, so the step a customer sees always matches the URL they can bookmark.

use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Result};
use askama::Template;
use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use serde::Deserialize;

use crate::{
    auth::Session,
    error::AppError,
    gateway::GatewayError,
    guards,
    models::{format_timestamp, parse_timestamp},
    routes::see_other,
    state::AppState,
    templates::{render, render_status, Chrome},
    wizard::{BookingWizard, Confirmation, WizardError, WizardStep, DEFAULT_DURATION_MINUTES},
};

const QUICK_DAYS: i64 = 7;

struct DayChip {
    value: String,
    label: String,
    selected: bool,
}

struct SlotLink {
    label: String,
    href: String,
}

#[derive(Template)]
#[template(path = "book_select.html")]
struct BookSelectTemplate {
    chrome: Chrome,
    step: u8,
    date: String,
    date_label: String,
    min_date: String,
    days: Vec<DayChip>,
    slots: Vec<SlotLink>,
    error: String,
}

#[derive(Template)]
#[template(path = "book_details.html")]
struct BookDetailsTemplate {
    chrome: Chrome,
    step: u8,
    date: String,
    slot_value: String,
    slot_label: String,
    phone: String,
    message: String,
    error: String,
}

#[derive(Template)]
#[template(path = "book_confirmed.html")]
struct BookConfirmedTemplate {
    chrome: Chrome,
    step: u8,
    when: String,
    message: String,
    booking_id: String,
}

#[derive(Deserialize)]
struct BookQuery {
    step: Option<String>,
    date: Option<String>,
    slot: Option<String>,
    booking: Option<String>,
}

#[derive(Deserialize)]
struct BookForm {
    date: Option<String>,
    slot: String,
    phone: Option<String>,
    message: Option<String>,
    action: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/book")
            .route(web::get().to(show))
            .route(web::post().to(submit)),
    );
}

fn parse_date(value: Option<&str>) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value?.trim(), "%Y-%m-%d").ok()
}

fn details_path(slot: NaiveDateTime) -> String {
    format!(
        "/book?step=details&date={}&slot={}",
        slot.date(),
        urlencoding::encode(&format_timestamp(slot))
    )
}

fn slot_label(slot: NaiveDateTime) -> String {
    slot.format("%A %d %B %Y, %H:%M").to_string()
}

async fn load_slots(state: &AppState, wizard: &mut BookingWizard, date: NaiveDate) {
    if let Some(request) = wizard.select_date(date) {
        let result = state
            .gateway
            .get_available_slots_with_hours(DEFAULT_DURATION_MINUTES, request.date)
            .await;
        wizard.apply_slots(request, result);
    }
}

async fn show(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<BookQuery>,
) -> Result<HttpResponse, AppError> {
    let today = Local::now().date_naive();
    let step = WizardStep::from_query(query.step.as_deref());
    let date = parse_date(query.date.as_deref())
        .filter(|date| *date >= today)
        .unwrap_or(today);

    if step.requires_session() {
        let session = match guards::require_customer(&state, &req, &guards::requested_path(&req)).await {
            Ok(session) => session,
            Err(response) => return Ok(response),
        };
        if step == WizardStep::Confirmed {
            return show_confirmation(&state, &req, &session, query.booking.as_deref(), today).await;
        }
        return show_details(&state, &req, &session, date, query.slot.as_deref(), today).await;
    }

    let mut wizard = BookingWizard::new(today);
    load_slots(&state, &mut wizard, date).await;
    let chrome = Chrome::load(&state, &req, "book").await;
    Ok(select_page(chrome, &wizard, today, String::new()))
}

fn select_page(chrome: Chrome, wizard: &BookingWizard, today: NaiveDate, error: String) -> HttpResponse {
    let selected = wizard.selected_date();
    let days = (0..QUICK_DAYS)
        .map(|offset| today + Duration::days(offset))
        .map(|day| DayChip {
            value: day.to_string(),
            label: day.format("%a %d").to_string(),
            selected: day == selected,
        })
        .collect();
    let slots = wizard
        .slots()
        .iter()
        .map(|slot| SlotLink {
            label: slot.format("%H:%M").to_string(),
            href: details_path(*slot),
        })
        .collect();
    let error = if error.is_empty() {
        wizard.slots_error().unwrap_or_default().to_string()
    } else {
        error
    };

    render(BookSelectTemplate {
        chrome,
        step: wizard.step().number(),
        date: selected.to_string(),
        date_label: selected.format("%A %d %B").to_string(),
        min_date: today.to_string(),
        days,
        slots,
        error,
    })
}

async fn show_details(
    state: &AppState,
    req: &HttpRequest,
    session: &Session,
    date: NaiveDate,
    slot: Option<&str>,
    today: NaiveDate,
) -> Result<HttpResponse, AppError> {
    let Some(slot) = slot.and_then(parse_timestamp) else {
        return Ok(see_other(&format!("/book?date={date}")));
    };

    let mut wizard = BookingWizard::new(today);
    load_slots(state, &mut wizard, slot.date()).await;
    if let Err(err) = wizard.select_slot(slot) {
        let chrome = Chrome::load(state, req, "book").await;
        return Ok(select_page(chrome, &wizard, today, err.to_string()));
    }

    let phone = match state.gateway.find_customer_by_user(&session.user.id).await {
        Ok(customer) => customer.and_then(|customer| customer.phone).unwrap_or_default(),
        Err(err) => {
            log::warn!("Could not prefill phone for {}: {err}", session.user.email);
            String::new()
        }
    };
    wizard.set_details(&phone, "");

    let chrome = Chrome::load(state, req, "book").await;
    Ok(details_page(chrome, &wizard, StatusCode::OK))
}

fn details_page(chrome: Chrome, wizard: &BookingWizard, status: StatusCode) -> HttpResponse {
    let slot = wizard.selected_slot();
    render_status(
        status,
        BookDetailsTemplate {
            chrome,
            step: wizard.step().number(),
            date: wizard.selected_date().to_string(),
            slot_value: slot.map(format_timestamp).unwrap_or_default(),
            slot_label: slot.map(slot_label).unwrap_or_default(),
            phone: wizard.phone().to_string(),
            message: wizard.message().to_string(),
            error: wizard
                .submit_error()
                .map(ToString::to_string)
                .unwrap_or_default(),
        },
    )
}

async fn show_confirmation(
    state: &AppState,
    req: &HttpRequest,
    session: &Session,
    booking_id: Option<&str>,
    today: NaiveDate,
) -> Result<HttpResponse, AppError> {
    let booking_id = booking_id.ok_or(AppError::NotFound)?;
    let booking = state.gateway.get_booking(booking_id).await?;
    let customer = state.gateway.get_customer(&booking.customer_id).await?;
    let owned = customer.user_id.as_deref() == Some(session.user.id.as_str())
        || customer.email.as_deref() == Some(session.user.email.as_str());
    if !owned {
        log::warn!("{} tried to view booking {booking_id}", session.user.email);
        return Err(AppError::NotFound);
    }

    let (Some(start), Some(end)) = (parse_timestamp(&booking.start_time), parse_timestamp(&booking.end_time)) else {
        return Err(GatewayError::remote("22007", "stored booking time is malformed").into());
    };
    let wizard = BookingWizard::confirmed(
        today,
        Confirmation {
            booking_id: booking.id,
            start,
            end,
            message: booking.message.unwrap_or_default(),
        },
    );
    let Some(confirmation) = wizard.confirmation() else {
        return Err(AppError::NotFound);
    };

    let chrome = Chrome::load(state, req, "book").await;
    Ok(render(BookConfirmedTemplate {
        chrome,
        step: wizard.step().number(),
        when: format!("{} – {}", slot_label(confirmation.start), confirmation.end.format("%H:%M")),
        message: confirmation.message.clone(),
        booking_id: confirmation.booking_id.clone(),
    }))
}

async fn submit(
    state: web::Data<AppState>,
    req: HttpRequest,
    form: web::Form<BookForm>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    let today = Local::now().date_naive();
    let Some(slot) = parse_timestamp(&form.slot) else {
        let date = parse_date(form.date.as_deref()).unwrap_or(today);
        return Ok(see_other(&format!("/book?date={date}")));
    };

    if form.action.as_deref() == Some("back") {
        return Ok(see_other(&format!("/book?date={}", slot.date())));
    }

    let session = match guards::require_customer(&state, &req, &details_path(slot)).await {
        Ok(session) => session,
        Err(response) => return Ok(response),
    };

    let phone = form.phone.as_deref().unwrap_or_default();
    let message = form.message.as_deref().unwrap_or_default();

    let mut wizard = BookingWizard::new(today);
    load_slots(&state, &mut wizard, slot.date()).await;
    if wizard.select_slot(slot).is_err() {
        let err = rejected_slot(&state, &wizard, slot).await;
        let chrome = Chrome::load(&state, &req, "book").await;
        return Ok(rejected_details_page(chrome, slot, phone, message, &err));
    }
    wizard.set_details(phone, message);

    match wizard.submit(&state.gateway, &session).await {
        Ok(()) => match wizard.confirmation() {
            Some(confirmation) => Ok(see_other(&format!(
                "/book?step=confirmed&booking={}",
                confirmation.booking_id
            ))),
            None => Err(AppError::NotFound),
        },
        Err(err) => {
            let chrome = Chrome::load(&state, &req, "book").await;
            Ok(details_page(chrome, &wizard, error_status(&err)))
        }
    }
}

fn error_status(err: &WizardError) -> StatusCode {
    match err {
        WizardError::SlotTaken => StatusCode::CONFLICT,
        WizardError::MissingMessage | WizardError::UnknownSlot => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Why a posted slot is missing from the fresh availability list: a time the shop
/// offers that someone else holds now, or a time it never offers.
async fn rejected_slot(state: &AppState, wizard: &BookingWizard, slot: NaiveDateTime) -> WizardError {
    if wizard.slots_error().is_some() {
        return WizardError::SubmitFailed;
    }
    match state.gateway.is_on_slot_grid(DEFAULT_DURATION_MINUTES, slot).await {
        Ok(true) => WizardError::SlotTaken,
        Ok(false) => {
            log::warn!("Rejected booking request for unavailable slot {slot}");
            WizardError::UnknownSlot
        }
        Err(err) => {
            log::error!("Slot check for {slot} failed: {err}");
            WizardError::SubmitFailed
        }
    }
}

fn rejected_details_page(
    chrome: Chrome,
    slot: NaiveDateTime,
    phone: &str,
    message: &str,
    err: &WizardError,
) -> HttpResponse {
    render_status(
        error_status(err),
        BookDetailsTemplate {
            chrome,
            step: WizardStep::EnterDetails.number(),
            date: slot.date().to_string(),
            slot_value: format_timestamp(slot),
            slot_label: slot_label(slot),
            phone: phone.trim().to_string(),
            message: message.trim().to_string(),
            error: err.to_string(),
        },
    )
}
