use actix_web::{web, HttpRequest, HttpResponse, Result};
use chrono::{Duration, NaiveDateTime};
use serde::Deserialize;

use crate::{
    auth::Session,
    gateway::GatewayError,
    listing::{self, ListQuery, Listable, SortKey},
    models::{
        non_blank, parse_timestamp, Booking, BookingRow, Customer, NewBooking, Service, Staff,
        BOOKING_SCHEDULED, BOOKING_STATUSES,
    },
    routes::redirect_with_notice,
    state::AppState,
    templates::{render, Chrome},
    wizard::DEFAULT_DURATION_MINUTES,
};

use super::{
    fetch_error, write_error, AdminConfirmTemplate, AdminFormTemplate, AdminListTemplate, Cell,
    FilterLink, FormField, Header, RowAction, SelectOption, TableRow,
};

const BASE: &str = "/admin/bookings";
const SORTABLE: [&str; 5] = ["start", "customer", "service", "staff", "status"];
const INPUT_FORMAT: &str = "%Y-%m-%dT%H:%M";
const CONFLICT_MESSAGE: &str = "This time slot overlaps another scheduled booking. Pick another time or staff member.";

impl Listable for BookingRow {
    fn search_fields(&self) -> Vec<&str> {
        [
            self.customer_name.as_deref(),
            self.service_name.as_deref(),
            self.staff_name.as_deref(),
            Some(self.status.as_str()),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn sort_key(&self, column: &str) -> SortKey {
        match column {
            "customer" => SortKey::optional_text(self.customer_name.as_deref()),
            "service" => SortKey::optional_text(self.service_name.as_deref()),
            "staff" => SortKey::optional_text(self.staff_name.as_deref()),
            "status" => SortKey::text(&self.status),
            _ => SortKey::text(&self.start_time),
        }
    }
}

fn status_label(status: &str) -> String {
    match status {
        "no-show" => "No-show".to_string(),
        other => crate::hours::title_case(other),
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "scheduled" => "info",
        "completed" => "ok",
        "cancelled" => "muted",
        _ => "warn",
    }
}

#[derive(Deserialize)]
struct BookingForm {
    customer_id: String,
    service_id: Option<String>,
    staff_id: Option<String>,
    start_time: String,
    end_time: Option<String>,
    status: String,
    notes: Option<String>,
    message: Option<String>,
}

impl Default for BookingForm {
    fn default() -> Self {
        Self {
            customer_id: String::new(),
            service_id: None,
            staff_id: None,
            start_time: String::new(),
            end_time: None,
            status: BOOKING_SCHEDULED.to_string(),
            notes: None,
            message: None,
        }
    }
}

/// Reference data for the form's select boxes.
#[derive(Default)]
struct Choices {
    customers: Vec<Customer>,
    services: Vec<Service>,
    staff: Vec<Staff>,
}

impl BookingForm {
    fn from_booking(booking: &Booking) -> Self {
        let input_value = |value: &str| {
            parse_timestamp(value)
                .map(|time| time.format(INPUT_FORMAT).to_string())
                .unwrap_or_else(|| value.to_string())
        };
        Self {
            customer_id: booking.customer_id.clone(),
            service_id: booking.service_id.clone(),
            staff_id: booking.staff_id.clone(),
            start_time: input_value(&booking.start_time),
            end_time: Some(input_value(&booking.end_time)),
            status: booking.status.clone(),
            notes: booking.notes.clone(),
            message: booking.message.clone(),
        }
    }

    /// A blank end time is filled from the chosen service's duration.
    fn validate(&self, services: &[Service]) -> Result<NewBooking, Vec<String>> {
        let mut errors = Vec::new();
        if self.customer_id.trim().is_empty() {
            errors.push("Choose a customer.".to_string());
        }
        if !BOOKING_STATUSES.contains(&self.status.as_str()) {
            errors.push("Choose a valid status.".to_string());
        }
        let service_id = non_blank(self.service_id.clone());
        let start = parse_timestamp(&self.start_time);
        if start.is_none() {
            errors.push("Start time is required.".to_string());
        }
        let end = match non_blank(self.end_time.clone()) {
            Some(raw) => {
                let end = parse_timestamp(&raw);
                if end.is_none() {
                    errors.push("End time is not a valid date and time.".to_string());
                }
                end
            }
            None => start.map(|start| start + default_length(service_id.as_deref(), services)),
        };
        if let (Some(start), Some(end)) = (start, end) {
            if end <= start {
                errors.push("End time must be after the start time.".to_string());
            }
        }

        match (start, end) {
            (Some(start_time), Some(end_time)) if errors.is_empty() => Ok(NewBooking {
                customer_id: self.customer_id.trim().to_string(),
                service_id,
                staff_id: non_blank(self.staff_id.clone()),
                start_time,
                end_time,
                status: self.status.clone(),
                notes: non_blank(self.notes.clone()),
                message: non_blank(self.message.clone()),
            }),
            _ => Err(errors),
        }
    }

    fn fields(&self, choices: &Choices) -> Vec<FormField> {
        let selected = |value: &Option<String>, id: &str| value.as_deref() == Some(id);

        let mut customers = vec![SelectOption::new("", "Choose a customer", self.customer_id.is_empty())];
        customers.extend(choices.customers.iter().map(|customer| {
            let label = match customer.email.as_deref() {
                Some(email) => format!("{} ({email})", customer.name),
                None => customer.name.clone(),
            };
            SelectOption::new(customer.id.clone(), label, customer.id == self.customer_id)
        }));

        let mut services = vec![SelectOption::new("", "No service", self.service_id.is_none())];
        services.extend(choices.services.iter().map(|service| {
            SelectOption::new(
                service.id.clone(),
                format!("{} · {} min", service.name, service.duration_minutes),
                selected(&self.service_id, &service.id),
            )
        }));

        let mut staff = vec![SelectOption::new("", "Anyone", self.staff_id.is_none())];
        staff.extend(
            choices
                .staff
                .iter()
                .map(|member| SelectOption::new(member.id.clone(), member.name.clone(), selected(&self.staff_id, &member.id))),
        );

        let statuses = BOOKING_STATUSES
            .iter()
            .map(|status| SelectOption::new(*status, status_label(status), self.status == *status))
            .collect();

        vec![
            FormField::select("customer_id", "Customer", customers).required(),
            FormField::select("service_id", "Service", services),
            FormField::select("staff_id", "Staff", staff),
            FormField::datetime("start_time", "Start", self.start_time.clone()).required(),
            FormField::datetime("end_time", "End", self.end_time.clone().unwrap_or_default())
                .help("Leave empty to use the service length."),
            FormField::select("status", "Status", statuses),
            FormField::textarea("notes", "Notes", self.notes.clone().unwrap_or_default()),
            FormField::textarea("message", "Customer message", self.message.clone().unwrap_or_default()),
        ]
    }
}

fn default_length(service_id: Option<&str>, services: &[Service]) -> Duration {
    let minutes = service_id
        .and_then(|id| services.iter().find(|service| service.id == id))
        .map(|service| service.duration_minutes)
        .filter(|minutes| *minutes > 0)
        .unwrap_or(DEFAULT_DURATION_MINUTES);
    Duration::minutes(minutes)
}

fn booking_write_error(err: &GatewayError) -> Option<String> {
    if err.is_slot_conflict() {
        log::warn!("Booking rejected: {err}");
        return Some(CONFLICT_MESSAGE.to_string());
    }
    write_error("booking", err)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/bookings")
            .route(web::get().to(list))
            .route(web::post().to(create)),
    )
    .service(web::resource("/bookings/new").route(web::get().to(new_form)))
    .service(web::resource("/bookings/{id}/edit").route(web::get().to(edit_form)))
    .service(web::resource("/bookings/{id}").route(web::post().to(update)))
    .service(
        web::resource("/bookings/{id}/delete")
            .route(web::get().to(confirm_delete))
            .route(web::post().to(delete)),
    );
}

async fn list(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse> {
    let chrome = Chrome::admin(&state, &req, &session, "bookings").with_notice(query.notice.as_deref());
    let (bookings, error) = match state.gateway.list_bookings().await {
        Ok(bookings) => (bookings, String::new()),
        Err(err) => (Vec::new(), fetch_error("bookings", &err)),
    };

    let status = query
        .status
        .as_deref()
        .filter(|status| BOOKING_STATUSES.contains(status))
        .map(str::to_string);
    let bookings: Vec<BookingRow> = match status.as_deref() {
        Some(status) => bookings.into_iter().filter(|booking| booking.status == status).collect(),
        None => bookings,
    };

    let view = listing::build(bookings, &query, BASE, &SORTABLE, "start");
    let mut filters = vec![FilterLink {
        label: "All".to_string(),
        href: view.controls.status_href("all"),
        active: status.is_none(),
    }];
    filters.extend(BOOKING_STATUSES.iter().map(|value| FilterLink {
        label: status_label(value),
        href: view.controls.status_href(value),
        active: status.as_deref() == Some(*value),
    }));

    let headers = vec![
        Header::sortable("When", "start", &view.controls),
        Header::sortable("Customer", "customer", &view.controls),
        Header::sortable("Service", "service", &view.controls),
        Header::sortable("Staff", "staff", &view.controls),
        Header::sortable("Status", "status", &view.controls),
    ];
    let rows = view
        .rows
        .into_iter()
        .map(|booking| {
            let when = match (booking.start(), booking.end()) {
                (Some(start), Some(end)) => format_range(start, end),
                _ => booking.start_time.clone(),
            };
            TableRow {
                actions: RowAction::edit_delete(BASE, &booking.id),
                cells: vec![
                    Cell::text(when),
                    Cell::text(booking.customer_name.clone().unwrap_or_else(|| "Unknown".to_string())),
                    Cell::text(booking.service_name.clone().unwrap_or_default()),
                    Cell::text(booking.staff_name.clone().unwrap_or_default()),
                    Cell::badge(status_label(&booking.status), status_badge(&booking.status)),
                ],
                detail: booking.message.unwrap_or_default(),
            }
        })
        .collect();

    Ok(render(AdminListTemplate {
        chrome,
        title: "Bookings",
        new_href: format!("{BASE}/new"),
        controls: view.controls,
        status_value: status.unwrap_or_default(),
        filters,
        headers,
        rows,
        error,
    }))
}

fn format_range(start: NaiveDateTime, end: NaiveDateTime) -> String {
    format!("{} {}–{}", start.format("%a %d %b %Y"), start.format("%H:%M"), end.format("%H:%M"))
}

async fn load_choices(state: &AppState, errors: &mut Vec<String>) -> Choices {
    let loaded = tokio::try_join!(
        state.gateway.list_customers(),
        state.gateway.list_services(),
        state.gateway.list_staff()
    );
    match loaded {
        Ok((customers, services, staff)) => Choices {
            customers,
            services,
            staff,
        },
        Err(err) => {
            errors.push(fetch_error("customers, services and staff", &err));
            Choices::default()
        }
    }
}

fn form_page(
    chrome: Chrome,
    title: &str,
    action: String,
    form: &BookingForm,
    choices: &Choices,
    errors: Vec<String>,
) -> HttpResponse {
    let mut page = AdminFormTemplate::new(chrome, title, action, BASE);
    page.fields = form.fields(choices);
    page.errors = errors;
    render(page)
}

async fn new_form(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
) -> Result<HttpResponse> {
    let mut errors = Vec::new();
    let choices = load_choices(&state, &mut errors).await;
    let chrome = Chrome::admin(&state, &req, &session, "bookings");
    Ok(form_page(chrome, "New booking", BASE.to_string(), &BookingForm::default(), &choices, errors))
}

async fn create(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
    form: web::Form<BookingForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let mut errors = Vec::new();
    let choices = load_choices(&state, &mut errors).await;
    if errors.is_empty() {
        match form.validate(&choices.services) {
            Ok(input) => match state.gateway.create_booking(input).await {
                Ok(booking) => {
                    log::info!("Booking {} created for {}", booking.id, booking.start_time);
                    return Ok(redirect_with_notice(BASE, "created"));
                }
                Err(err) => errors.extend(booking_write_error(&err)),
            },
            Err(invalid) => errors = invalid,
        }
    }
    let chrome = Chrome::admin(&state, &req, &session, "bookings");
    Ok(form_page(chrome, "New booking", BASE.to_string(), &form, &choices, errors))
}

async fn edit_form(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let booking = match state.gateway.get_booking(&id).await {
        Ok(booking) => booking,
        Err(err) => {
            log::warn!("Booking {id} unavailable: {err}");
            return Ok(redirect_with_notice(BASE, "not_found"));
        }
    };
    let mut errors = Vec::new();
    let choices = load_choices(&state, &mut errors).await;
    let chrome = Chrome::admin(&state, &req, &session, "bookings");
    Ok(form_page(
        chrome,
        "Edit booking",
        format!("{BASE}/{id}"),
        &BookingForm::from_booking(&booking),
        &choices,
        errors,
    ))
}

async fn update(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
    path: web::Path<String>,
    form: web::Form<BookingForm>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let form = form.into_inner();
    let mut errors = Vec::new();
    let choices = load_choices(&state, &mut errors).await;
    if errors.is_empty() {
        match form.validate(&choices.services) {
            Ok(input) => match state.gateway.update_booking(&id, input).await {
                Ok(_) => return Ok(redirect_with_notice(BASE, "saved")),
                Err(err) => match booking_write_error(&err) {
                    Some(message) => errors.push(message),
                    None => return Ok(redirect_with_notice(BASE, "not_found")),
                },
            },
            Err(invalid) => errors = invalid,
        }
    }
    let chrome = Chrome::admin(&state, &req, &session, "bookings");
    Ok(form_page(chrome, "Edit booking", format!("{BASE}/{id}"), &form, &choices, errors))
}

async fn confirm_delete(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let Ok(booking) = state.gateway.get_booking_row(&id).await else {
        return Ok(redirect_with_notice(BASE, "not_found"));
    };
    let when = match (booking.start(), booking.end()) {
        (Some(start), Some(end)) => format_range(start, end),
        _ => booking.start_time.clone(),
    };
    Ok(render(AdminConfirmTemplate {
        chrome: Chrome::admin(&state, &req, &session, "bookings"),
        title: "Delete booking".to_string(),
        message: format!(
            "Delete the booking for {} on {when}? Cancelling keeps the history; deleting removes it.",
            booking.customer_name.as_deref().unwrap_or("this customer")
        ),
        action: format!("{BASE}/{id}/delete"),
        cancel_href: BASE,
    }))
}

async fn delete(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let id = path.into_inner();
    let notice = match state.gateway.delete_booking(&id).await {
        Ok(()) => "deleted",
        Err(GatewayError::NotFound(_)) => "not_found",
        Err(err) => {
            log::error!("Failed to delete booking {id}: {err}");
            "failed"
        }
    };
    Ok(redirect_with_notice(BASE, notice))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::SESSION_COOKIE,
        models::{NewCustomer, ROLE_ADMIN},
        test_utils::{at, sample_service, setup_state},
    };
    use actix_web::{cookie::Cookie, http::StatusCode, test as actix_test, App};

    fn form(start: &str, end: Option<&str>, service: Option<&str>) -> BookingForm {
        BookingForm {
            customer_id: "c1".to_string(),
            service_id: service.map(str::to_string),
            start_time: start.to_string(),
            end_time: end.map(str::to_string),
            ..Default::default()
        }
    }

    fn service(id: &str, minutes: i64) -> Service {
        Service {
            id: id.to_string(),
            name: "Fade".to_string(),
            description: None,
            duration_minutes: minutes,
            price: 30.0,
            active: true,
            category: None,
            created_at: "2024-05-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn blank_end_uses_the_service_length() {
        let services = vec![service("s1", 45)];
        let input = form("2024-05-06T10:00", Some(""), Some("s1")).validate(&services).unwrap();
        assert_eq!(input.end_time, at("2024-05-06T10:45"));

        let input = form("2024-05-06T10:00", None, None).validate(&services).unwrap();
        assert_eq!(input.end_time, at("2024-05-06T10:30"));
    }

    #[test]
    fn inverted_times_and_unknown_status_are_rejected() {
        let errors = form("2024-05-06T10:00", Some("2024-05-06T09:00"), None)
            .validate(&[])
            .unwrap_err();
        assert_eq!(errors, vec!["End time must be after the start time.".to_string()]);

        let mut bad_status = form("2024-05-06T10:00", None, None);
        bad_status.status = "pending".to_string();
        assert!(bad_status.validate(&[]).is_err());
    }

    #[test]
    fn search_matches_names_and_status() {
        let row = BookingRow {
            id: "b1".to_string(),
            customer_id: "c1".to_string(),
            customer_name: Some("Dana Reyes".to_string()),
            customer_email: None,
            service_id: None,
            service_name: Some("Beard Trim".to_string()),
            staff_id: None,
            staff_name: Some("Marco".to_string()),
            start_time: "2024-05-06T10:00:00".to_string(),
            end_time: "2024-05-06T10:30:00".to_string(),
            status: "no-show".to_string(),
            notes: None,
            message: None,
            created_at: "2024-05-01T00:00:00Z".to_string(),
        };
        for term in ["dana", "BEARD", "marco", "no-show"] {
            assert_eq!(listing::search(vec![row.clone()], term).len(), 1, "{term}");
        }
    }

    #[actix_web::test]
    async fn overlapping_booking_shows_the_conflict_message() {
        let state = setup_state().await;
        state
            .auth
            .create_user("boss@example.com", "secret1", ROLE_ADMIN)
            .await
            .unwrap();
        let admin = state.auth.sign_in("boss@example.com", "secret1").await.unwrap();
        let customer = state
            .gateway
            .create_customer(NewCustomer {
                name: "Dana".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let service = state.gateway.create_service(sample_service("Cut", 30)).await.unwrap();

        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(crate::routes::admin::configure),
        )
        .await;
        let submit = |start: &'static str| {
            actix_test::TestRequest::post()
                .uri(BASE)
                .cookie(Cookie::new(SESSION_COOKIE, admin.token.clone()))
                .set_form([
                    ("customer_id", customer.id.as_str()),
                    ("service_id", service.id.as_str()),
                    ("staff_id", ""),
                    ("start_time", start),
                    ("end_time", ""),
                    ("status", "scheduled"),
                ])
                .to_request()
        };

        let resp = actix_test::call_service(&app, submit("2024-05-06T10:00")).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);

        let resp = actix_test::call_service(&app, submit("2024-05-06T10:15")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = actix_test::read_body(resp).await;
        assert!(String::from_utf8_lossy(&body).contains("overlaps another scheduled booking"));
        assert_eq!(state.gateway.list_bookings().await.unwrap().len(), 1);
    }
}
