use actix_web::{web, HttpRequest, HttpResponse, Result};
use askama::Template;
use chrono::{Local, NaiveDate, NaiveTime};
use serde::Deserialize;

use crate::{
    auth::Session,
    calendar::{build_week, week_start, CalendarEvent, WeekCalendar},
    hours::calendar_window,
    models::SETTING_OPERATING_HOURS,
    state::AppState,
    templates::{render, Chrome},
};

use super::fetch_error;

#[derive(Deserialize)]
struct WeekQuery {
    week: Option<String>,
}

#[derive(Template)]
#[template(path = "admin_calendar.html")]
struct CalendarTemplate {
    chrome: Chrome,
    calendar: WeekCalendar,
    title: String,
    prev_href: String,
    next_href: String,
    error: String,
}

fn week_href(date: NaiveDate) -> String {
    format!("/admin/calendar?week={}", date.format("%Y-%m-%d"))
}

/// Any day of the requested week is accepted; garbage falls back to the current week.
fn requested_week(raw: Option<&str>, today: NaiveDate) -> NaiveDate {
    let day = raw
        .and_then(|value| NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok())
        .unwrap_or(today);
    week_start(day)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/calendar").route(web::get().to(week)));
}

async fn week(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
    query: web::Query<WeekQuery>,
) -> Result<HttpResponse> {
    let today = Local::now().date_naive();
    let start = requested_week(query.week.as_deref(), today);
    let end = start + chrono::Duration::days(7);

    let (hours, bookings) = tokio::join!(
        state.gateway.get_setting(SETTING_OPERATING_HOURS),
        state
            .gateway
            .bookings_between(start.and_time(NaiveTime::MIN), end.and_time(NaiveTime::MIN))
    );
    let hours = hours.unwrap_or_else(|err| {
        log::warn!("Operating hours unavailable, using the default window: {err}");
        None
    });
    let (events, error) = match bookings {
        Ok(rows) => (rows.iter().filter_map(CalendarEvent::from_row).collect(), String::new()),
        Err(err) => (Vec::new(), fetch_error("bookings", &err)),
    };

    let calendar = build_week(start, today, events, calendar_window(hours.as_deref()));
    let title = format!(
        "{} – {}",
        calendar.week_start.format("%d %b"),
        (calendar.week_end() - chrono::Duration::days(1)).format("%d %b %Y")
    );
    Ok(render(CalendarTemplate {
        chrome: Chrome::admin(&state, &req, &session, "calendar"),
        prev_href: week_href(calendar.prev_week()),
        next_href: week_href(calendar.next_week()),
        title,
        calendar,
        error,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::SESSION_COOKIE,
        hours::OperatingHours,
        models::{NewBooking, NewCustomer, BOOKING_SCHEDULED, ROLE_ADMIN},
        test_utils::{at, setup_state},
    };
    use actix_web::{cookie::Cookie, test as actix_test, App};

    #[test]
    fn any_day_selects_its_monday() {
        let today = at("2024-05-09T00:00").date();
        assert_eq!(requested_week(Some("2024-05-12"), today), at("2024-05-06T00:00").date());
        assert_eq!(requested_week(Some("next week"), today), at("2024-05-06T00:00").date());
        assert_eq!(requested_week(None, today), at("2024-05-06T00:00").date());
    }

    #[actix_web::test]
    async fn week_page_lists_bookings_inside_opening_hours() {
        let state = setup_state().await;
        state
            .auth
            .create_user("boss@example.com", "secret1", ROLE_ADMIN)
            .await
            .unwrap();
        let admin = state.auth.sign_in("boss@example.com", "secret1").await.unwrap();
        let hours = OperatingHours::default().to_setting_value().unwrap();
        state
            .gateway
            .upsert_settings(&[(SETTING_OPERATING_HOURS.to_string(), hours)])
            .await
            .unwrap();
        let customer = state
            .gateway
            .create_customer(NewCustomer {
                name: "Dana Reyes".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        state
            .gateway
            .create_booking(NewBooking {
                customer_id: customer.id,
                service_id: None,
                staff_id: None,
                start_time: at("2024-05-08T10:00"),
                end_time: at("2024-05-08T10:30"),
                status: BOOKING_SCHEDULED.to_string(),
                notes: None,
                message: None,
            })
            .await
            .unwrap();

        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(crate::routes::admin::configure),
        )
        .await;
        let req = actix_test::TestRequest::get()
            .uri("/admin/calendar?week=2024-05-08")
            .cookie(Cookie::new(SESSION_COOKIE, admin.token.clone()))
            .to_request();
        let body = actix_test::call_and_read_body(&app, req).await;
        let html = String::from_utf8_lossy(&body);
        assert!(html.contains("Dana Reyes"));
        assert!(html.contains("09:00"));
        assert!(!html.contains("08:30"));
        assert!(html.contains("week=2024-05-13"));
    }
}
