use actix_web::{web, HttpRequest, HttpResponse, Result};
use askama::Template;
use chrono::{Duration, Local, NaiveDate};

use crate::{
    auth::Session,
    gateway::{Gateway, GatewayResult},
    state::AppState,
    templates::{render, Chrome},
};

use super::fetch_error;

const TREND_DAYS: i64 = 7;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Summary {
    customers: i64,
    bookings_today: i64,
    unread_messages: i64,
    low_stock: i64,
}

struct TrendDay {
    label: String,
    count: i64,
    /// Bar width relative to the busiest day, 0–100.
    percent: i64,
}

#[derive(Template)]
#[template(path = "admin_dashboard.html")]
struct DashboardTemplate {
    chrome: Chrome,
    summary: Option<Summary>,
    summary_error: String,
    trend: Vec<TrendDay>,
    trend_error: String,
}

/// All four counts or nothing: one failed query fails the whole summary.
async fn load_summary(gateway: &Gateway, today: NaiveDate) -> GatewayResult<Summary> {
    let (customers, bookings_today, unread_messages, low_stock) = tokio::try_join!(
        gateway.count_customers(),
        gateway.count_bookings_on(today),
        gateway.count_unread_messages(),
        gateway.count_low_stock_products(),
    )?;
    Ok(Summary {
        customers,
        bookings_today,
        unread_messages,
        low_stock,
    })
}

/// Booking counts for the last [`TREND_DAYS`] days ending today, oldest first.
/// Days are fetched one after another and the first failure abandons the series.
async fn load_trend(gateway: &Gateway, today: NaiveDate) -> GatewayResult<Vec<(NaiveDate, i64)>> {
    let mut counts = Vec::with_capacity(TREND_DAYS as usize);
    for offset in (0..TREND_DAYS).rev() {
        let day = today - Duration::days(offset);
        counts.push((day, gateway.count_bookings_on(day).await?));
    }
    Ok(counts)
}

fn trend_rows(counts: &[(NaiveDate, i64)]) -> Vec<TrendDay> {
    let busiest = counts.iter().map(|(_, count)| *count).max().unwrap_or(0).max(1);
    counts
        .iter()
        .map(|(day, count)| TrendDay {
            label: day.format("%a %d").to_string(),
            count: *count,
            percent: count * 100 / busiest,
        })
        .collect()
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/dashboard").route(web::get().to(dashboard)));
}

async fn dashboard(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
) -> Result<HttpResponse> {
    let today = Local::now().date_naive();
    let (summary, trend) = tokio::join!(load_summary(&state.gateway, today), load_trend(&state.gateway, today));

    let (summary, summary_error) = match summary {
        Ok(summary) => (Some(summary), String::new()),
        Err(err) => (None, fetch_error("the summary", &err)),
    };
    let (trend, trend_error) = match trend {
        Ok(counts) => (trend_rows(&counts), String::new()),
        Err(err) => (Vec::new(), fetch_error("the booking trend", &err)),
    };

    Ok(render(DashboardTemplate {
        chrome: Chrome::admin(&state, &req, &session, "dashboard"),
        summary,
        summary_error,
        trend,
        trend_error,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{NewBooking, NewCustomer, NewMessage, BOOKING_SCHEDULED},
        test_utils::{sample_product, setup_gateway},
    };

    async fn book(gateway: &Gateway, customer_id: &str, day: NaiveDate, hour: u32) {
        let start = day.and_hms_opt(hour, 0, 0).unwrap();
        gateway
            .create_booking(NewBooking {
                customer_id: customer_id.to_string(),
                service_id: None,
                staff_id: None,
                start_time: start,
                end_time: start + Duration::minutes(30),
                status: BOOKING_SCHEDULED.to_string(),
                notes: None,
                message: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn summary_counts_every_source() {
        let gateway = setup_gateway().await;
        let today = NaiveDate::from_ymd_opt(2024, 5, 8).unwrap();
        let customer = gateway
            .create_customer(NewCustomer {
                name: "Dana".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        book(&gateway, &customer.id, today, 10).await;
        book(&gateway, &customer.id, today - Duration::days(1), 10).await;
        gateway
            .create_message(NewMessage {
                name: "Ana".to_string(),
                email: "ana@example.com".to_string(),
                phone: None,
                subject: None,
                body: "Hi".to_string(),
            })
            .await
            .unwrap();
        let mut low = sample_product("Clay");
        low.quantity = 2;
        gateway.create_product(low).await.unwrap();
        gateway.create_product(sample_product("Oil")).await.unwrap();

        let summary = load_summary(&gateway, today).await.unwrap();
        assert_eq!(
            summary,
            Summary {
                customers: 1,
                bookings_today: 1,
                unread_messages: 1,
                low_stock: 1,
            }
        );
    }

    #[tokio::test]
    async fn trend_covers_seven_days_oldest_first() {
        let gateway = setup_gateway().await;
        let today = NaiveDate::from_ymd_opt(2024, 5, 8).unwrap();
        let customer = gateway
            .create_customer(NewCustomer {
                name: "Dana".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        book(&gateway, &customer.id, today, 9).await;
        book(&gateway, &customer.id, today, 11).await;
        book(&gateway, &customer.id, today - Duration::days(6), 9).await;
        book(&gateway, &customer.id, today - Duration::days(7), 9).await;

        let counts = load_trend(&gateway, today).await.unwrap();
        let values: Vec<i64> = counts.iter().map(|(_, count)| *count).collect();
        assert_eq!(values, vec![1, 0, 0, 0, 0, 0, 2]);
        assert_eq!(counts[0].0, today - Duration::days(6));

        let rows = trend_rows(&counts);
        assert_eq!(rows[6].percent, 100);
        assert_eq!(rows[0].percent, 50);
    }

    #[tokio::test]
    async fn a_failed_query_fails_summary_and_trend() {
        let gateway = setup_gateway().await;
        gateway.pool().close().await;
        let today = NaiveDate::from_ymd_opt(2024, 5, 8).unwrap();
        assert!(load_summary(&gateway, today).await.is_err());
        assert!(load_trend(&gateway, today).await.is_err());
    }
}
