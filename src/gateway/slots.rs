//! `get_available_slots_with_hours`: bookable start times for a date.
//!
//! Candidates sit on a fixed grid from opening time. A candidate survives when the
//! whole appointment fits before closing (ending exactly at closing is allowed), it
//! does not overlap a scheduled booking, and it is still in the future.

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime};

use crate::{
    hours::OperatingHours,
    models::{format_timestamp, parse_timestamp, BOOKING_SCHEDULED, SETTING_OPERATING_HOURS},
};

use super::{bookings::day_bounds, Gateway, GatewayError, GatewayResult, INVALID_PARAMETER_CODE};

pub const SLOT_STEP_MINUTES: i64 = 30;

impl Gateway {
    pub async fn get_available_slots_with_hours(
        &self,
        duration_minutes: i64,
        target_date: NaiveDate,
    ) -> GatewayResult<Vec<NaiveDateTime>> {
        self.available_slots_at(duration_minutes, target_date, Local::now().naive_local())
            .await
    }

    pub(crate) async fn available_slots_at(
        &self,
        duration_minutes: i64,
        target_date: NaiveDate,
        now: NaiveDateTime,
    ) -> GatewayResult<Vec<NaiveDateTime>> {
        let grid = self.slot_grid(duration_minutes, target_date, now).await?;
        if grid.is_empty() {
            return Ok(grid);
        }

        let (day_start, day_end) = day_bounds(target_date);
        let taken = sqlx::query_as::<_, (String, String)>(
            r#"SELECT start_time, end_time FROM bookings
               WHERE status = ? AND start_time < ? AND end_time > ?"#,
        )
        .bind(BOOKING_SCHEDULED)
        .bind(format_timestamp(day_end))
        .bind(format_timestamp(day_start))
        .fetch_all(&self.db)
        .await?;
        let taken: Vec<(NaiveDateTime, NaiveDateTime)> = taken
            .iter()
            .filter_map(|(start, end)| Some((parse_timestamp(start)?, parse_timestamp(end)?)))
            .collect();

        let duration = Duration::minutes(duration_minutes);
        Ok(grid
            .into_iter()
            .filter(|candidate| {
                let end = *candidate + duration;
                !taken
                    .iter()
                    .any(|(booked_start, booked_end)| *booked_start < end && *candidate < *booked_end)
            })
            .collect())
    }

    /// Whether `slot` is a start time the shop offers at all, booked or not: inside
    /// opening hours, on the half-hour grid and still in the future.
    pub async fn is_on_slot_grid(&self, duration_minutes: i64, slot: NaiveDateTime) -> GatewayResult<bool> {
        self.slot_on_grid_at(duration_minutes, slot, Local::now().naive_local())
            .await
    }

    pub(crate) async fn slot_on_grid_at(
        &self,
        duration_minutes: i64,
        slot: NaiveDateTime,
        now: NaiveDateTime,
    ) -> GatewayResult<bool> {
        let grid = self.slot_grid(duration_minutes, slot.date(), now).await?;
        Ok(grid.contains(&slot))
    }

    /// Start times from opening on a [`SLOT_STEP_MINUTES`] grid where the whole
    /// appointment fits before closing and the start is after `now`.
    async fn slot_grid(
        &self,
        duration_minutes: i64,
        target_date: NaiveDate,
        now: NaiveDateTime,
    ) -> GatewayResult<Vec<NaiveDateTime>> {
        if duration_minutes <= 0 {
            return Err(GatewayError::remote(
                INVALID_PARAMETER_CODE,
                "duration_minutes must be positive",
            ));
        }
        if target_date < now.date() {
            return Ok(Vec::new());
        }

        let stored = self.get_setting(SETTING_OPERATING_HOURS).await?;
        let hours = OperatingHours::from_setting(stored.as_deref());
        let Some((open, close)) = hours.for_weekday(target_date.weekday()).span() else {
            return Ok(Vec::new());
        };

        let duration = Duration::minutes(duration_minutes);
        let step = Duration::minutes(SLOT_STEP_MINUTES);
        let closing = target_date.and_time(close);
        let mut candidate = target_date.and_time(open);
        let mut grid = Vec::new();
        while candidate + duration <= closing {
            if candidate > now {
                grid.push(candidate);
            }
            candidate += step;
        }
        Ok(grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        hours::DayHours,
        models::{NewBooking, NewCustomer, BOOKING_CANCELLED},
        test_utils::{at, setup_gateway},
    };

    // 2024-05-06 is a Monday, 2024-05-12 a Sunday.
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 6).unwrap()
    }

    fn early_morning() -> NaiveDateTime {
        at("2024-05-01T07:00")
    }

    async fn book(gateway: &Gateway, start: &str, end: &str, status: &str) {
        let customer = gateway
            .create_customer(NewCustomer {
                name: "Booked".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        gateway
            .create_booking(NewBooking {
                customer_id: customer.id,
                service_id: None,
                staff_id: None,
                start_time: at(start),
                end_time: at(end),
                status: status.to_string(),
                notes: None,
                message: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn default_hours_yield_half_hour_grid() {
        let gateway = setup_gateway().await;
        let slots = gateway
            .available_slots_at(30, monday(), early_morning())
            .await
            .unwrap();

        // 09:00 to 17:30 inclusive on a 09:00-18:00 day.
        assert_eq!(slots.len(), 18);
        assert_eq!(slots.first(), Some(&at("2024-05-06T09:00")));
        assert_eq!(slots.last(), Some(&at("2024-05-06T17:30")));
    }

    #[tokio::test]
    async fn scheduled_bookings_are_excluded() {
        let gateway = setup_gateway().await;
        book(&gateway, "2024-05-06T10:00", "2024-05-06T10:45", BOOKING_SCHEDULED).await;
        book(&gateway, "2024-05-06T13:00", "2024-05-06T14:00", BOOKING_CANCELLED).await;

        let slots = gateway
            .available_slots_at(30, monday(), early_morning())
            .await
            .unwrap();

        assert!(!slots.contains(&at("2024-05-06T10:00")));
        assert!(!slots.contains(&at("2024-05-06T10:30")));
        assert!(slots.contains(&at("2024-05-06T09:30")));
        assert!(slots.contains(&at("2024-05-06T11:00")));
        assert!(slots.contains(&at("2024-05-06T13:00")));
    }

    #[tokio::test]
    async fn closed_days_and_past_dates_have_no_slots() {
        let gateway = setup_gateway().await;
        let sunday = NaiveDate::from_ymd_opt(2024, 5, 12).unwrap();
        assert!(gateway
            .available_slots_at(30, sunday, early_morning())
            .await
            .unwrap()
            .is_empty());

        let after = at("2024-05-07T08:00");
        assert!(gateway.available_slots_at(30, monday(), after).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn today_only_offers_future_slots() {
        let gateway = setup_gateway().await;
        let slots = gateway
            .available_slots_at(30, monday(), at("2024-05-06T16:10"))
            .await
            .unwrap();
        assert_eq!(slots, vec![at("2024-05-06T16:30"), at("2024-05-06T17:00"), at("2024-05-06T17:30")]);
    }

    #[tokio::test]
    async fn configured_hours_are_respected() {
        let gateway = setup_gateway().await;
        let mut hours = OperatingHours::default();
        hours.monday = DayHours {
            is_open: true,
            start: "10:00".to_string(),
            end: "11:30".to_string(),
        };
        gateway
            .upsert_settings(&[(
                SETTING_OPERATING_HOURS.to_string(),
                hours.to_setting_value().unwrap(),
            )])
            .await
            .unwrap();

        let slots = gateway
            .available_slots_at(60, monday(), early_morning())
            .await
            .unwrap();
        assert_eq!(slots, vec![at("2024-05-06T10:00"), at("2024-05-06T10:30")]);
    }

    #[tokio::test]
    async fn grid_membership_ignores_bookings_but_not_hours() {
        let gateway = setup_gateway().await;
        book(&gateway, "2024-05-06T10:00", "2024-05-06T10:30", BOOKING_SCHEDULED).await;
        let now = early_morning();

        assert!(gateway.slot_on_grid_at(30, at("2024-05-06T10:00"), now).await.unwrap());
        assert!(!gateway.slot_on_grid_at(30, at("2024-05-06T10:15"), now).await.unwrap());
        assert!(!gateway.slot_on_grid_at(30, at("2024-05-06T03:00"), now).await.unwrap());
        assert!(!gateway.slot_on_grid_at(30, at("2024-05-12T10:00"), now).await.unwrap());
        assert!(!gateway.slot_on_grid_at(30, at("2024-04-29T10:00"), now).await.unwrap());
    }

    #[tokio::test]
    async fn non_positive_duration_is_rejected() {
        let gateway = setup_gateway().await;
        let err = gateway
            .available_slots_at(0, monday(), early_morning())
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(INVALID_PARAMETER_CODE));
    }
}
