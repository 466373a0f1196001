use chrono::{Days, NaiveDate, NaiveDateTime};

use crate::{
    auth::new_id,
    models::{format_timestamp, now_rfc3339, Booking, BookingRow, NewBooking, BOOKING_STATUSES},
};

use super::{expect_affected, Gateway, GatewayError, GatewayResult, INVALID_PARAMETER_CODE};

const BOOKING_COLUMNS: &str = "id, customer_id, service_id, staff_id, start_time, end_time, status, \
     notes, message, created_at";

const BOOKING_ROW_SELECT: &str = r#"SELECT b.id, b.customer_id, c.name AS customer_name,
       c.email AS customer_email, b.service_id, s.name AS service_name, b.staff_id,
       st.name AS staff_name, b.start_time, b.end_time, b.status, b.notes, b.message,
       b.created_at
FROM bookings b
LEFT JOIN customers c ON c.id = b.customer_id
LEFT JOIN services s ON s.id = b.service_id
LEFT JOIN staff st ON st.id = b.staff_id"#;

impl Gateway {
    pub async fn list_bookings(&self) -> GatewayResult<Vec<BookingRow>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "{BOOKING_ROW_SELECT} ORDER BY b.start_time DESC"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    /// Bookings starting in `[from, to)`.
    pub async fn bookings_between(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> GatewayResult<Vec<BookingRow>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "{BOOKING_ROW_SELECT} WHERE b.start_time >= ? AND b.start_time < ? ORDER BY b.start_time"
        ))
        .bind(format_timestamp(from))
        .bind(format_timestamp(to))
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn get_booking_row(&self, id: &str) -> GatewayResult<BookingRow> {
        sqlx::query_as::<_, BookingRow>(&format!("{BOOKING_ROW_SELECT} WHERE b.id = ?"))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(GatewayError::NotFound("booking"))
    }

    pub async fn get_booking(&self, id: &str) -> GatewayResult<Booking> {
        sqlx::query_as::<_, Booking>(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(GatewayError::NotFound("booking"))
    }

    pub async fn create_booking(&self, input: NewBooking) -> GatewayResult<Booking> {
        check_booking(&input)?;
        let id = new_id();
        sqlx::query(
            r#"INSERT INTO bookings
               (id, customer_id, service_id, staff_id, start_time, end_time, status, notes, message, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(&input.customer_id)
        .bind(input.service_id)
        .bind(input.staff_id)
        .bind(format_timestamp(input.start_time))
        .bind(format_timestamp(input.end_time))
        .bind(&input.status)
        .bind(input.notes)
        .bind(input.message)
        .bind(now_rfc3339())
        .execute(&self.db)
        .await?;
        self.get_booking(&id).await
    }

    pub async fn update_booking(&self, id: &str, input: NewBooking) -> GatewayResult<Booking> {
        check_booking(&input)?;
        let result = sqlx::query(
            r#"UPDATE bookings
               SET customer_id = ?, service_id = ?, staff_id = ?, start_time = ?, end_time = ?,
                   status = ?, notes = ?, message = ?
               WHERE id = ?"#,
        )
        .bind(&input.customer_id)
        .bind(input.service_id)
        .bind(input.staff_id)
        .bind(format_timestamp(input.start_time))
        .bind(format_timestamp(input.end_time))
        .bind(&input.status)
        .bind(input.notes)
        .bind(input.message)
        .bind(id)
        .execute(&self.db)
        .await?;
        expect_affected(result.rows_affected(), "booking")?;
        self.get_booking(id).await
    }

    pub async fn delete_booking(&self, id: &str) -> GatewayResult<()> {
        let result = sqlx::query("DELETE FROM bookings WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;
        expect_affected(result.rows_affected(), "booking")
    }

    pub async fn count_bookings_on(&self, date: NaiveDate) -> GatewayResult<i64> {
        let (from, to) = day_bounds(date);
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM bookings WHERE start_time >= ? AND start_time < ?",
        )
        .bind(format_timestamp(from))
        .bind(format_timestamp(to))
        .fetch_one(&self.db)
        .await?;
        Ok(count)
    }
}

pub(crate) fn day_bounds(date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let from = date.and_time(chrono::NaiveTime::MIN);
    let next = date.checked_add_days(Days::new(1)).unwrap_or(date);
    (from, next.and_time(chrono::NaiveTime::MIN))
}

fn check_booking(input: &NewBooking) -> GatewayResult<()> {
    if input.end_time <= input.start_time {
        return Err(GatewayError::remote(
            INVALID_PARAMETER_CODE,
            "booking must end after it starts",
        ));
    }
    if !BOOKING_STATUSES.contains(&input.status.as_str()) {
        return Err(GatewayError::remote(
            INVALID_PARAMETER_CODE,
            format!("unknown booking status {}", input.status),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{NewCustomer, BOOKING_CANCELLED, BOOKING_SCHEDULED},
        test_utils::{at, setup_gateway},
    };

    async fn customer(gateway: &Gateway, name: &str) -> String {
        gateway
            .create_customer(NewCustomer {
                name: name.to_string(),
                ..Default::default()
            })
            .await
            .unwrap()
            .id
    }

    fn booking(customer_id: &str, start: NaiveDateTime, minutes: i64) -> NewBooking {
        NewBooking {
            customer_id: customer_id.to_string(),
            service_id: None,
            staff_id: None,
            start_time: start,
            end_time: start + chrono::Duration::minutes(minutes),
            status: BOOKING_SCHEDULED.to_string(),
            notes: None,
            message: Some("Trim please".to_string()),
        }
    }

    #[tokio::test]
    async fn overlapping_scheduled_booking_is_a_slot_conflict() {
        let gateway = setup_gateway().await;
        let first = customer(&gateway, "First").await;
        let second = customer(&gateway, "Second").await;

        gateway
            .create_booking(booking(&first, at("2024-05-06T10:00"), 30))
            .await
            .unwrap();
        let err = gateway
            .create_booking(booking(&second, at("2024-05-06T10:15"), 30))
            .await
            .unwrap_err();

        assert!(err.is_slot_conflict(), "unexpected error {err:?}");
    }

    #[tokio::test]
    async fn adjacent_and_cancelled_bookings_do_not_conflict() {
        let gateway = setup_gateway().await;
        let id = customer(&gateway, "Regular").await;

        let cancelled = gateway
            .create_booking(booking(&id, at("2024-05-06T10:00"), 30))
            .await
            .unwrap();
        let mut input = booking(&id, at("2024-05-06T10:00"), 30);
        input.status = BOOKING_CANCELLED.to_string();
        gateway.update_booking(&cancelled.id, input).await.unwrap();

        gateway
            .create_booking(booking(&id, at("2024-05-06T10:00"), 30))
            .await
            .unwrap();
        gateway
            .create_booking(booking(&id, at("2024-05-06T10:30"), 30))
            .await
            .unwrap();

        assert_eq!(gateway.count_bookings_on(at("2024-05-06T00:00").date()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn rows_carry_joined_names() {
        let gateway = setup_gateway().await;
        let id = customer(&gateway, "Dana").await;
        let created = gateway
            .create_booking(booking(&id, at("2024-05-07T09:00"), 30))
            .await
            .unwrap();

        let row = gateway.get_booking_row(&created.id).await.unwrap();
        assert_eq!(row.customer_name.as_deref(), Some("Dana"));
        assert!(row.service_name.is_none());
        assert_eq!(row.start(), Some(at("2024-05-07T09:00")));
        assert_eq!(row.end(), Some(at("2024-05-07T09:30")));

        let week = gateway
            .bookings_between(at("2024-05-06T00:00"), at("2024-05-13T00:00"))
            .await
            .unwrap();
        assert_eq!(week.len(), 1);
    }

    #[tokio::test]
    async fn inverted_times_and_unknown_status_are_rejected() {
        let gateway = setup_gateway().await;
        let id = customer(&gateway, "Kim").await;

        let mut input = booking(&id, at("2024-05-06T10:00"), 30);
        input.end_time = input.start_time;
        assert!(gateway.create_booking(input).await.is_err());

        let mut input = booking(&id, at("2024-05-06T10:00"), 30);
        input.status = "pending".to_string();
        let err = gateway.create_booking(input).await.unwrap_err();
        assert_eq!(err.code(), Some(INVALID_PARAMETER_CODE));
    }
}
