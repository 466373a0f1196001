use chrono::{NaiveDateTime, Utc};
use serde::Serialize;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_CUSTOMER: &str = "customer";

pub const BOOKING_SCHEDULED: &str = "scheduled";
pub const BOOKING_COMPLETED: &str = "completed";
pub const BOOKING_CANCELLED: &str = "cancelled";
pub const BOOKING_NO_SHOW: &str = "no-show";
pub const BOOKING_STATUSES: [&str; 4] = [
    BOOKING_SCHEDULED,
    BOOKING_COMPLETED,
    BOOKING_CANCELLED,
    BOOKING_NO_SHOW,
];

pub const MESSAGE_UNREAD: &str = "unread";
pub const MESSAGE_READ: &str = "read";
pub const MESSAGE_ARCHIVED: &str = "archived";
pub const MESSAGE_STATUSES: [&str; 3] = [MESSAGE_UNREAD, MESSAGE_READ, MESSAGE_ARCHIVED];

pub const SETTING_SHOP_NAME: &str = "shop_name";
pub const SETTING_SHOP_EMAIL: &str = "shop_email";
pub const SETTING_SHOP_PHONE: &str = "shop_phone";
pub const SETTING_SHOP_ADDRESS: &str = "shop_address";
pub const SETTING_OPERATING_HOURS: &str = "operating_hours";

/// Booking wall-clock format. Fixed width so stored values order lexicographically.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn format_timestamp(value: NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

/// Accepts the stored format as well as the minute precision sent by
/// `datetime-local` inputs.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .ok()
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub user_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewCustomer {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub duration_minutes: i64,
    pub price: f64,
    pub active: bool,
    pub category: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewService {
    pub name: String,
    pub description: Option<String>,
    pub duration_minutes: i64,
    pub price: f64,
    pub active: bool,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Staff {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewStaff {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub purchase_price: f64,
    pub original_price: f64,
    pub discount_percentage: f64,
    pub sale_price: f64,
    pub quantity: i64,
    pub reorder_level: i64,
    pub image_url: Option<String>,
    pub created_at: String,
}

impl Product {
    pub fn needs_reorder(&self) -> bool {
        self.quantity <= self.reorder_level
    }

    pub fn on_sale(&self) -> bool {
        self.discount_percentage > 0.0 && self.sale_price < self.original_price
    }
}

/// Product fields as entered; `sale_price` is derived by the gateway on write.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub purchase_price: f64,
    pub original_price: f64,
    pub discount_percentage: f64,
    pub quantity: i64,
    pub reorder_level: i64,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Booking {
    pub id: String,
    pub customer_id: String,
    pub service_id: Option<String>,
    pub staff_id: Option<String>,
    pub start_time: String,
    pub end_time: String,
    pub status: String,
    pub notes: Option<String>,
    pub message: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub customer_id: String,
    pub service_id: Option<String>,
    pub staff_id: Option<String>,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub status: String,
    pub notes: Option<String>,
    pub message: Option<String>,
}

/// Booking joined with the display names of its references.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BookingRow {
    pub id: String,
    pub customer_id: String,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub service_id: Option<String>,
    pub service_name: Option<String>,
    pub staff_id: Option<String>,
    pub staff_name: Option<String>,
    pub start_time: String,
    pub end_time: String,
    pub status: String,
    pub notes: Option<String>,
    pub message: Option<String>,
    pub created_at: String,
}

impl BookingRow {
    pub fn start(&self) -> Option<NaiveDateTime> {
        parse_timestamp(&self.start_time)
    }

    pub fn end(&self) -> Option<NaiveDateTime> {
        parse_timestamp(&self.end_time)
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Message {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: Option<String>,
    pub body: String,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

/// Trims a form value and maps blank input to `None`.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn timestamps_accept_datetime_local_input() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 6)
            .and_then(|date| date.and_hms_opt(9, 30, 0))
            .unwrap();
        assert_eq!(parse_timestamp("2024-05-06T09:30"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-06T09:30:00"), Some(expected));
        assert_eq!(format_timestamp(expected), "2024-05-06T09:30:00");
        assert_eq!(parse_timestamp("tomorrow"), None);
    }

    #[test]
    fn blank_form_values_become_none() {
        assert_eq!(non_blank(Some("  ".to_string())), None);
        assert_eq!(non_blank(Some(" Gold ".to_string())), Some("Gold".to_string()));
        assert_eq!(non_blank(None), None);
    }
}
