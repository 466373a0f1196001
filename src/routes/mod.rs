pub mod admin;
pub mod booking;
pub mod public;

use actix_web::{http::header, HttpResponse};

pub fn see_other(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, location.to_string()))
        .finish()
}

/// Redirect that carries a flash notice code to the next page.
pub fn redirect_with_notice(path: &str, notice: &str) -> HttpResponse {
    let separator = if path.contains('?') { '&' } else { '?' };
    see_other(&format!("{path}{separator}notice={notice}"))
}

pub fn format_money(value: f64) -> String {
    format!("${value:.2}")
}
