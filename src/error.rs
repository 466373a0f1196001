use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::{auth::AuthError, gateway::GatewayError, storage::StorageError};

/// Failures that end a request without a page of their own.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("page not found")]
    NotFound,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("multipart error: {0}")]
    Multipart(String),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound | Self::Gateway(GatewayError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Storage(StorageError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(_) | Self::Multipart(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Request failed: {self}");
        } else {
            log::warn!("Request rejected: {self}");
        }
        let text = match status {
            StatusCode::NOT_FOUND => "We couldn't find that page.",
            StatusCode::BAD_REQUEST => "That request couldn't be processed.",
            _ => "Something went wrong on our side. Please try again.",
        };
        HttpResponse::build(status)
            .content_type("text/html; charset=utf-8")
            .body(format!(
                r#"<!doctype html><html lang="en"><head><meta charset="utf-8" /><title>{code}</title><link rel="stylesheet" href="/static/app.css" /></head><body><main class="card narrow"><h1>{code}</h1><p>{text}</p><p><a href="/">Back to the shop</a></p></main></body></html>"#,
                code = status.as_u16(),
            ))
    }
}
