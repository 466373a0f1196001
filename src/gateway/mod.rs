//! Typed access to the shop's backend store.
//!
//! Every view goes through [`Gateway`] for reads and writes. Collections are always
//! returned whole; filtering, sorting and paging happen in the views. Constraint
//! failures raised by the store are reported with Postgres-style error codes so callers
//! can tell a unique violation or a double booking from any other failure.

mod bookings;
mod customers;
mod messages;
mod products;
mod services;
mod settings;
pub mod slots;
mod staff;

use sqlx::SqlitePool;
use thiserror::Error;

/// Raised by the store when a scheduled booking would overlap another one.
pub const SLOT_CONFLICT_CODE: &str = "23P01";
pub const UNIQUE_VIOLATION_CODE: &str = "23505";
pub const FOREIGN_KEY_VIOLATION_CODE: &str = "23503";
pub const INVALID_PARAMETER_CODE: &str = "22023";

/// Message used by the overlap triggers in the schema.
const OVERLAP_MARKER: &str = "booking_overlap";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("remote error {code}: {message}")]
    Remote { code: String, message: String },
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl GatewayError {
    pub fn remote(code: &str, message: impl Into<String>) -> Self {
        Self::Remote {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Remote { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    pub fn is_slot_conflict(&self) -> bool {
        self.code() == Some(SLOT_CONFLICT_CODE)
    }

    pub fn is_unique_violation(&self) -> bool {
        self.code() == Some(UNIQUE_VIOLATION_CODE)
    }
}

impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.message().contains(OVERLAP_MARKER) {
                return Self::remote(
                    SLOT_CONFLICT_CODE,
                    "booking overlaps an existing scheduled booking",
                );
            }
            if db_err.is_unique_violation() {
                return Self::remote(UNIQUE_VIOLATION_CODE, db_err.message());
            }
            if db_err.is_foreign_key_violation() {
                return Self::remote(FOREIGN_KEY_VIOLATION_CODE, db_err.message());
            }
        }
        Self::Database(err)
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Clone)]
pub struct Gateway {
    db: SqlitePool,
}

impl Gateway {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }
}

/// Fails with `NotFound` when an update or delete touched no row.
fn expect_affected(rows: u64, entity: &'static str) -> GatewayResult<()> {
    if rows == 0 {
        Err(GatewayError::NotFound(entity))
    } else {
        Ok(())
    }
}
