use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use mongodb::error::TRANSIENT_TRANSACTION_ERROR;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Common error: {0:#}")]
    Eyre(#[from] eyre::Error),
    #[error("Mongo error: {0}")]
    MongoError(#[from] mongodb::error::Error),
    #[error("Class not found: {0}")]
    ClassNotFound(ObjectId),
    #[error("Booking not found: {0}")]
    BookingNotFound(ObjectId),
    #[error("User not found: {0}")]
    UserNotFound(ObjectId),
    #[error("Class is full")]
    CapacityExceeded {
        class_id: ObjectId,
        max_capacity: u32,
    },
    #[error("User already booked this class")]
    AlreadyBooked {
        user_id: ObjectId,
        class_id: ObjectId,
    },
    #[error("Max capacity {requested} is below {current_capacity} confirmed bookings")]
    CapacityBelowBookings {
        class_id: ObjectId,
        current_capacity: u32,
        requested: u32,
    },
    #[error("User is not allowed to manage classes")]
    NotStudioOwner(ObjectId),
    #[error("User already exists: {0}")]
    UserAlreadyExists(String),
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] ValidationError),
}

impl LedgerError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LedgerError::ClassNotFound(_)
                | LedgerError::BookingNotFound(_)
                | LedgerError::UserNotFound(_)
        )
    }

    /// Write conflicts between concurrent transactions. The whole transaction
    /// may be replayed.
    pub fn is_transient(&self) -> bool {
        match self {
            LedgerError::MongoError(err) => err.contains_label(TRANSIENT_TRANSACTION_ERROR),
            LedgerError::Eyre(err) => err
                .downcast_ref::<mongodb::error::Error>()
                .map(|err| err.contains_label(TRANSIENT_TRANSACTION_ERROR))
                .unwrap_or(false),
            _ => false,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("{field} is longer than {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("invalid email: {0}")]
    InvalidEmail(String),
    #[error("class must start before it ends: {start_at} >= {end_at}")]
    InvalidTimeRange {
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    },
    #[error("max capacity must be positive")]
    ZeroCapacity,
    #[error("invalid price: {0}")]
    InvalidPrice(String),
}
