use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Booking {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: ObjectId,
    pub class_id: ObjectId,
    pub status: BookingStatus,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub booking_date: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn confirmed(user_id: ObjectId, class_id: ObjectId, now: DateTime<Utc>) -> Booking {
        Booking {
            id: ObjectId::new(),
            user_id,
            class_id,
            status: BookingStatus::Confirmed,
            booking_date: now,
            created_at: now,
        }
    }

    pub fn holds_seat(&self) -> bool {
        self.status == BookingStatus::Confirmed
    }
}

/// `Waitlist` is a storable value only: nothing in the ledger moves a booking
/// into or out of it.
#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Waitlist,
    Cancelled,
}

impl BookingStatus {
    pub fn is_terminal(&self) -> bool {
        *self == BookingStatus::Cancelled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingFilter {
    All,
    User(ObjectId),
    Class(ObjectId),
}

impl BookingFilter {
    pub fn is_match(&self, booking: &Booking) -> bool {
        match self {
            BookingFilter::All => true,
            BookingFilter::User(id) => booking.user_id == *id,
            BookingFilter::Class(id) => booking.class_id == *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings_match_storage() {
        assert_eq!(BookingStatus::Confirmed.as_ref(), "confirmed");
        assert_eq!(BookingStatus::Waitlist.as_ref(), "waitlist");
        assert_eq!(BookingStatus::Cancelled.as_ref(), "cancelled");
        assert_eq!(
            bson::to_bson(&BookingStatus::Cancelled).unwrap(),
            bson::Bson::String("cancelled".to_owned())
        );
        assert_eq!(
            "waitlist".parse::<BookingStatus>().unwrap(),
            BookingStatus::Waitlist
        );
    }

    #[test]
    fn test_new_booking_holds_seat() {
        let booking = Booking::confirmed(ObjectId::new(), ObjectId::new(), Utc::now());
        assert!(booking.holds_seat());
        assert!(!booking.status.is_terminal());
        assert_eq!(booking.booking_date, booking.created_at);
    }

    #[test]
    fn test_filter() {
        let booking = Booking::confirmed(ObjectId::new(), ObjectId::new(), Utc::now());
        assert!(BookingFilter::All.is_match(&booking));
        assert!(BookingFilter::User(booking.user_id).is_match(&booking));
        assert!(BookingFilter::Class(booking.class_id).is_match(&booking));
        assert!(!BookingFilter::Class(booking.user_id).is_match(&booking));
    }
}
