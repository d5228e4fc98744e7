use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::{decimal::Decimal, errors::ValidationError, user::required};

pub const DEFAULT_MAX_CAPACITY: u32 = 20;
const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Class {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub title: String,
    pub description: String,
    pub instructor: ObjectId,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub start_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub end_at: DateTime<Utc>,
    pub max_capacity: u32,
    /// Number of confirmed bookings. Only the ledger's booking operations move it.
    #[serde(default)]
    pub current_capacity: u32,
    pub price: Decimal,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Class {
    pub fn is_full(&self) -> bool {
        self.current_capacity >= self.max_capacity
    }

    pub fn details(&self) -> ClassDetails {
        ClassDetails {
            title: self.title.clone(),
            description: self.description.clone(),
            instructor: self.instructor,
            start_at: self.start_at,
            end_at: self.end_at,
            max_capacity: self.max_capacity,
            price: self.price,
        }
    }

    /// Returns the owner-editable part of the class with `patch` applied and
    /// revalidated. The counter is not part of the result.
    pub fn patched(&self, patch: ClassPatch) -> Result<ClassDetails, ValidationError> {
        let mut details = self.details();
        if let Some(title) = patch.title {
            details.title = title;
        }
        if let Some(description) = patch.description {
            details.description = description;
        }
        if let Some(instructor) = patch.instructor {
            details.instructor = instructor;
        }
        if let Some(start_at) = patch.start_at {
            details.start_at = start_at;
        }
        if let Some(end_at) = patch.end_at {
            details.end_at = end_at;
        }
        if let Some(max_capacity) = patch.max_capacity {
            details.max_capacity = max_capacity;
        }
        if let Some(price) = patch.price {
            details.price = parse_price(&price)?;
        }
        details.validate()
    }
}

/// Fields a studio owner may edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDetails {
    pub title: String,
    pub description: String,
    pub instructor: ObjectId,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub max_capacity: u32,
    pub price: Decimal,
}

impl ClassDetails {
    fn validate(self) -> Result<ClassDetails, ValidationError> {
        let title = required("title", &self.title, MAX_TITLE_LEN)?;
        let description = required("description", &self.description, usize::MAX)?;
        if self.start_at >= self.end_at {
            return Err(ValidationError::InvalidTimeRange {
                start_at: self.start_at,
                end_at: self.end_at,
            });
        }
        if self.max_capacity == 0 {
            return Err(ValidationError::ZeroCapacity);
        }
        if self.price.is_negative() {
            return Err(ValidationError::InvalidPrice(self.price.to_string()));
        }
        Ok(ClassDetails {
            title,
            description,
            ..self
        })
    }
}

/// Class creation input as received from the request layer.
#[derive(Debug, Clone)]
pub struct NewClass {
    pub title: String,
    pub description: String,
    pub instructor: ObjectId,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub max_capacity: Option<u32>,
    pub price: String,
}

impl NewClass {
    pub fn into_class(self, now: DateTime<Utc>) -> Result<Class, ValidationError> {
        let details = ClassDetails {
            title: self.title,
            description: self.description,
            instructor: self.instructor,
            start_at: self.start_at,
            end_at: self.end_at,
            max_capacity: self.max_capacity.unwrap_or(DEFAULT_MAX_CAPACITY),
            price: parse_price(&self.price)?,
        }
        .validate()?;

        Ok(Class {
            id: ObjectId::new(),
            title: details.title,
            description: details.description,
            instructor: details.instructor,
            start_at: details.start_at,
            end_at: details.end_at,
            max_capacity: details.max_capacity,
            current_capacity: 0,
            price: details.price,
            created_at: now,
        })
    }
}

/// Partial owner edit. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct ClassPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub instructor: Option<ObjectId>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub max_capacity: Option<u32>,
    pub price: Option<String>,
}

fn parse_price(price: &str) -> Result<Decimal, ValidationError> {
    let value = price
        .parse::<Decimal>()
        .map_err(|_| ValidationError::InvalidPrice(price.to_owned()))?;
    if value.is_negative() {
        return Err(ValidationError::InvalidPrice(price.to_owned()));
    }
    Ok(value)
}
