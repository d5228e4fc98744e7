use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::errors::ValidationError;

const MAX_NAME_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 255;
const MAX_PHONE_LEN: usize = 20;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Admins and instructors run the studio: they create, edit and delete classes.
    pub fn is_studio_owner(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Instructor)
    }
}

#[derive(
    Debug,
    Serialize,
    Deserialize,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    AsRefStr,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Admin,
    Instructor,
    #[default]
    Member,
}

/// Registration input. Fields are raw until `into_user` validates them.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: Option<Role>,
}

impl NewUser {
    pub fn into_user(self, now: DateTime<Utc>) -> Result<User, ValidationError> {
        let email = normalize_email(&self.email)?;
        let first_name = required("first_name", &self.first_name, MAX_NAME_LEN)?;
        let last_name = required("last_name", &self.last_name, MAX_NAME_LEN)?;
        let phone = match self.phone.as_deref().map(sanitize_phone) {
            Some(phone) if phone.is_empty() => None,
            Some(phone) if phone.len() > MAX_PHONE_LEN => {
                return Err(ValidationError::TooLong {
                    field: "phone",
                    max: MAX_PHONE_LEN,
                })
            }
            phone => phone,
        };

        Ok(User {
            id: ObjectId::new(),
            email,
            first_name,
            last_name,
            phone,
            role: self.role.unwrap_or_default(),
            created_at: now,
        })
    }
}

pub(crate) fn required(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Empty(field));
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(value.to_owned())
}

pub fn normalize_email(email: &str) -> Result<String, ValidationError> {
    let email = email.trim().to_lowercase();
    if email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidEmail(email));
    }
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.') =>
        {
            Ok(email)
        }
        _ => Err(ValidationError::InvalidEmail(email)),
    }
}

pub fn sanitize_phone(phone: &str) -> String {
    let phone = phone.trim();
    let digits = phone.chars().filter(|c| c.is_ascii_digit());
    if phone.starts_with('+') {
        std::iter::once('+').chain(digits).collect()
    } else {
        digits.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user() -> NewUser {
        NewUser {
            email: "  Asha@Studio.Example ".to_owned(),
            first_name: "Asha".to_owned(),
            last_name: "Rao".to_owned(),
            phone: Some("+1 (234) 567-8900".to_owned()),
            role: None,
        }
    }

    #[test]
    fn test_into_user_normalizes() {
        let user = new_user().into_user(Utc::now()).unwrap();
        assert_eq!(user.email, "asha@studio.example");
        assert_eq!(user.phone.as_deref(), Some("+12345678900"));
        assert_eq!(user.role, Role::Member);
        assert!(!user.is_studio_owner());
        assert_eq!(user.first_name, "Asha");
    }

    #[test]
    fn test_blank_phone_is_dropped() {
        let mut input = new_user();
        input.phone = Some(" - ".to_owned());
        let user = input.into_user(Utc::now()).unwrap();
        assert_eq!(user.phone, None);
    }

    #[test]
    fn test_invalid_email() {
        for email in ["", "asha", "asha@", "@studio.example", "a@b", "a b@c.d", "a@b@c.d"] {
            let mut input = new_user();
            input.email = email.to_owned();
            assert!(
                matches!(
                    input.into_user(Utc::now()),
                    Err(ValidationError::InvalidEmail(_))
                ),
                "{email} must be rejected"
            );
        }
    }

    #[test]
    fn test_empty_name() {
        let mut input = new_user();
        input.last_name = "   ".to_owned();
        assert!(matches!(
            input.into_user(Utc::now()),
            Err(ValidationError::Empty("last_name"))
        ));
    }

    #[test]
    fn test_studio_owner_roles() {
        for (role, owner) in [
            (Role::Admin, true),
            (Role::Instructor, true),
            (Role::Member, false),
        ] {
            let mut input = new_user();
            input.role = Some(role);
            assert_eq!(input.into_user(Utc::now()).unwrap().is_studio_owner(), owner);
        }
    }

    #[test]
    fn test_role_strings() {
        assert_eq!(Role::Instructor.as_ref(), "instructor");
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
    }
}
