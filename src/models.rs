use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::err::{Error, FieldErrors};

/// Messages reported in field-level validation errors.
pub mod msg {
    pub const REQUIRED: &str = "This field is required.";
    pub const NOT_NULL: &str = "This field may not be null.";
    pub const NOT_STRING: &str = "Not a valid string.";
    pub const BLANK: &str = "This field may not be blank.";
    pub const TOO_LONG: &str = "Ensure this field has no more than 250 characters.";
    pub const NOT_INTEGER: &str = "A valid integer is required.";
    pub const AGE_NOT_POSITIVE: &str = "Age must be greater than 0.";
    pub const NOT_UUID: &str = "Must be a valid UUID.";

    pub fn invalid_pk<D: std::fmt::Display>(pk: D) -> String {
        format!("Invalid pk \"{}\" - object does not exist.", pk)
    }

    pub fn incorrect_pk_type(received: &str) -> String {
        format!("Incorrect type. Expected pk value, received {}.", received)
    }
}

pub const MAX_TEXT_LEN: usize = 250;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Class {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Student {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub age: i32,
    pub created_at: DateTime<Utc>,
    pub avatar: Option<String>,
    pub class_n: Option<i64>,
    pub owner_user: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStudent {
    pub first_name: String,
    pub last_name: String,
    pub age: i32,
    pub class_n: Option<i64>,
    pub owner_user: Option<Uuid>,
}

/// Supplied student fields. The outer `Option` of nullable fields tells
/// "not supplied" apart from an explicit null.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub age: Option<i32>,
    pub class_n: Option<Option<i64>>,
    pub owner_user: Option<Option<Uuid>>,
}

pub fn check_age(age: i32) -> Result<(), Error> {
    if age <= 0 {
        return Err(Error::field("age", msg::AGE_NOT_POSITIVE));
    }
    Ok(())
}

impl NewStudent {
    pub fn validate(&self) -> Result<(), Error> {
        check_age(self.age)
    }
}

impl StudentChanges {
    /// Produces the post-update state of `current`. Without `partial` every
    /// required field must be present and omitted nullable fields are cleared.
    /// `id`, `created_at` and `avatar` are never touched here.
    pub fn apply(self, current: Student, partial: bool) -> Result<Student, Error> {
        if !partial {
            let mut missing = FieldErrors::new();
            for (name, present) in [
                ("first_name", self.first_name.is_some()),
                ("last_name", self.last_name.is_some()),
                ("age", self.age.is_some()),
            ] {
                if !present {
                    missing.insert(name.to_string(), vec![msg::REQUIRED.to_string()]);
                }
            }
            if !missing.is_empty() {
                return Err(Error::Validation(missing));
            }
        }

        let updated = Student {
            first_name: self.first_name.unwrap_or(current.first_name),
            last_name: self.last_name.unwrap_or(current.last_name),
            age: self.age.unwrap_or(current.age),
            class_n: match self.class_n {
                Some(class_n) => class_n,
                None if partial => current.class_n,
                None => None,
            },
            owner_user: match self.owner_user {
                Some(owner) => owner,
                None if partial => current.owner_user,
                None => None,
            },
            ..current
        };
        check_age(updated.age)?;
        Ok(updated)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewClass {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassChanges {
    pub name: Option<String>,
}

impl ClassChanges {
    pub fn apply(self, current: Class, partial: bool) -> Result<Class, Error> {
        match self.name {
            Some(name) => Ok(Class { name, ..current }),
            None if partial => Ok(current),
            None => Err(Error::field("name", msg::REQUIRED)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserData {
    pub uuid: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserSession {
    pub ssid: String,
    pub belongs_to: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kaio() -> Student {
        Student {
            id: 7,
            first_name: "Kaio".to_string(),
            last_name: "Silva".to_string(),
            age: 25,
            created_at: Utc::now(),
            avatar: Some("avatar/kaio_01_02_2024.png".to_string()),
            class_n: Some(3),
            owner_user: Some(Uuid::new_v4()),
        }
    }

    #[test]
    fn partial_changes_keep_untouched_fields() {
        let current = kaio();
        let updated = StudentChanges {
            age: Some(26),
            ..Default::default()
        }
        .apply(current.clone(), true)
        .unwrap();

        assert_eq!(updated.age, 26);
        assert_eq!(updated.first_name, current.first_name);
        assert_eq!(updated.class_n, current.class_n);
        assert_eq!(updated.owner_user, current.owner_user);
        assert_eq!(updated.created_at, current.created_at);
    }

    #[test]
    fn partial_null_clears_class() {
        let updated = StudentChanges {
            class_n: Some(None),
            ..Default::default()
        }
        .apply(kaio(), true)
        .unwrap();
        assert_eq!(updated.class_n, None);
    }

    #[test]
    fn full_replace_requires_required_fields() {
        let err = StudentChanges {
            first_name: Some("Ana".to_string()),
            ..Default::default()
        }
        .apply(kaio(), false)
        .unwrap_err();

        match err {
            Error::Validation(fields) => {
                assert!(fields.contains_key("last_name"));
                assert!(fields.contains_key("age"));
                assert!(!fields.contains_key("first_name"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn full_replace_clears_omitted_nullable_fields_but_keeps_avatar() {
        let current = kaio();
        let updated = StudentChanges {
            first_name: Some("Ana".to_string()),
            last_name: Some("Lima".to_string()),
            age: Some(19),
            ..Default::default()
        }
        .apply(current.clone(), false)
        .unwrap();

        assert_eq!(updated.class_n, None);
        assert_eq!(updated.owner_user, None);
        assert_eq!(updated.avatar, current.avatar);
        assert_eq!(updated.id, current.id);
    }

    #[test]
    fn non_positive_age_is_rejected() {
        for age in [0, -1] {
            let err = StudentChanges {
                age: Some(age),
                ..Default::default()
            }
            .apply(kaio(), true)
            .unwrap_err();
            assert_eq!(err, Error::field("age", msg::AGE_NOT_POSITIVE));
        }
    }

    #[test]
    fn class_full_replace_requires_name() {
        let class = Class {
            id: 1,
            name: "Math".to_string(),
        };
        assert!(ClassChanges::default().apply(class.clone(), false).is_err());
        assert_eq!(ClassChanges::default().apply(class.clone(), true).unwrap(), class);
    }
}
