//! Wire shapes for students and classes.
//!
//! Input is read field by field from a JSON object (or the text parts of a
//! multipart form, which arrive as strings) against an explicit field list.
//! Problems are collected per field and reported together. Output views add
//! the derived `class_info` and `year_birth` fields.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::err::{Error, FieldErrors};
use crate::models::{
    msg, Class, ClassChanges, NewClass, NewStudent, Student, StudentChanges, MAX_TEXT_LEN,
};

pub type Fields = Map<String, Value>;

struct Reader<'a> {
    fields: &'a Fields,
    errors: FieldErrors,
}

impl<'a> Reader<'a> {
    fn new(fields: &'a Fields) -> Self {
        Self {
            fields,
            errors: FieldErrors::new(),
        }
    }

    fn fail<M: Into<String>>(&mut self, field: &str, message: M) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    fn text(&mut self, field: &str) -> Option<String> {
        let fields = self.fields;
        let value = match fields.get(field)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Null => {
                self.fail(field, msg::NOT_NULL);
                return None;
            }
            _ => {
                self.fail(field, msg::NOT_STRING);
                return None;
            }
        };
        if value.is_empty() {
            self.fail(field, msg::BLANK);
            None
        } else if value.chars().count() > MAX_TEXT_LEN {
            self.fail(field, msg::TOO_LONG);
            None
        } else {
            Some(value)
        }
    }

    fn integer(&mut self, field: &str) -> Option<i32> {
        let fields = self.fields;
        let parsed = match fields.get(field)? {
            Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
            Value::String(s) => s.trim().parse::<i32>().ok(),
            Value::Null => {
                self.fail(field, msg::NOT_NULL);
                return None;
            }
            _ => None,
        };
        if parsed.is_none() {
            self.fail(field, msg::NOT_INTEGER);
        }
        parsed
    }

    /// Nullable primary-key reference; `null` and `""` clear it.
    fn pk(&mut self, field: &str) -> Option<Option<i64>> {
        let fields = self.fields;
        match fields.get(field)? {
            Value::Null => Some(None),
            Value::String(s) if s.trim().is_empty() => Some(None),
            Value::Number(n) => match n.as_i64() {
                Some(id) => Some(Some(id)),
                None => {
                    self.fail(field, msg::incorrect_pk_type("float"));
                    None
                }
            },
            Value::String(s) => match s.trim().parse::<i64>() {
                Ok(id) => Some(Some(id)),
                Err(_) => {
                    self.fail(field, msg::incorrect_pk_type("str"));
                    None
                }
            },
            other => {
                self.fail(field, msg::incorrect_pk_type(python_type(other)));
                None
            }
        }
    }

    fn uuid(&mut self, field: &str) -> Option<Option<Uuid>> {
        let fields = self.fields;
        match fields.get(field)? {
            Value::Null => Some(None),
            Value::String(s) if s.trim().is_empty() => Some(None),
            Value::String(s) => match Uuid::parse_str(s.trim()) {
                Ok(id) => Some(Some(id)),
                Err(_) => {
                    self.fail(field, msg::NOT_UUID);
                    None
                }
            },
            _ => {
                self.fail(field, msg::NOT_UUID);
                None
            }
        }
    }

    fn require<T>(&mut self, field: &str, value: &Option<T>, required: bool) {
        if required && value.is_none() && !self.fields.contains_key(field) {
            self.fail(field, msg::REQUIRED);
        }
    }

    fn finish<T>(self, value: T) -> Result<T, Error> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(Error::Validation(self.errors))
        }
    }
}

fn python_type(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "bool",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
        Value::String(_) => "str",
        Value::Number(_) => "int",
        Value::Null => "NoneType",
    }
}

/// Reads the writable student fields. With `complete` set, the required
/// fields must all be present (creation and full replacement).
pub fn parse_student(fields: &Fields, complete: bool) -> Result<StudentChanges, Error> {
    let mut reader = Reader::new(fields);
    let changes = StudentChanges {
        first_name: reader.text("first_name"),
        last_name: reader.text("last_name"),
        age: reader.integer("age"),
        class_n: reader.pk("class_n"),
        owner_user: reader.uuid("owner_user"),
    };
    reader.require("first_name", &changes.first_name, complete);
    reader.require("last_name", &changes.last_name, complete);
    reader.require("age", &changes.age, complete);
    if let Some(age) = changes.age {
        if age <= 0 {
            reader.fail("age", msg::AGE_NOT_POSITIVE);
        }
    }
    reader.finish(changes)
}

pub fn parse_new_student(fields: &Fields) -> Result<NewStudent, Error> {
    let changes = parse_student(fields, true)?;
    match (changes.first_name, changes.last_name, changes.age) {
        (Some(first_name), Some(last_name), Some(age)) => Ok(NewStudent {
            first_name,
            last_name,
            age,
            class_n: changes.class_n.flatten(),
            owner_user: changes.owner_user.flatten(),
        }),
        _ => Err(Error::invalid_payload("incomplete student")),
    }
}

pub fn parse_class(fields: &Fields, complete: bool) -> Result<ClassChanges, Error> {
    let mut reader = Reader::new(fields);
    let changes = ClassChanges {
        name: reader.text("name"),
    };
    reader.require("name", &changes.name, complete);
    reader.finish(changes)
}

pub fn parse_new_class(fields: &Fields) -> Result<NewClass, Error> {
    match parse_class(fields, true)?.name {
        Some(name) => Ok(NewClass { name }),
        None => Err(Error::field("name", msg::REQUIRED)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassInfo {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentView {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub age: i32,
    pub created_at: DateTime<Utc>,
    pub avatar: Option<String>,
    pub class_n: Option<i64>,
    pub owner_user: Option<Uuid>,
    pub class_info: Option<ClassInfo>,
    /// `year - age`, recomputed on every render.
    pub year_birth: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassView {
    pub id: i64,
    pub name: String,
    pub student: Vec<StudentView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserClassInfo {
    pub user_class_info: Vec<ClassView>,
}

/// `class` is the class referenced by `student.class_n`, if any.
pub fn student_view(student: Student, class: Option<&Class>, year: i32) -> StudentView {
    let class_info = class
        .filter(|class| student.class_n == Some(class.id))
        .map(|class| ClassInfo {
            id: class.id,
            name: class.name.clone(),
        });
    StudentView {
        year_birth: year - student.age,
        id: student.id,
        first_name: student.first_name,
        last_name: student.last_name,
        age: student.age,
        created_at: student.created_at,
        avatar: student.avatar,
        class_n: student.class_n,
        owner_user: student.owner_user,
        class_info,
    }
}

/// Renders a list of students, looking their classes up in `classes`.
pub fn student_views(students: Vec<Student>, classes: &[Class], year: i32) -> Vec<StudentView> {
    students
        .into_iter()
        .map(|student| {
            let class = student
                .class_n
                .and_then(|id| classes.iter().find(|class| class.id == id));
            student_view(student, class, year)
        })
        .collect()
}

pub fn class_view(class: Class, students: Vec<Student>, year: i32) -> ClassView {
    let student = students
        .into_iter()
        .map(|s| student_view(s, Some(&class), year))
        .collect();
    ClassView {
        id: class.id,
        name: class.name,
        student,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {}", other),
        }
    }

    fn field_errors(err: Error) -> FieldErrors {
        match err {
            Error::Validation(errors) => errors,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn creation_needs_required_fields() {
        let input = fields(json!({"first_name": "Kaio"}));
        let errors = field_errors(parse_new_student(&input).unwrap_err());
        assert_eq!(errors["last_name"], vec![msg::REQUIRED.to_string()]);
        assert_eq!(errors["age"], vec![msg::REQUIRED.to_string()]);
        assert!(!errors.contains_key("first_name"));
    }

    #[test]
    fn creation_rejects_non_positive_age() {
        let input = fields(json!({"first_name": "Kaio", "last_name": "S", "age": -1}));
        let errors = field_errors(parse_new_student(&input).unwrap_err());
        assert_eq!(errors["age"], vec![msg::AGE_NOT_POSITIVE.to_string()]);
    }

    #[test]
    fn creation_accepts_form_strings() {
        let input = fields(json!({
            "first_name": " Kaio ",
            "last_name": "Silva",
            "age": "25",
            "class_n": "3",
            "owner_user": "",
            "id": 99,
            "created_at": "2001-01-01T00:00:00Z",
        }));
        let student = parse_new_student(&input).unwrap();
        assert_eq!(
            student,
            NewStudent {
                first_name: "Kaio".to_string(),
                last_name: "Silva".to_string(),
                age: 25,
                class_n: Some(3),
                owner_user: None,
            }
        );
    }

    #[test]
    fn wrong_types_are_reported_per_field() {
        let input = fields(json!({
            "first_name": ["x"],
            "last_name": "",
            "age": "twenty",
            "class_n": true,
            "owner_user": "not-a-uuid",
        }));
        let errors = field_errors(parse_student(&input, false).unwrap_err());
        assert_eq!(errors["first_name"], vec![msg::NOT_STRING.to_string()]);
        assert_eq!(errors["last_name"], vec![msg::BLANK.to_string()]);
        assert_eq!(errors["age"], vec![msg::NOT_INTEGER.to_string()]);
        assert_eq!(errors["class_n"], vec![msg::incorrect_pk_type("bool")]);
        assert_eq!(errors["owner_user"], vec![msg::NOT_UUID.to_string()]);
    }

    #[test]
    fn partial_input_distinguishes_null_from_absent() {
        let changes = parse_student(&fields(json!({"class_n": null})), false).unwrap();
        assert_eq!(changes.class_n, Some(None));
        assert_eq!(changes.owner_user, None);
        assert_eq!(changes.first_name, None);
    }

    #[test]
    fn null_for_required_text_is_not_allowed() {
        let input = fields(json!({"first_name": null}));
        let errors = field_errors(parse_student(&input, false).unwrap_err());
        assert_eq!(errors["first_name"], vec![msg::NOT_NULL.to_string()]);
    }

    #[test]
    fn long_names_are_rejected() {
        let long = "a".repeat(MAX_TEXT_LEN + 1);
        let errors = field_errors(parse_class(&fields(json!({ "name": long })), true).unwrap_err());
        assert_eq!(errors["name"], vec![msg::TOO_LONG.to_string()]);
    }

    fn stored(age: i32, class_n: Option<i64>) -> Student {
        Student {
            id: 1,
            first_name: "Kaio".to_string(),
            last_name: "Silva".to_string(),
            age,
            created_at: Utc::now(),
            avatar: None,
            class_n,
            owner_user: None,
        }
    }

    #[test]
    fn view_derives_year_of_birth_and_class_info() {
        let math = Class {
            id: 4,
            name: "Math".to_string(),
        };
        let view = student_view(stored(25, Some(4)), Some(&math), 2024);
        assert_eq!(view.year_birth, 1999);
        assert_eq!(
            view.class_info,
            Some(ClassInfo {
                id: 4,
                name: "Math".to_string()
            })
        );

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["class_info"], json!({"id": 4, "name": "Math"}));
        assert_eq!(json["year_birth"], json!(1999));
    }

    #[test]
    fn unassigned_student_has_null_class_info() {
        let views = student_views(vec![stored(20, None)], &[], 2024);
        assert_eq!(views[0].class_info, None);
        let json = serde_json::to_value(&views[0]).unwrap();
        assert_eq!(json["class_info"], Value::Null);
    }

    #[test]
    fn class_view_nests_full_student_shape() {
        let math = Class {
            id: 4,
            name: "Math".to_string(),
        };
        let view = class_view(math, vec![stored(30, Some(4))], 2024);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["name"], json!("Math"));
        assert_eq!(json["student"][0]["year_birth"], json!(1994));
        assert_eq!(json["student"][0]["class_info"]["id"], json!(4));
    }
}
