//! Turns the optional list parameters of the filtered student listing into a
//! [`StudentQuery`]: a conjunctive filter plus an ordering key.
//!
//! Parsing is tolerant. Bad or incomplete optional parameters drop the
//! constraint they belong to instead of failing the request.

use std::num::IntErrorKind;

use serde::Deserialize;

use crate::models::Student;

/// Raw query-string parameters. Kept as strings so that malformed numbers
/// never reject the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudentParams {
    pub first_name: Option<String>,
    pub min_age: Option<String>,
    pub max_age: Option<String>,
    pub ordering: Option<String>,
}

/// Inclusive age bounds. Wider than the stored age so that any integer the
/// caller sends is honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeRange {
    pub min: i64,
    pub max: i64,
}

impl AgeRange {
    pub fn contains(&self, age: i32) -> bool {
        let age = i64::from(age);
        self.min <= age && age <= self.max
    }
}

/// An integer bound; integers beyond `i64` saturate instead of failing.
fn parse_bound(raw: &str) -> Option<i64> {
    match raw.trim().parse::<i64>() {
        Ok(bound) => Some(bound),
        Err(err) => match err.kind() {
            IntErrorKind::PosOverflow => Some(i64::MAX),
            IntErrorKind::NegOverflow => Some(i64::MIN),
            _ => None,
        },
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentFilter {
    /// Case-insensitive substring of `first_name`.
    pub first_name: Option<String>,
    pub age: Option<AgeRange>,
}

impl StudentFilter {
    pub fn matches(&self, student: &Student) -> bool {
        let name_ok = match &self.first_name {
            Some(needle) => student
                .first_name
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            None => true,
        };
        let age_ok = match &self.age {
            Some(range) => range.contains(student.age),
            None => true,
        };
        name_ok && age_ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Insertion order, used by the raw listings.
    Id,
    CreatedAt,
    CreatedAtDesc,
}

impl SortKey {
    /// Accepts `created_at` and `-created_at`; anything else is ascending `created_at`.
    pub fn from_ordering(ordering: Option<&str>) -> SortKey {
        match ordering {
            Some("-created_at") => SortKey::CreatedAtDesc,
            _ => SortKey::CreatedAt,
        }
    }

    /// Ties on `created_at` are broken by id in the same direction.
    pub fn sql(&self) -> &'static str {
        match self {
            SortKey::Id => " ORDER BY id ASC",
            SortKey::CreatedAt => " ORDER BY created_at ASC, id ASC",
            SortKey::CreatedAtDesc => " ORDER BY created_at DESC, id DESC",
        }
    }

    pub fn sort(&self, students: &mut [Student]) {
        match self {
            SortKey::Id => students.sort_by_key(|s| s.id),
            SortKey::CreatedAt => students.sort_by_key(|s| (s.created_at, s.id)),
            SortKey::CreatedAtDesc => {
                students.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentQuery {
    pub filter: StudentFilter,
    pub order: SortKey,
}

impl StudentQuery {
    /// Every student, by id.
    pub fn all() -> StudentQuery {
        StudentQuery {
            filter: StudentFilter::default(),
            order: SortKey::Id,
        }
    }

    pub fn from_params(params: &StudentParams) -> StudentQuery {
        let first_name = params
            .first_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        let age = match (non_empty(&params.min_age), non_empty(&params.max_age)) {
            (Some(min), Some(max)) => match (parse_bound(min), parse_bound(max)) {
                (Some(min), Some(max)) => Some(AgeRange { min, max }),
                _ => {
                    log::debug!("ignoring unparseable age range {:?}..{:?}", min, max);
                    None
                }
            },
            _ => None,
        };

        StudentQuery {
            filter: StudentFilter { first_name, age },
            order: SortKey::from_ordering(params.ordering.as_deref()),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
