//! Record and account persistence.
//!
//! Two backends implement the same traits: [`PgStore`] on top of Postgres
//! and [`MemoryStore`] for tests and database-less runs. Both enforce the
//! student invariants (positive age, existing class and owner references)
//! and cascade class deletion to the class's students.

use async_trait::async_trait;
use uuid::Uuid;

use crate::err::Error;
use crate::models::{
    Class, ClassChanges, NewClass, NewStudent, Student, StudentChanges, UserData, UserSession,
};
use crate::query::StudentQuery;

mod memory;
mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create_student(&self, student: NewStudent) -> Result<Student, Error>;

    /// Fails with [`Error::NotFound`] when `id` is unknown.
    async fn get_student(&self, id: i64) -> Result<Student, Error>;

    async fn update_student(
        &self,
        id: i64,
        changes: StudentChanges,
        partial: bool,
    ) -> Result<Student, Error>;

    /// Sets or clears the stored avatar path.
    async fn set_student_avatar(&self, id: i64, avatar: Option<String>)
        -> Result<Student, Error>;

    /// Returns the removed row.
    async fn delete_student(&self, id: i64) -> Result<Student, Error>;

    async fn list_students(&self, query: &StudentQuery) -> Result<Vec<Student>, Error>;

    /// Students of a class by id, optionally only those owned by `owner`.
    async fn students_in_class(
        &self,
        class_id: i64,
        owner: Option<Uuid>,
    ) -> Result<Vec<Student>, Error>;

    async fn create_class(&self, class: NewClass) -> Result<Class, Error>;

    async fn get_class(&self, id: i64) -> Result<Class, Error>;

    async fn update_class(
        &self,
        id: i64,
        changes: ClassChanges,
        partial: bool,
    ) -> Result<Class, Error>;

    /// Removes the class together with every student referencing it and
    /// returns those students.
    async fn delete_class(&self, id: i64) -> Result<Vec<Student>, Error>;

    async fn list_classes(&self) -> Result<Vec<Class>, Error>;

    /// Distinct classes holding at least one student owned by `owner`, by id.
    async fn classes_for_owner(&self, owner: Uuid) -> Result<Vec<Class>, Error>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fails with a validation error on a taken username or email.
    async fn create_user(&self, user: UserData) -> Result<UserData, Error>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserData>, Error>;

    async fn find_session(&self, ssid: &str) -> Result<Option<UserSession>, Error>;

    async fn find_session_for(&self, user: Uuid) -> Result<Option<UserSession>, Error>;

    async fn create_session(&self, session: UserSession) -> Result<(), Error>;

    /// Returns whether a session was removed.
    async fn drop_session(&self, ssid: &str) -> Result<bool, Error>;
}

pub trait Store: RecordStore + AccountStore {}

impl<T: RecordStore + AccountStore> Store for T {}
