use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AccountStore, RecordStore};
use crate::err::{Error, FieldErrors};
use crate::models::{
    msg, Class, ClassChanges, NewClass, NewStudent, Student, StudentChanges, UserData,
    UserSession,
};
use crate::query::StudentQuery;

#[derive(Default)]
struct Tables {
    classes: BTreeMap<i64, Class>,
    students: BTreeMap<i64, Student>,
    users: HashMap<Uuid, UserData>,
    sessions: HashMap<String, UserSession>,
    last_class_id: i64,
    last_student_id: i64,
}

impl Tables {
    fn check_references(&self, class_n: Option<i64>, owner: Option<Uuid>) -> Result<(), Error> {
        let mut errors = FieldErrors::new();
        if let Some(class_id) = class_n {
            if !self.classes.contains_key(&class_id) {
                errors.insert("class_n".to_string(), vec![msg::invalid_pk(class_id)]);
            }
        }
        if let Some(owner) = owner {
            if !self.users.contains_key(&owner) {
                errors.insert("owner_user".to_string(), vec![msg::invalid_pk(owner)]);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(errors))
        }
    }
}

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create_student(&self, student: NewStudent) -> Result<Student, Error> {
        student.validate()?;
        let mut tables = self.tables.write().await;
        tables.check_references(student.class_n, student.owner_user)?;

        tables.last_student_id += 1;
        let created = Student {
            id: tables.last_student_id,
            first_name: student.first_name,
            last_name: student.last_name,
            age: student.age,
            created_at: Utc::now(),
            avatar: None,
            class_n: student.class_n,
            owner_user: student.owner_user,
        };
        tables.students.insert(created.id, created.clone());
        log::debug!("created student {}", created.id);
        Ok(created)
    }

    async fn get_student(&self, id: i64) -> Result<Student, Error> {
        let tables = self.tables.read().await;
        tables
            .students
            .get(&id)
            .cloned()
            .ok_or_else(Error::item_not_found)
    }

    async fn update_student(
        &self,
        id: i64,
        changes: StudentChanges,
        partial: bool,
    ) -> Result<Student, Error> {
        let mut tables = self.tables.write().await;
        let current = tables
            .students
            .get(&id)
            .cloned()
            .ok_or_else(Error::item_not_found)?;
        let updated = changes.apply(current, partial)?;
        tables.check_references(updated.class_n, updated.owner_user)?;
        tables.students.insert(id, updated.clone());
        log::debug!("updated student {}", id);
        Ok(updated)
    }

    async fn set_student_avatar(
        &self,
        id: i64,
        avatar: Option<String>,
    ) -> Result<Student, Error> {
        let mut tables = self.tables.write().await;
        let student = tables
            .students
            .get_mut(&id)
            .ok_or_else(Error::item_not_found)?;
        student.avatar = avatar;
        Ok(student.clone())
    }

    async fn delete_student(&self, id: i64) -> Result<Student, Error> {
        let mut tables = self.tables.write().await;
        let removed = tables
            .students
            .remove(&id)
            .ok_or_else(Error::item_not_found)?;
        log::debug!("deleted student {}", id);
        Ok(removed)
    }

    async fn list_students(&self, query: &StudentQuery) -> Result<Vec<Student>, Error> {
        let tables = self.tables.read().await;
        let mut students: Vec<Student> = tables
            .students
            .values()
            .filter(|student| query.filter.matches(student))
            .cloned()
            .collect();
        query.order.sort(&mut students);
        Ok(students)
    }

    async fn students_in_class(
        &self,
        class_id: i64,
        owner: Option<Uuid>,
    ) -> Result<Vec<Student>, Error> {
        let tables = self.tables.read().await;
        Ok(tables
            .students
            .values()
            .filter(|s| s.class_n == Some(class_id))
            .filter(|s| owner.is_none() || s.owner_user == owner)
            .cloned()
            .collect())
    }

    async fn create_class(&self, class: NewClass) -> Result<Class, Error> {
        let mut tables = self.tables.write().await;
        tables.last_class_id += 1;
        let created = Class {
            id: tables.last_class_id,
            name: class.name,
        };
        tables.classes.insert(created.id, created.clone());
        log::debug!("created class {}", created.id);
        Ok(created)
    }

    async fn get_class(&self, id: i64) -> Result<Class, Error> {
        let tables = self.tables.read().await;
        tables
            .classes
            .get(&id)
            .cloned()
            .ok_or_else(Error::item_not_found)
    }

    async fn update_class(
        &self,
        id: i64,
        changes: ClassChanges,
        partial: bool,
    ) -> Result<Class, Error> {
        let mut tables = self.tables.write().await;
        let current = tables
            .classes
            .get(&id)
            .cloned()
            .ok_or_else(Error::item_not_found)?;
        let updated = changes.apply(current, partial)?;
        tables.classes.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete_class(&self, id: i64) -> Result<Vec<Student>, Error> {
        let mut tables = self.tables.write().await;
        if tables.classes.remove(&id).is_none() {
            return Err(Error::item_not_found());
        }
        let enrolled: Vec<i64> = tables
            .students
            .values()
            .filter(|s| s.class_n == Some(id))
            .map(|s| s.id)
            .collect();
        let removed: Vec<Student> = enrolled
            .iter()
            .filter_map(|student_id| tables.students.remove(student_id))
            .collect();
        log::debug!("deleted class {} and {} of its students", id, removed.len());
        Ok(removed)
    }

    async fn list_classes(&self) -> Result<Vec<Class>, Error> {
        let tables = self.tables.read().await;
        Ok(tables.classes.values().cloned().collect())
    }

    async fn classes_for_owner(&self, owner: Uuid) -> Result<Vec<Class>, Error> {
        let tables = self.tables.read().await;
        Ok(tables
            .classes
            .values()
            .filter(|class| {
                tables
                    .students
                    .values()
                    .any(|s| s.class_n == Some(class.id) && s.owner_user == Some(owner))
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_user(&self, user: UserData) -> Result<UserData, Error> {
        let mut tables = self.tables.write().await;
        let mut errors = FieldErrors::new();
        if tables.users.values().any(|u| u.username == user.username) {
            errors.insert(
                "username".to_string(),
                vec!["A user with that username already exists.".to_string()],
            );
        }
        if tables.users.values().any(|u| u.email == user.email) {
            errors.insert(
                "email".to_string(),
                vec!["A user with that email already exists.".to_string()],
            );
        }
        if !errors.is_empty() {
            return Err(Error::Validation(errors));
        }
        tables.users.insert(user.uuid, user.clone());
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserData>, Error> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_session(&self, ssid: &str) -> Result<Option<UserSession>, Error> {
        let tables = self.tables.read().await;
        Ok(tables.sessions.get(ssid).cloned())
    }

    async fn find_session_for(&self, user: Uuid) -> Result<Option<UserSession>, Error> {
        let tables = self.tables.read().await;
        Ok(tables
            .sessions
            .values()
            .find(|s| s.belongs_to == user)
            .cloned())
    }

    async fn create_session(&self, session: UserSession) -> Result<(), Error> {
        let mut tables = self.tables.write().await;
        tables.sessions.insert(session.ssid.clone(), session);
        Ok(())
    }

    async fn drop_session(&self, ssid: &str) -> Result<bool, Error> {
        let mut tables = self.tables.write().await;
        Ok(tables.sessions.remove(ssid).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{SortKey, StudentFilter};

    fn new_student(first_name: &str, age: i32, class_n: Option<i64>) -> NewStudent {
        NewStudent {
            first_name: first_name.to_string(),
            last_name: "Doe".to_string(),
            age,
            class_n,
            owner_user: None,
        }
    }

    fn user(name: &str) -> UserData {
        UserData {
            uuid: Uuid::new_v4(),
            username: name.to_string(),
            email: format!("{}@example.com", name),
            password_hash: String::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn ids_are_assigned_in_order() {
        let store = MemoryStore::new();
        let a = store.create_student(new_student("A", 20, None)).await.unwrap();
        let b = store.create_student(new_student("B", 20, None)).await.unwrap();
        assert!(a.id < b.id);
        assert_eq!(store.get_student(b.id).await.unwrap(), b);
    }

    #[tokio::test]
    async fn rejects_non_positive_age_without_storing() {
        let store = MemoryStore::new();
        let err = store.create_student(new_student("A", 0, None)).await.unwrap_err();
        assert_eq!(err, Error::field("age", msg::AGE_NOT_POSITIVE));
        assert!(store.list_students(&StudentQuery::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_unknown_class_reference() {
        let store = MemoryStore::new();
        let err = store
            .create_student(new_student("A", 20, Some(42)))
            .await
            .unwrap_err();
        assert_eq!(err, Error::field("class_n", msg::invalid_pk(42)));
    }

    #[tokio::test]
    async fn failed_update_leaves_record_unchanged() {
        let store = MemoryStore::new();
        let created = store.create_student(new_student("A", 20, None)).await.unwrap();
        let changes = StudentChanges {
            age: Some(-3),
            ..Default::default()
        };
        assert!(store.update_student(created.id, changes, true).await.is_err());
        assert_eq!(store.get_student(created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn deleting_class_cascades_to_its_students_only() {
        let store = MemoryStore::new();
        let math = store
            .create_class(NewClass {
                name: "Math".to_string(),
            })
            .await
            .unwrap();
        let art = store
            .create_class(NewClass {
                name: "Art".to_string(),
            })
            .await
            .unwrap();
        let in_math = store
            .create_student(new_student("A", 20, Some(math.id)))
            .await
            .unwrap();
        let in_art = store
            .create_student(new_student("B", 20, Some(art.id)))
            .await
            .unwrap();
        let unassigned = store.create_student(new_student("C", 20, None)).await.unwrap();

        let removed = store.delete_class(math.id).await.unwrap();
        assert_eq!(removed, vec![in_math.clone()]);

        assert_eq!(
            store.get_student(in_math.id).await.unwrap_err(),
            Error::item_not_found()
        );
        assert!(store.get_student(in_art.id).await.is_ok());
        assert!(store.get_student(unassigned.id).await.is_ok());
    }

    #[tokio::test]
    async fn deleting_student_keeps_class() {
        let store = MemoryStore::new();
        let math = store
            .create_class(NewClass {
                name: "Math".to_string(),
            })
            .await
            .unwrap();
        let student = store
            .create_student(new_student("A", 20, Some(math.id)))
            .await
            .unwrap();
        assert_eq!(store.delete_student(student.id).await.unwrap(), student);
        assert_eq!(store.get_class(math.id).await.unwrap(), math);
        assert_eq!(
            store.delete_student(student.id).await.unwrap_err(),
            Error::item_not_found()
        );
    }

    #[tokio::test]
    async fn list_applies_filter_and_order() {
        let store = MemoryStore::new();
        for (name, age) in [("John", 17), ("joana", 22), ("Ana", 22), ("MAJOR", 40)] {
            store.create_student(new_student(name, age, None)).await.unwrap();
        }
        let query = StudentQuery {
            filter: StudentFilter {
                first_name: Some("jo".to_string()),
                age: Some(crate::query::AgeRange { min: 18, max: 40 }),
            },
            order: SortKey::CreatedAtDesc,
        };
        let names: Vec<String> = store
            .list_students(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.first_name)
            .collect();
        assert_eq!(names, vec!["MAJOR".to_string(), "joana".to_string()]);
    }

    #[tokio::test]
    async fn classes_for_owner_are_distinct() {
        let store = MemoryStore::new();
        let owner = store.create_user(user("u1")).await.unwrap();
        let math = store
            .create_class(NewClass {
                name: "Math".to_string(),
            })
            .await
            .unwrap();
        store
            .create_class(NewClass {
                name: "Art".to_string(),
            })
            .await
            .unwrap();
        for name in ["A", "B"] {
            let mut student = new_student(name, 20, Some(math.id));
            student.owner_user = Some(owner.uuid);
            store.create_student(student).await.unwrap();
        }
        store
            .create_student(new_student("C", 20, Some(math.id)))
            .await
            .unwrap();

        assert_eq!(store.classes_for_owner(owner.uuid).await.unwrap(), vec![math.clone()]);
        assert_eq!(
            store
                .students_in_class(math.id, Some(owner.uuid))
                .await
                .unwrap()
                .len(),
            2
        );
        assert_eq!(store.students_in_class(math.id, None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn duplicate_usernames_are_rejected() {
        let store = MemoryStore::new();
        store.create_user(user("kaio")).await.unwrap();
        match store.create_user(user("kaio")).await.unwrap_err() {
            Error::Validation(fields) => assert!(fields.contains_key("username")),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
