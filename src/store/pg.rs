use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use super::{AccountStore, RecordStore};
use crate::err::{Error, FieldErrors};
use crate::models::{
    msg, Class, ClassChanges, NewClass, NewStudent, Student, StudentChanges, UserData,
    UserSession,
};
use crate::query::StudentQuery;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects and brings the schema up to date.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self::new(pool))
    }
}

async fn check_references(
    tx: &mut Transaction<'_, Postgres>,
    class_n: Option<i64>,
    owner: Option<Uuid>,
) -> Result<(), Error> {
    let mut errors = FieldErrors::new();
    if let Some(class_id) = class_n {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM classes WHERE id = $1)",
        )
        .bind(class_id)
        .fetch_one(&mut *tx)
        .await?;
        if !exists {
            errors.insert("class_n".to_string(), vec![msg::invalid_pk(class_id)]);
        }
    }
    if let Some(owner) = owner {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE uuid = $1)")
                .bind(owner)
                .fetch_one(&mut *tx)
                .await?;
        if !exists {
            errors.insert("owner_user".to_string(), vec![msg::invalid_pk(owner)]);
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation(errors))
    }
}

/// Escapes `LIKE` metacharacters so the needle matches literally.
fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl RecordStore for PgStore {
    async fn create_student(&self, student: NewStudent) -> Result<Student, Error> {
        student.validate()?;
        let mut tx = self.pool.begin().await?;
        check_references(&mut tx, student.class_n, student.owner_user).await?;

        let created = sqlx::query_as::<_, Student>(
            "INSERT INTO students (first_name, last_name, age, class_n, owner_user) \
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(&student.first_name)
        .bind(&student.last_name)
        .bind(student.age)
        .bind(student.class_n)
        .bind(student.owner_user)
        .fetch_one(&mut tx)
        .await?;
        tx.commit().await?;

        log::debug!("created student {}", created.id);
        Ok(created)
    }

    async fn get_student(&self, id: i64) -> Result<Student, Error> {
        sqlx::query_as::<_, Student>("SELECT * FROM students WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(Error::item_not_found)
    }

    async fn update_student(
        &self,
        id: i64,
        changes: StudentChanges,
        partial: bool,
    ) -> Result<Student, Error> {
        let mut tx = self.pool.begin().await?;
        let current =
            sqlx::query_as::<_, Student>("SELECT * FROM students WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut tx)
                .await?
                .ok_or_else(Error::item_not_found)?;
        let updated = changes.apply(current, partial)?;
        check_references(&mut tx, updated.class_n, updated.owner_user).await?;

        let stored = sqlx::query_as::<_, Student>(
            "UPDATE students SET first_name = $2, last_name = $3, age = $4, class_n = $5, \
             owner_user = $6 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&updated.first_name)
        .bind(&updated.last_name)
        .bind(updated.age)
        .bind(updated.class_n)
        .bind(updated.owner_user)
        .fetch_one(&mut tx)
        .await?;
        tx.commit().await?;

        log::debug!("updated student {}", id);
        Ok(stored)
    }

    async fn set_student_avatar(
        &self,
        id: i64,
        avatar: Option<String>,
    ) -> Result<Student, Error> {
        sqlx::query_as::<_, Student>("UPDATE students SET avatar = $2 WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(avatar)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(Error::item_not_found)
    }

    async fn delete_student(&self, id: i64) -> Result<Student, Error> {
        let removed =
            sqlx::query_as::<_, Student>("DELETE FROM students WHERE id = $1 RETURNING *")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(Error::item_not_found)?;
        log::debug!("deleted student {}", id);
        Ok(removed)
    }

    async fn list_students(&self, query: &StudentQuery) -> Result<Vec<Student>, Error> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT * FROM students");
        let mut joiner = " WHERE ";
        if let Some(needle) = &query.filter.first_name {
            builder
                .push(joiner)
                .push("first_name ILIKE ")
                .push_bind(format!("%{}%", escape_like(needle)));
            joiner = " AND ";
        }
        if let Some(range) = query.filter.age {
            builder
                .push(joiner)
                .push("age BETWEEN ")
                .push_bind(range.min)
                .push(" AND ")
                .push_bind(range.max);
        }
        builder.push(query.order.sql());

        Ok(builder
            .build_query_as::<Student>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn students_in_class(
        &self,
        class_id: i64,
        owner: Option<Uuid>,
    ) -> Result<Vec<Student>, Error> {
        Ok(sqlx::query_as::<_, Student>(
            "SELECT * FROM students WHERE class_n = $1 \
             AND ($2::uuid IS NULL OR owner_user = $2) ORDER BY id",
        )
        .bind(class_id)
        .bind(owner)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create_class(&self, class: NewClass) -> Result<Class, Error> {
        let created =
            sqlx::query_as::<_, Class>("INSERT INTO classes (name) VALUES ($1) RETURNING *")
                .bind(&class.name)
                .fetch_one(&self.pool)
                .await?;
        log::debug!("created class {}", created.id);
        Ok(created)
    }

    async fn get_class(&self, id: i64) -> Result<Class, Error> {
        sqlx::query_as::<_, Class>("SELECT * FROM classes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(Error::item_not_found)
    }

    async fn update_class(
        &self,
        id: i64,
        changes: ClassChanges,
        partial: bool,
    ) -> Result<Class, Error> {
        let mut tx = self.pool.begin().await?;
        let current = sqlx::query_as::<_, Class>("SELECT * FROM classes WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut tx)
            .await?
            .ok_or_else(Error::item_not_found)?;
        let updated = changes.apply(current, partial)?;
        let stored =
            sqlx::query_as::<_, Class>("UPDATE classes SET name = $2 WHERE id = $1 RETURNING *")
                .bind(id)
                .bind(&updated.name)
                .fetch_one(&mut tx)
                .await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn delete_class(&self, id: i64) -> Result<Vec<Student>, Error> {
        let mut tx = self.pool.begin().await?;
        // removed here rather than through ON DELETE CASCADE so the rows come back
        let removed = sqlx::query_as::<_, Student>(
            "DELETE FROM students WHERE class_n = $1 RETURNING *",
        )
        .bind(id)
        .fetch_all(&mut tx)
        .await?;
        let res = sqlx::query("DELETE FROM classes WHERE id = $1")
            .bind(id)
            .execute(&mut tx)
            .await?;
        if res.rows_affected() < 1 {
            return Err(Error::item_not_found());
        }
        tx.commit().await?;

        log::debug!("deleted class {} and {} of its students", id, removed.len());
        Ok(removed)
    }

    async fn list_classes(&self) -> Result<Vec<Class>, Error> {
        Ok(
            sqlx::query_as::<_, Class>("SELECT * FROM classes ORDER BY id")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn classes_for_owner(&self, owner: Uuid) -> Result<Vec<Class>, Error> {
        Ok(sqlx::query_as::<_, Class>(
            "SELECT c.* FROM classes c WHERE EXISTS \
             (SELECT 1 FROM students s WHERE s.class_n = c.id AND s.owner_user = $1) \
             ORDER BY c.id",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?)
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn create_user(&self, user: UserData) -> Result<UserData, Error> {
        let taken = sqlx::query_as::<_, UserData>(
            "SELECT * FROM users WHERE username = $2 OR email = $1",
        )
        .bind(&user.email)
        .bind(&user.username)
        .fetch_all(&self.pool)
        .await?;

        let mut errors = FieldErrors::new();
        if taken.iter().any(|u| u.username == user.username) {
            errors.insert(
                "username".to_string(),
                vec!["A user with that username already exists.".to_string()],
            );
        }
        if taken.iter().any(|u| u.email == user.email) {
            errors.insert(
                "email".to_string(),
                vec!["A user with that email already exists.".to_string()],
            );
        }
        if !errors.is_empty() {
            return Err(Error::Validation(errors));
        }

        sqlx::query(
            "INSERT INTO users (uuid, username, email, password_hash, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(user.uuid)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserData>, Error> {
        Ok(
            sqlx::query_as::<_, UserData>("SELECT * FROM users WHERE username = $1 LIMIT 1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_session(&self, ssid: &str) -> Result<Option<UserSession>, Error> {
        Ok(sqlx::query_as::<_, UserSession>(
            "SELECT * FROM user_sessions WHERE ssid = $1 LIMIT 1",
        )
        .bind(ssid)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_session_for(&self, user: Uuid) -> Result<Option<UserSession>, Error> {
        Ok(sqlx::query_as::<_, UserSession>(
            "SELECT * FROM user_sessions WHERE belongs_to = $1 LIMIT 1",
        )
        .bind(user)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn create_session(&self, session: UserSession) -> Result<(), Error> {
        let res = sqlx::query("INSERT INTO user_sessions VALUES($1, $2, $3)")
            .bind(&session.ssid)
            .bind(session.expires_at)
            .bind(session.belongs_to)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() < 1 {
            return Err(Error::InternalError {
                kind: "DatabaseError",
                message: "Could not update session ids!".to_string(),
            });
        }
        Ok(())
    }

    async fn drop_session(&self, ssid: &str) -> Result<bool, Error> {
        let affected = sqlx::query("DELETE FROM user_sessions WHERE ssid = $1")
            .bind(ssid)
            .execute(&self.pool)
            .await?;
        Ok(affected.rows_affected() >= 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{StudentParams, StudentQuery};

    #[test]
    fn like_metacharacters_are_escaped() {
        assert_eq!(escape_like("jo"), "jo");
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[tokio::test]
    #[ignore = "needs a Postgres database in DATABASE_URL"]
    async fn filtered_listing_against_postgres() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let store = PgStore::connect(&url, 2).await.unwrap();
        let marker = Uuid::new_v4().simple().to_string();
        let created = store
            .create_student(NewStudent {
                first_name: format!("JO{}", marker),
                last_name: "Doe".to_string(),
                age: 21,
                class_n: None,
                owner_user: None,
            })
            .await
            .unwrap();

        let query = StudentQuery::from_params(&StudentParams {
            first_name: Some(format!("jo{}", marker)),
            min_age: Some("20".to_string()),
            max_age: Some("22".to_string()),
            ordering: Some("-created_at".to_string()),
        });
        let found = store.list_students(&query).await.unwrap();
        assert_eq!(found, vec![created.clone()]);

        store.delete_student(created.id).await.unwrap();
    }
}
