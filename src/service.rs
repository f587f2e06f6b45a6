//! Record operations shared by every endpoint family. Handlers only decide
//! on status codes; parsing, store access and rendering happen here.

use std::collections::BTreeMap;

use chrono::{Datelike, Utc};
use uuid::Uuid;

use crate::extract::{AvatarUpload, FormData};
use crate::models::{Class, Student};
use crate::query::StudentQuery;
use crate::serializers::{
    class_view, parse_class, parse_new_class, parse_new_student, parse_student, student_view,
    student_views, ClassView, StudentView,
};
use crate::store::RecordStore;
use crate::{AppState, Error};

pub fn current_year() -> i32 {
    Utc::now().year()
}

async fn class_of(state: &AppState, student: &Student) -> Result<Option<Class>, Error> {
    match student.class_n {
        Some(id) => match state.store.get_class(id).await {
            Ok(class) => Ok(Some(class)),
            Err(Error::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        },
        None => Ok(None),
    }
}

async fn render_student(state: &AppState, student: Student) -> Result<StudentView, Error> {
    let class = class_of(state, &student).await?;
    Ok(student_view(student, class.as_ref(), current_year()))
}

/// Removes an avatar file no record points at any more.
async fn discard_avatar(state: &AppState, avatar: Option<&str>) {
    if let Some(path) = avatar {
        if let Err(err) = state.media.remove(path).await {
            log::warn!("could not remove avatar file {}: {}", path, err);
        }
    }
}

/// Second phase of a write carrying an avatar: store the file, then point the
/// record at it. A failure leaves the record as it was and removes the file.
/// On success the file it replaced is removed.
async fn attach_avatar(state: &AppState, student: Student, upload: AvatarUpload) -> Student {
    let today = Utc::now().date_naive();
    let path = match state
        .media
        .store_avatar(&upload.file_name, &upload.bytes, today)
        .await
    {
        Ok(path) => path,
        Err(err) => {
            log::warn!("avatar for student {} not stored: {}", student.id, err);
            return student;
        }
    };

    match state.store.set_student_avatar(student.id, Some(path.clone())).await {
        Ok(updated) => {
            if student.avatar.as_deref() != Some(path.as_str()) {
                discard_avatar(state, student.avatar.as_deref()).await;
            }
            updated
        }
        Err(err) => {
            log::warn!("avatar for student {} not recorded: {}", student.id, err);
            discard_avatar(state, Some(&path)).await;
            student
        }
    }
}

pub async fn list_students(
    state: &AppState,
    query: &StudentQuery,
) -> Result<Vec<StudentView>, Error> {
    let students = state.store.list_students(query).await?;
    let classes = state.store.list_classes().await?;
    Ok(student_views(students, &classes, current_year()))
}

pub async fn get_student(state: &AppState, id: i64) -> Result<StudentView, Error> {
    let student = state.store.get_student(id).await?;
    render_student(state, student).await
}

pub async fn create_student(state: &AppState, form: FormData) -> Result<StudentView, Error> {
    let new = parse_new_student(&form.fields)?;
    let mut student = state.store.create_student(new).await?;
    log::info!("student {} created", student.id);
    if let Some(upload) = form.avatar {
        student = attach_avatar(state, student, upload).await;
    }
    render_student(state, student).await
}

/// `partial` selects patch semantics; otherwise the input replaces the record.
pub async fn update_student(
    state: &AppState,
    id: i64,
    form: FormData,
    partial: bool,
) -> Result<StudentView, Error> {
    state.store.get_student(id).await?;
    let changes = parse_student(&form.fields, !partial)?;
    let mut student = state.store.update_student(id, changes, partial).await?;
    if let Some(upload) = form.avatar {
        student = attach_avatar(state, student, upload).await;
    }
    render_student(state, student).await
}

pub async fn delete_student(state: &AppState, id: i64) -> Result<(), Error> {
    let removed = state.store.delete_student(id).await?;
    log::info!("student {} deleted", id);
    discard_avatar(state, removed.avatar.as_deref()).await;
    Ok(())
}

fn group_by_class(students: Vec<Student>) -> BTreeMap<i64, Vec<Student>> {
    let mut grouped: BTreeMap<i64, Vec<Student>> = BTreeMap::new();
    for student in students {
        if let Some(class_id) = student.class_n {
            grouped.entry(class_id).or_default().push(student);
        }
    }
    grouped
}

/// Every class with every one of its students.
pub async fn classes_with_all_students(state: &AppState) -> Result<Vec<ClassView>, Error> {
    let classes = state.store.list_classes().await?;
    let mut grouped = group_by_class(state.store.list_students(&StudentQuery::all()).await?);
    let year = current_year();
    Ok(classes
        .into_iter()
        .map(|class| {
            let students = grouped.remove(&class.id).unwrap_or_default();
            class_view(class, students, year)
        })
        .collect())
}

/// Classes holding at least one student owned by `owner`, each listing only
/// that owner's students.
pub async fn classes_with_owned_students(
    state: &AppState,
    owner: Uuid,
) -> Result<Vec<ClassView>, Error> {
    let year = current_year();
    let mut views = Vec::new();
    for class in state.store.classes_for_owner(owner).await? {
        let students = state.store.students_in_class(class.id, Some(owner)).await?;
        views.push(class_view(class, students, year));
    }
    Ok(views)
}

pub async fn get_class(state: &AppState, id: i64) -> Result<ClassView, Error> {
    let class = state.store.get_class(id).await?;
    let students = state.store.students_in_class(id, None).await?;
    Ok(class_view(class, students, current_year()))
}

pub async fn create_class(state: &AppState, form: FormData) -> Result<ClassView, Error> {
    let class = state.store.create_class(parse_new_class(&form.fields)?).await?;
    log::info!("class {} created", class.id);
    Ok(class_view(class, Vec::new(), current_year()))
}

pub async fn update_class(
    state: &AppState,
    id: i64,
    form: FormData,
    partial: bool,
) -> Result<ClassView, Error> {
    state.store.get_class(id).await?;
    let changes = parse_class(&form.fields, !partial)?;
    state.store.update_class(id, changes, partial).await?;
    get_class(state, id).await
}

pub async fn delete_class(state: &AppState, id: i64) -> Result<(), Error> {
    let removed = state.store.delete_class(id).await?;
    log::info!("class {} deleted with {} students", id, removed.len());
    for student in &removed {
        discard_avatar(state, student.avatar.as_deref()).await;
    }
    Ok(())
}
