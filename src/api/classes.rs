use axum::http::StatusCode;
use axum::Extension;

use super::DELETED;
use crate::auth::Caller;
use crate::extract::{FormData, RecordId};
use crate::serializers::{ClassView, UserClassInfo};
use crate::{proceeds, proceeds_with, service, AppState, Payload};

pub async fn list_with_students(
    Extension(state): Extension<AppState>,
    _caller: Caller,
) -> Payload<Vec<ClassView>> {
    proceeds(service::classes_with_all_students(&state).await?)
}

/// Classes the caller owns students in, listing only those students.
pub async fn list_for_caller(
    Extension(state): Extension<AppState>,
    caller: Caller,
) -> Payload<UserClassInfo> {
    let user_class_info = service::classes_with_owned_students(&state, caller.user_id).await?;
    proceeds(UserClassInfo { user_class_info })
}

pub async fn create(
    Extension(state): Extension<AppState>,
    _caller: Caller,
    form: FormData,
) -> Payload<ClassView> {
    proceeds_with(StatusCode::CREATED, service::create_class(&state, form).await?)
}

pub async fn retrieve(
    Extension(state): Extension<AppState>,
    _caller: Caller,
    RecordId(id): RecordId,
) -> Payload<ClassView> {
    proceeds(service::get_class(&state, id).await?)
}

pub async fn replace(
    Extension(state): Extension<AppState>,
    _caller: Caller,
    RecordId(id): RecordId,
    form: FormData,
) -> Payload<ClassView> {
    proceeds(service::update_class(&state, id, form, false).await?)
}

pub async fn partial_update(
    Extension(state): Extension<AppState>,
    _caller: Caller,
    RecordId(id): RecordId,
    form: FormData,
) -> Payload<ClassView> {
    proceeds(service::update_class(&state, id, form, true).await?)
}

pub async fn destroy(
    Extension(state): Extension<AppState>,
    _caller: Caller,
    RecordId(id): RecordId,
) -> Payload<&'static str> {
    service::delete_class(&state, id).await?;
    proceeds_with(StatusCode::NO_CONTENT, DELETED)
}
