use axum::extract::Query;
use axum::http::StatusCode;
use axum::Extension;

use super::DELETED;
use crate::auth::Caller;
use crate::extract::{FormData, RecordId};
use crate::query::{StudentParams, StudentQuery};
use crate::serializers::StudentView;
use crate::{proceeds, proceeds_with, service, AppState, Payload};

/// Every student by id, no filtering.
pub async fn list_all(
    Extension(state): Extension<AppState>,
    _caller: Caller,
) -> Payload<Vec<StudentView>> {
    proceeds(service::list_students(&state, &StudentQuery::all()).await?)
}

/// `first_name`, `min_age`/`max_age` and `ordering` applied.
pub async fn list_filtered(
    Extension(state): Extension<AppState>,
    _caller: Caller,
    Query(params): Query<StudentParams>,
) -> Payload<Vec<StudentView>> {
    let query = StudentQuery::from_params(&params);
    log::debug!("filtered student listing {:?}", query);
    proceeds(service::list_students(&state, &query).await?)
}

pub async fn create(
    Extension(state): Extension<AppState>,
    _caller: Caller,
    form: FormData,
) -> Payload<StudentView> {
    proceeds(service::create_student(&state, form).await?)
}

pub async fn create_created(
    Extension(state): Extension<AppState>,
    _caller: Caller,
    form: FormData,
) -> Payload<StudentView> {
    proceeds_with(
        StatusCode::CREATED,
        service::create_student(&state, form).await?,
    )
}

pub async fn retrieve(
    Extension(state): Extension<AppState>,
    _caller: Caller,
    RecordId(id): RecordId,
) -> Payload<StudentView> {
    proceeds(service::get_student(&state, id).await?)
}

pub async fn replace(
    Extension(state): Extension<AppState>,
    _caller: Caller,
    RecordId(id): RecordId,
    form: FormData,
) -> Payload<StudentView> {
    proceeds(service::update_student(&state, id, form, false).await?)
}

/// Only the supplied fields change, also on the PUT-only custom routes.
pub async fn partial_update(
    Extension(state): Extension<AppState>,
    _caller: Caller,
    RecordId(id): RecordId,
    form: FormData,
) -> Payload<StudentView> {
    proceeds(service::update_student(&state, id, form, true).await?)
}

pub async fn destroy(
    Extension(state): Extension<AppState>,
    _caller: Caller,
    RecordId(id): RecordId,
) -> Payload<&'static str> {
    service::delete_student(&state, id).await?;
    proceeds(DELETED)
}

pub async fn destroy_no_content(
    Extension(state): Extension<AppState>,
    _caller: Caller,
    RecordId(id): RecordId,
) -> Payload<&'static str> {
    service::delete_student(&state, id).await?;
    proceeds_with(StatusCode::NO_CONTENT, DELETED)
}
