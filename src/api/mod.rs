//! HTTP surface. Several route families reach the same record operations and
//! differ only in paths and success status codes.

use axum::handler::Handler;
use axum::middleware;
use axum::routing::{delete, get, patch, post, put};
use axum::{Extension, Router};

use crate::auth::{login_user, logout_user, register_user};
use crate::config::normalize_prefix;
use crate::err::{envelope_method_not_allowed, handler404};
use crate::AppState;

pub mod classes;
pub mod media;
pub mod students;

/// Body of successful deletions.
pub const DELETED: &str = "Item Deleted";

pub fn router(state: AppState, prefix: &str) -> Router {
    let prefix = normalize_prefix(prefix);
    let at = |path: &str| format!("{}{}", prefix, path);

    Router::new()
        // function-style endpoints
        .route(
            &at("/students"),
            get(students::list_all).post(students::create_created),
        )
        .route(
            &at("/students/:id"),
            get(students::retrieve)
                .put(students::replace)
                .patch(students::partial_update)
                .delete(students::destroy_no_content),
        )
        // viewset under `st`
        .route(
            &at("/st/"),
            get(students::list_filtered).post(students::create_created),
        )
        .route(
            &at("/st/:id/"),
            get(students::retrieve)
                .put(students::replace)
                .patch(students::partial_update)
                .delete(students::destroy_no_content),
        )
        .route(&at("/st/:id/custom_get_id/"), get(students::retrieve))
        .route(
            &at("/st/:id/custom_patch_id/"),
            patch(students::partial_update),
        )
        .route(
            &at("/st/:id/custom_put_id/"),
            put(students::partial_update),
        )
        .route(
            &at("/st/:id/custom_delete_id/"),
            delete(students::destroy),
        )
        // single-purpose endpoints
        .route(&at("/get-api/"), get(students::list_all))
        .route(&at("/get-api/:id"), get(students::retrieve))
        .route(&at("/create-api/"), post(students::create))
        .route(&at("/put-api/:id"), put(students::partial_update))
        .route(&at("/patch-api/:id"), patch(students::partial_update))
        .route(&at("/delete-api/:id"), delete(students::destroy))
        .route(&at("/get-all-student/"), get(students::list_all))
        .route(&at("/get-all-class/"), get(classes::list_with_students))
        .route(&at("/get-all-class-by-user/"), get(classes::list_for_caller))
        // classes
        .route(
            &at("/classes"),
            get(classes::list_with_students).post(classes::create),
        )
        .route(
            &at("/classes/:id"),
            get(classes::retrieve)
                .put(classes::replace)
                .patch(classes::partial_update)
                .delete(classes::destroy),
        )
        .route(&at("/media/avatar/:file"), get(media::avatar))
        .route(&at("/auth/register"), post(register_user))
        .route(&at("/auth/login"), post(login_user))
        .route(&at("/auth/logout"), post(logout_user))
        .fallback(handler404.into_service())
        .layer(middleware::from_fn(envelope_method_not_allowed))
        .layer(Extension(state))
}
