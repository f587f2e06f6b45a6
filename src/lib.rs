pub mod api;
pub mod auth;
pub mod config;
pub mod err;
pub mod extract;
pub mod io;
pub mod models;
pub mod query;
pub mod serializers;
pub mod service;
pub mod store;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::Json;
use chrono::Duration;
use serde::Serialize;

pub use crate::err::{Envelope, Error};
use crate::io::MediaRoot;
use crate::store::Store;

pub type Payload<T> = Result<(StatusCode, Json<Envelope<T>>), Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    proceeds_with(StatusCode::OK, value)
}

pub fn proceeds_with<V>(status: StatusCode, value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok((status, Json(Envelope::success(value))))
}

/// Shared by every handler through an `Extension` layer.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub media: MediaRoot,
    pub session_ttl: Duration,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, media: MediaRoot, session_ttl: Duration) -> Self {
        Self {
            store,
            media,
            session_ttl,
        }
    }
}
