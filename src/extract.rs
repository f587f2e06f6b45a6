use std::collections::HashMap;

use axum::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::{Form, FromRequest, Multipart, Path, RequestParts};
use axum::http::header::CONTENT_TYPE;
use serde_json::Value;

use crate::err::Error;
use crate::serializers::Fields;

/// A file part named `avatar` of a multipart body.
#[derive(Debug, Clone)]
pub struct AvatarUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Write-request body: a JSON object, an urlencoded form, or a multipart
/// form whose `avatar` file part is split off from the text fields.
#[derive(Debug, Clone, Default)]
pub struct FormData {
    pub fields: Fields,
    pub avatar: Option<AvatarUpload>,
}

fn content_type(req: &RequestParts<Body>) -> String {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

async fn read_multipart(mut multipart: Multipart) -> Result<FormData, Error> {
    let mut form = FormData::default();
    while let Some(field) = multipart.next_field().await? {
        let name = match field.name() {
            Some(name) => name.to_string(),
            None => continue,
        };
        let file_name = field.file_name().map(str::to_string);
        match file_name {
            Some(file_name) if name == "avatar" => {
                let bytes = field.bytes().await?;
                if !file_name.is_empty() {
                    form.avatar = Some(AvatarUpload {
                        file_name,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            Some(_) => {
                log::debug!("ignoring unexpected file part {:?}", name);
            }
            None => {
                let text = field.text().await?;
                form.fields.insert(name, Value::String(text));
            }
        }
    }
    Ok(form)
}

#[async_trait]
impl FromRequest<Body> for FormData {
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<Body>) -> Result<Self, Self::Rejection> {
        let content_type = content_type(req);

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req)
                .await
                .map_err(|err| Error::invalid_payload(err.to_string()))?;
            return read_multipart(multipart).await;
        }

        if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(pairs) = Form::<HashMap<String, String>>::from_request(req)
                .await
                .map_err(|err| Error::invalid_payload(err.to_string()))?;
            let fields = pairs
                .into_iter()
                .map(|(key, value)| (key, Value::String(value)))
                .collect();
            return Ok(FormData {
                fields,
                avatar: None,
            });
        }

        let body = Bytes::from_request(req)
            .await
            .map_err(|err| Error::invalid_payload(err.to_string()))?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(FormData::default());
        }
        match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(fields)) => Ok(FormData {
                fields,
                avatar: None,
            }),
            Ok(other) => Err(Error::invalid_payload(format!(
                "Invalid data. Expected a dictionary, but got {}.",
                match other {
                    Value::Array(_) => "list",
                    Value::String(_) => "str",
                    Value::Number(_) => "int",
                    Value::Bool(_) => "bool",
                    _ => "NoneType",
                }
            ))),
            Err(err) => Err(Error::invalid_payload(format!("JSON parse error - {}", err))),
        }
    }
}

/// Integer id from the path. A segment that is not an integer is answered
/// like an unknown id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordId(pub i64);

#[async_trait]
impl<B: Send> FromRequest<B> for RecordId {
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request(req)
            .await
            .map_err(|_| Error::item_not_found())?;
        raw.parse().map(RecordId).map_err(|_| Error::item_not_found())
    }
}
