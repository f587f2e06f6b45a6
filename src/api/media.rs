use axum::extract::Path;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::Extension;

use crate::auth::Caller;
use crate::{AppState, Error};

fn content_type(file: &str) -> &'static str {
    let ext = file.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

pub async fn avatar(
    Extension(state): Extension<AppState>,
    _caller: Caller,
    Path(file): Path<String>,
) -> Result<impl IntoResponse, Error> {
    let bytes = state.media.read_avatar(&file).await?;
    Ok(([(CONTENT_TYPE, content_type(&file))], bytes))
}

#[cfg(test)]
mod tests {
    use super::content_type;

    #[test]
    fn guesses_image_types() {
        assert_eq!(content_type("me_05_03_2024.PNG"), "image/png");
        assert_eq!(content_type("me_05_03_2024.jpeg"), "image/jpeg");
        assert_eq!(content_type("me_05_03_2024"), "application/octet-stream");
    }
}
