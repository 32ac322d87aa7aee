use crate::{
    error::AppError,
    player::{status::PlaybackStatus, PlayRequest, TargetKind},
    state::AppState,
    web::compress::{accepts_gzip, gunzip, gzip},
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Browse query as sent by the client: `{"p": [kind, segments...], "a": offset}`
#[derive(Debug, Deserialize)]
struct BrowseQuery {
    #[serde(default)]
    p: Vec<String>,
    #[serde(default)]
    a: usize,
}

pub async fn status_handler(State(state): State<AppState>) -> Json<PlaybackStatus> {
    Json(state.supervisor.status())
}

pub async fn browse_handler(
    State(state): State<AppState>,
    Path(query): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let payload = match state.cache.get(&query) {
        Some(payload) => {
            debug!("Browse cache hit: {}", query);
            payload
        }
        None => {
            let args: BrowseQuery = serde_json::from_str(&query)
                .map_err(|e| AppError::BadRequest(format!("invalid browse query: {}", e)))?;
            let mut segments = args.p;
            if segments.is_empty() {
                return Ok(html_response(Body::empty(), false));
            }
            let kind: TargetKind = segments.remove(0).parse()?;
            let offset = args.a;

            // Listing touches the filesystem: keep it off the async workers
            // and outside the cache lock.
            let browser = Arc::clone(&state.browser);
            let page = tokio::task::spawn_blocking(move || browser.render(kind, &segments, offset))
                .await
                .map_err(anyhow::Error::from)??;

            let payload = gzip(page.as_bytes()).await?;
            state.cache.set(query, payload.clone());
            payload
        }
    };

    if accepts_gzip(&headers) {
        Ok(html_response(Body::from(payload), true))
    } else {
        let page = gunzip(&payload).await?;
        Ok(html_response(Body::from(page), false))
    }
}

fn html_response(body: Body, gzipped: bool) -> Response {
    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        body,
    )
        .into_response();
    if gzipped {
        response.headers_mut().insert(
            header::CONTENT_ENCODING,
            header::HeaderValue::from_static("gzip"),
        );
    }
    response
}

pub async fn play_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<&'static str, AppError> {
    let request = parse_play_path(&path)?;
    debug!("Play request: {:?}", request);
    state.supervisor.play_detached(request);
    Ok("ok")
}

pub async fn pause_handler(State(state): State<AppState>) -> Result<&'static str, AppError> {
    state.supervisor.pause().await?;
    Ok("ok")
}

pub async fn show_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    let (kind, tail) = path
        .split_once('/')
        .ok_or_else(|| AppError::BadRequest("missing file path".to_string()))?;
    if kind.parse::<TargetKind>()? != TargetKind::File {
        return Err(AppError::NotFound);
    }

    let segments: Vec<&str> = tail.split('/').filter(|s| !s.is_empty()).collect();
    let full_path = state.guard.resolve(&segments)?;
    if !full_path.is_file() {
        return Err(AppError::NotFound);
    }

    let file = File::open(&full_path).await?;
    let size = file.metadata().await?.len();
    let body = Body::from_stream(ReaderStream::with_capacity(file, 64 * 1024));

    Ok(Response::builder()
        .header(header::CONTENT_TYPE, mime_for_path(&full_path))
        .header(header::CONTENT_LENGTH, size)
        .status(StatusCode::OK)
        .body(body)?)
}

/// Split `/play/<kind>/<tail>` into a request.
///
/// For files the last segment of `tail` holds the names joined with `+`;
/// the segments before it are the folder. For streams the whole tail is
/// the `+`-joined list of locations.
pub fn parse_play_path(path: &str) -> Result<PlayRequest, AppError> {
    let (kind, tail) = path
        .split_once('/')
        .ok_or_else(|| AppError::BadRequest("missing play target".to_string()))?;
    let kind: TargetKind = kind.parse()?;

    let (folder, names) = match kind {
        TargetKind::File => {
            let mut segments: Vec<&str> = tail.split('/').collect();
            let names = segments.pop().unwrap_or_default();
            let folder = segments
                .into_iter()
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            (folder, names)
        }
        TargetKind::Http => (Vec::new(), tail),
    };

    let names: Vec<String> = names
        .split('+')
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect();
    if names.is_empty() {
        return Err(AppError::BadRequest("nothing to play".to_string()));
    }

    Ok(PlayRequest {
        kind,
        names,
        folder,
    })
}

fn mime_for_path(path: &std::path::Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        "mp3" => "audio/mpeg",
        "ogg" | "oga" => "audio/ogg",
        "flac" => "audio/flac",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "txt" | "nfo" | "cue" | "log" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_play_path() {
        let request = parse_play_path("file/rock/album/01.mp3+02.mp3").unwrap();
        assert_eq!(request.kind, TargetKind::File);
        assert_eq!(request.folder, vec!["rock", "album"]);
        assert_eq!(request.names, vec!["01.mp3", "02.mp3"]);

        let request = parse_play_path("file/top.mp3").unwrap();
        assert!(request.folder.is_empty());
        assert_eq!(request.names, vec!["top.mp3"]);
    }

    #[test]
    fn test_parse_stream_play_path() {
        let request = parse_play_path("http/radio.example:8000/live+other.example/x").unwrap();
        assert_eq!(request.kind, TargetKind::Http);
        assert!(request.folder.is_empty());
        assert_eq!(request.names, vec!["radio.example:8000/live", "other.example/x"]);
    }

    #[test]
    fn test_parse_play_path_errors() {
        assert!(matches!(parse_play_path("file"), Err(AppError::BadRequest(_))));
        assert!(matches!(parse_play_path("file/album/"), Err(AppError::BadRequest(_))));
        assert!(matches!(parse_play_path("ftp/x"), Err(AppError::Player(_))));
    }

    #[test]
    fn test_mime_for_path() {
        assert_eq!(mime_for_path(std::path::Path::new("a/Cover.JPG")), "image/jpeg");
        assert_eq!(mime_for_path(std::path::Path::new("a/b")), "application/octet-stream");
    }
}
