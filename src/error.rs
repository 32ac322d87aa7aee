use axum::{
    http::{Error as HttpError, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::browse::BrowseError;
use crate::chroot::PathGuardError;
use crate::player::PlayerError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),

    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    #[error("Player error: {0}")]
    Player(#[from] PlayerError),
}

impl From<PathGuardError> for AppError {
    fn from(err: PathGuardError) -> Self {
        match err {
            PathGuardError::Escape { .. } => AppError::Forbidden,
            PathGuardError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                AppError::NotFound
            }
            PathGuardError::Io { source, .. } => AppError::Io(source),
        }
    }
}

impl From<BrowseError> for AppError {
    fn from(err: BrowseError) -> Self {
        match err {
            BrowseError::Path(e) => e.into(),
            BrowseError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                AppError::NotFound
            }
            BrowseError::Io { source, .. } => AppError::Io(source),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::Player(PlayerError::UnknownKind(_)) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            AppError::Internal(_) | AppError::Io(_) | AppError::Http(_) | AppError::Player(_) => {
                tracing::error!("Request failed: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };

        (status, message).into_response()
    }
}
