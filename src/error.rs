use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Protocol desync: {0}")]
    Desync(String),
    #[error("Checksum mismatch: {0}")]
    Checksum(String),
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("Resource is read only: {0}")]
    ReadOnly(String),
    #[error("Resource is write only: {0}")]
    WriteOnly(String),
    #[error("Writing complex types not supported: {0}")]
    ComplexWrite(String),
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ReadOnly(_) | AppError::WriteOnly(_) | AppError::ComplexWrite(_) => {
                StatusCode::METHOD_NOT_ALLOWED
            }
            AppError::InvalidValue(_) => StatusCode::BAD_REQUEST,
            AppError::Transport(_) | AppError::Desync(_) | AppError::Checksum(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}
