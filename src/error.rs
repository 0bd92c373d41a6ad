//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("gcp error: {0}")]
    Gcp(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("component error: {0}")]
    Component(String),
}
