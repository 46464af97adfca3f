use thiserror::Error;

use greenworks_api::GreenworksError;

#[derive(Error, Debug)]
pub enum ApiError {
    /* mapped errors */
    #[error(transparent)]
    Greenworks(#[from] GreenworksError),

    #[error(transparent)]
    ConfigError(#[from] config::ConfigError),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    SetLoggerError(#[from] log::SetLoggerError),

    #[error(transparent)]
    JoinError(#[from] tokio::task::JoinError),

    /* bridge errors */
    #[error("Service error: {0}")]
    ServiceError(String),

    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Instance {0} needs reauthentication")]
    ReauthRequired(String),

    #[error("Instance {0} is not loaded yet")]
    NotLoaded(String),
}

impl ApiError {
    pub fn service_error(msg: impl Into<String>) -> Self {
        Self::ServiceError(msg.into())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
