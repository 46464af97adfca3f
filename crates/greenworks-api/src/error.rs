use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GreenworksError {
    /* credentials rejected by the cloud */
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /* mapped errors */
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),

    /* greenworks errors */
    #[error("GreenWorks cloud returned {status} during {action}: {body}")]
    Status {
        status: StatusCode,
        action: String,
        body: String,
    },

    #[error("Malformed device data: {0}")]
    Malformed(String),
}

impl GreenworksError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

pub type GreenworksResult<T> = Result<T, GreenworksError>;
