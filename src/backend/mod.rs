//! HTTP boundary to the sql-to-logsql service.
//!
//! The controller only talks to [`Backend`]; [`HttpBackend`] is the reqwest
//! implementation used by the binary.

mod http;

pub use http::HttpBackend;

use crate::model::{ServerConfig, TranslateRequest, TranslateResponse};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    /// Non-200 response; `message` is the server's `error` text when it sent one.
    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("invalid response body: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            BackendError::Decode(e.to_string())
        } else {
            BackendError::Transport(e.to_string())
        }
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// `GET /api/v1/config`
    async fn fetch_config(&self) -> Result<ServerConfig, BackendError>;

    /// `POST /api/v1/sql-to-logsql`, authorized with `bearer_token`.
    async fn sql_to_logsql(
        &self,
        request: &TranslateRequest,
        bearer_token: &str,
    ) -> Result<TranslateResponse, BackendError>;
}
