use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub const DEFAULT_ENDPOINT_URL: &str = "https://play-vmlogs.victoriametrics.com";

/// Token sent when the server pins the endpoint and owns its credentials.
pub const SERVER_MANAGED_TOKEN: &str = "secret";

/// Raw from/to expressions as typed. Empty means unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRangeValue {
    pub from: String,
    pub to: String,
}

impl TimeRangeValue {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    /// Only translate SQL to LogsQL
    Translate,
    /// Translate and run the query against the logs endpoint
    #[default]
    Query,
}

impl ExecMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecMode::Translate => "translate",
            ExecMode::Query => "query",
        }
    }
}

/// Where queries run. `enabled == false` means the server pins the endpoint
/// and client-side overrides are not sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointConfig {
    pub url: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub enabled: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ENDPOINT_URL.to_string(),
            token: String::new(),
            enabled: true,
        }
    }
}

impl EndpointConfig {
    pub fn is_server_managed(&self) -> bool {
        !self.enabled
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum ExecutionState {
    Idle,
    Loading,
    Succeeded {
        query: String,
        results: serde_json::Value,
        elapsed_ms: f64,
        message: String,
    },
    Failed {
        message: String,
    },
}

impl ExecutionState {
    pub fn is_loading(&self) -> bool {
        matches!(self, ExecutionState::Loading)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    StateChanged(ExecutionState),
    Info(InfoEvent),
}

/// Structured notices emitted by the controller and rendered by CLI layers.
#[derive(Debug, Clone, PartialEq)]
pub enum InfoEvent {
    Message(String),
    ConfigLoaded {
        endpoint: Option<String>,
        limit: u64,
    },
    ConfigUnavailable(String),
    AlreadyRunning,
    InvalidTime {
        field: &'static str,
        input: String,
    },
    ExecuteFailed(String),
}

impl InfoEvent {
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::ConfigLoaded {
                endpoint: Some(url),
                limit,
            } => format!("Server-managed endpoint {url} (row limit {limit})"),
            InfoEvent::ConfigLoaded {
                endpoint: None,
                limit,
            } => {
                if *limit > 0 {
                    format!("Any query will be limited to {limit} rows.")
                } else {
                    "Server config loaded".to_string()
                }
            }
            InfoEvent::ConfigUnavailable(reason) => {
                format!("Could not load server config, using defaults: {reason}")
            }
            InfoEvent::AlreadyRunning => "A query is already running".to_string(),
            InfoEvent::InvalidTime { field, input } => {
                format!("{field}: invalid date format ({input:?}), bound not sent")
            }
            InfoEvent::ExecuteFailed(message) => format!("execute error: {message}"),
        }
    }
}

/// `GET /api/v1/config`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub limit: Option<u64>,
}

/// `POST /api/v1/sql-to-logsql` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateRequest {
    pub sql: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    pub exec_mode: ExecMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TranslateResponse {
    #[serde(default)]
    pub logsql: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
