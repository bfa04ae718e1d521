//! Single-flight execution state machine.
//!
//! `Idle -> Loading -> {Succeeded | Failed}`; the next execute starts over.
//! State only changes through `bootstrap`, `begin` and `finish`, and every
//! change is published as a `ControllerEvent::StateChanged`.

use crate::backend::{Backend, BackendError};
use crate::model::{
    ControllerEvent, EndpointConfig, ExecMode, ExecutionState, InfoEvent, ServerConfig,
    TimeRangeValue, TranslateRequest, TranslateResponse, SERVER_MANAGED_TOKEN,
};
use crate::timerange::{epoch_millis, TimeExpressionParser};
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Source of "now" for relative time expressions.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A request that passed the single-flight guard and is ready to send.
#[derive(Debug)]
pub struct PendingRequest {
    pub body: TranslateRequest,
    pub bearer_token: String,
    started: Instant,
}

impl PendingRequest {
    pub async fn send(self, backend: &dyn Backend) -> CompletedRequest {
        let outcome = backend.sql_to_logsql(&self.body, &self.bearer_token).await;
        CompletedRequest {
            outcome,
            elapsed: self.started.elapsed(),
        }
    }
}

#[derive(Debug)]
pub struct CompletedRequest {
    pub(crate) outcome: Result<TranslateResponse, BackendError>,
    pub(crate) elapsed: Duration,
}

impl CompletedRequest {
    /// A request that never produced a response, e.g. its task died.
    pub fn lost(reason: impl Into<String>) -> Self {
        Self {
            outcome: Err(BackendError::Transport(reason.into())),
            elapsed: Duration::ZERO,
        }
    }
}

pub struct ExecutionController {
    state: ExecutionState,
    endpoint: EndpointConfig,
    limit: u64,
    parser: TimeExpressionParser,
    clock: Arc<dyn Clock>,
    backend: Arc<dyn Backend>,
    event_tx: UnboundedSender<ControllerEvent>,
}

impl ExecutionController {
    pub fn new(backend: Arc<dyn Backend>, event_tx: UnboundedSender<ControllerEvent>) -> Self {
        Self {
            state: ExecutionState::Idle,
            endpoint: EndpointConfig::default(),
            limit: 0,
            parser: TimeExpressionParser::default(),
            clock: Arc::new(SystemClock),
            backend,
            event_tx,
        }
    }

    pub fn with_endpoint(mut self, endpoint: EndpointConfig) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_parser(mut self, parser: TimeExpressionParser) -> Self {
        self.parser = parser;
        self
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }

    /// Row limit reported by the server, 0 when unknown or unlimited.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn parser(&self) -> &TimeExpressionParser {
        &self.parser
    }

    pub fn backend(&self) -> Arc<dyn Backend> {
        self.backend.clone()
    }

    /// Point queries at another logs endpoint. Ignored while the server
    /// manages the endpoint; returns whether the change was applied.
    pub fn set_endpoint(&mut self, url: String, token: Option<String>) -> bool {
        if self.endpoint.is_server_managed() {
            warn!(url = %url, "endpoint is managed by the server, ignoring override");
            self.emit_info(InfoEvent::Message(
                "Endpoint is managed by the server and cannot be changed".into(),
            ));
            return false;
        }
        self.endpoint.url = url;
        if let Some(token) = token {
            self.endpoint.token = token;
        }
        true
    }

    /// Load server-side configuration once per session.
    ///
    /// Best effort: on failure the current endpoint settings are kept.
    /// Refused while a request is in flight.
    pub async fn bootstrap(&mut self) {
        if self.state.is_loading() {
            debug!("bootstrap ignored, request already in flight");
            self.emit_info(InfoEvent::AlreadyRunning);
            return;
        }
        self.set_state(ExecutionState::Loading);
        match self.backend.fetch_config().await {
            Ok(cfg) => self.apply_server_config(cfg),
            Err(e) => {
                warn!(error = %e, "failed to fetch server config");
                self.emit_info(InfoEvent::ConfigUnavailable(e.to_string()));
            }
        }
        self.set_state(ExecutionState::Idle);
    }

    fn apply_server_config(&mut self, cfg: ServerConfig) {
        let endpoint = cfg.endpoint.filter(|url| !url.is_empty());
        if let Some(url) = endpoint.as_ref() {
            info!(endpoint = %url, "server enforces a fixed endpoint");
            self.endpoint = EndpointConfig {
                url: url.clone(),
                token: SERVER_MANAGED_TOKEN.to_string(),
                enabled: false,
            };
        }
        self.limit = cfg.limit.unwrap_or(0);
        self.emit_info(InfoEvent::ConfigLoaded {
            endpoint,
            limit: self.limit,
        });
    }

    /// Run one query end to end. A no-op while another request is in flight.
    pub async fn execute(
        &mut self,
        sql: &str,
        range: &TimeRangeValue,
        mode: ExecMode,
    ) -> &ExecutionState {
        if let Some(pending) = self.begin(sql, range, mode) {
            let backend = self.backend.clone();
            let completed = pending.send(backend.as_ref()).await;
            self.finish(completed);
        }
        &self.state
    }

    /// Guard, resolve the range against the current clock and move to `Loading`.
    ///
    /// Returns `None` without side effects on the in-flight request when one
    /// is already outstanding.
    pub fn begin(
        &mut self,
        sql: &str,
        range: &TimeRangeValue,
        mode: ExecMode,
    ) -> Option<PendingRequest> {
        if self.state.is_loading() {
            debug!("execute ignored, request already in flight");
            self.emit_info(InfoEvent::AlreadyRunning);
            return None;
        }

        let now = self.clock.now();
        let start = self.resolve_bound("from", &range.from, now);
        let end = self.resolve_bound("to", &range.to, now);
        let (endpoint, bearer_token) = if self.endpoint.enabled {
            (
                Some(self.endpoint.url.clone()),
                Some(self.endpoint.token.clone()),
            )
        } else {
            (None, None)
        };
        let body = TranslateRequest {
            sql: sql.to_string(),
            start,
            end,
            exec_mode: mode,
            endpoint,
            bearer_token,
        };
        debug!(mode = mode.as_str(), start = ?body.start, end = ?body.end, "executing query");

        self.set_state(ExecutionState::Loading);
        Some(PendingRequest {
            body,
            bearer_token: self.endpoint.token.clone(),
            started: Instant::now(),
        })
    }

    /// Apply the response of the in-flight request.
    pub fn finish(&mut self, completed: CompletedRequest) {
        let CompletedRequest { outcome, elapsed } = completed;
        let next = match outcome {
            Ok(resp) => {
                let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
                let took = format_elapsed(elapsed_ms);
                info!(elapsed = %took, "query succeeded");
                let message = if took.is_empty() {
                    "successful execution".to_string()
                } else {
                    format!("successful execution in {took}")
                };
                ExecutionState::Succeeded {
                    query: resp.logsql,
                    results: resp.data,
                    elapsed_ms,
                    message,
                }
            }
            Err(e) => {
                let message = e.to_string();
                warn!(error = %message, "query failed");
                self.emit_info(InfoEvent::ExecuteFailed(message.clone()));
                ExecutionState::Failed { message }
            }
        };
        self.set_state(next);
    }

    fn resolve_bound(&self, field: &'static str, expr: &str, now: OffsetDateTime) -> Option<String> {
        if expr.trim().is_empty() {
            return None;
        }
        match self.parser.parse(expr, now) {
            Ok(instant) => Some(epoch_millis(instant).to_string()),
            Err(e) => {
                warn!(field, input = %e.input, "{e}, bound not sent");
                self.emit_info(InfoEvent::InvalidTime {
                    field,
                    input: e.input,
                });
                None
            }
        }
    }

    fn set_state(&mut self, state: ExecutionState) {
        self.state = state;
        let _ = self
            .event_tx
            .send(ControllerEvent::StateChanged(self.state.clone()));
    }

    fn emit_info(&self, info: InfoEvent) {
        let _ = self.event_tx.send(ControllerEvent::Info(info));
    }
}

/// Human-readable duration for the success message.
pub fn format_elapsed(ms: f64) -> String {
    if !ms.is_finite() || ms < 0.0 {
        return String::new();
    }
    if ms < 1000.0 {
        return format!("{} ms", ms.round() as u64);
    }
    let seconds = ms / 1000.0;
    if seconds >= 10.0 {
        format!("{seconds:.1} s")
    } else {
        format!("{seconds:.2} s")
    }
}
