//! Session run loop.
//!
//! Receives commands from a presentation layer, keeps the session's time
//! range and mode, and drives the `ExecutionController` with at most one
//! request in flight.

use crate::model::{ExecMode, TimeRangeValue};
use crate::orchestrator::execution::{CompletedRequest, ExecutionController};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::debug;

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    Execute { sql: String },
    SetRange(TimeRangeValue),
    SetMode(ExecMode),
    SetEndpoint { url: String, token: Option<String> },
    Quit,
}

/// Drive `controller` until `Quit` (or the command channel closes) and the
/// in-flight request, if any, has resolved. Returns the controller so the
/// caller can inspect the final state.
pub(crate) async fn run_controller(
    mut controller: ExecutionController,
    mut range: TimeRangeValue,
    mut mode: ExecMode,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> ExecutionController {
    let mut in_flight: Option<JoinHandle<CompletedRequest>> = None;
    let mut quit_pending = false;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv(), if !quit_pending => {
                match cmd {
                    Some(UiCommand::Execute { sql }) => {
                        // The controller rejects this while Loading; the in-flight task is untouched.
                        if let Some(pending) = controller.begin(&sql, &range, mode) {
                            let backend = controller.backend();
                            in_flight = Some(tokio::spawn(async move {
                                pending.send(backend.as_ref()).await
                            }));
                        }
                    }
                    Some(UiCommand::SetRange(r)) => {
                        debug!(from = %r.from, to = %r.to, "time range changed");
                        range = r;
                    }
                    Some(UiCommand::SetMode(m)) => {
                        debug!(mode = m.as_str(), "exec mode changed");
                        mode = m;
                    }
                    Some(UiCommand::SetEndpoint { url, token }) => {
                        controller.set_endpoint(url, token);
                    }
                    Some(UiCommand::Quit) | None => {
                        // Quit waits for the current request so its result is still published.
                        quit_pending = true;
                        if in_flight.is_none() {
                            break;
                        }
                    }
                }
            }
            // The handle stays in `in_flight` until this arm completes, so a command
            // winning the race never drops the request.
            maybe_done = async {
                if let Some(h) = in_flight.as_mut() {
                    return Some(h.await);
                }
                futures::future::pending().await
            } => {
                if let Some(join_res) = maybe_done {
                    in_flight = None;
                    let completed = join_res.unwrap_or_else(|e| {
                        CompletedRequest::lost(format!("request task failed: {e}"))
                    });
                    controller.finish(completed);
                    if quit_pending {
                        break;
                    }
                }
            }
        }
    }

    controller
}
