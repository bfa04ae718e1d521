//! Interactive line-oriented session.
//!
//! Stdin lines are either SQL (executed with the current range and mode) or
//! `:`-prefixed commands. Controller events are rendered by a separate task,
//! so a new line can arrive while a query is still running.

use crate::cli::{quick_range_lines, spawn_output_writer, Cli, OutputLine};
use crate::model::{ControllerEvent, ExecMode, ExecutionState, TimeRangeValue};
use crate::orchestrator::{run_controller, ExecutionController, UiCommand};
use crate::text_summary::build_text_summary;
use crate::timerange::{caption, quick_ranges, TimeExpressionParser};
use anyhow::Result;
use clap::ValueEnum;
use time::OffsetDateTime;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

const HELP: &[&str] = &[
    "Type SQL on one line to execute it. Commands:",
    "  :from <expr>            set the range start (empty to unset)",
    "  :to <expr>              set the range end (empty to unset)",
    "  :range <label>          use a quick range, e.g. ':range Last 24 hours'",
    "  :ranges                 list quick ranges",
    "  :mode translate|query   switch execution mode",
    "  :endpoint <url> [token] query another VictoriaLogs endpoint",
    "  :help                   show this help",
    "  :quit                   leave once the running query finishes",
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionLine {
    Empty,
    Sql(String),
    From(String),
    To(String),
    Range(String),
    ListRanges,
    Mode(ExecMode),
    Endpoint { url: String, token: Option<String> },
    Help,
    Quit,
}

fn parse_line(line: &str) -> Result<SessionLine, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(SessionLine::Empty);
    }
    let Some(command) = line.strip_prefix(':') else {
        return Ok(SessionLine::Sql(line.to_string()));
    };
    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };
    match name {
        "from" => Ok(SessionLine::From(rest.to_string())),
        "to" => Ok(SessionLine::To(rest.to_string())),
        "range" if !rest.is_empty() => Ok(SessionLine::Range(rest.to_string())),
        "ranges" => Ok(SessionLine::ListRanges),
        "mode" => ExecMode::from_str(rest, true)
            .map(SessionLine::Mode)
            .map_err(|_| format!("unknown mode {rest:?}, use translate or query")),
        "endpoint" => {
            let mut parts = rest.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(url), token) => Ok(SessionLine::Endpoint {
                    url: url.to_string(),
                    token: token.map(String::from),
                }),
                (None, _) => Err("usage: :endpoint <url> [token]".to_string()),
            }
        }
        "help" | "h" => Ok(SessionLine::Help),
        "quit" | "q" | "exit" => Ok(SessionLine::Quit),
        _ => Err(format!("unknown command :{name}, try :help")),
    }
}

/// Caption plus an inline error for each side that does not parse.
fn describe_range(parser: &TimeExpressionParser, range: &TimeRangeValue) -> Vec<String> {
    let now = OffsetDateTime::now_utc();
    let mut lines = vec![format!("Time range: {}", caption(&range.from, &range.to))];
    for (label, expr) in [("from", &range.from), ("to", &range.to)] {
        if expr.is_empty() {
            continue;
        }
        match parser.parse(expr, now) {
            Ok(t) => lines.push(format!("  {label}: {}", parser.format(t))),
            Err(e) => lines.push(format!("  {label}: {e}")),
        }
    }
    lines
}

/// Show the new range and hand it to the run loop.
fn announce_range(
    parser: &TimeExpressionParser,
    range: &TimeRangeValue,
    out_tx: &mpsc::UnboundedSender<OutputLine>,
    cmd_tx: &mpsc::UnboundedSender<UiCommand>,
) {
    for line in describe_range(parser, range) {
        let _ = out_tx.send(OutputLine::Stderr(line));
    }
    let _ = cmd_tx.send(UiCommand::SetRange(range.clone()));
}

/// Render controller events until the controller goes away.
async fn render_events(
    mut event_rx: mpsc::UnboundedReceiver<ControllerEvent>,
    out_tx: mpsc::UnboundedSender<OutputLine>,
    limit: u64,
) {
    while let Some(ev) = event_rx.recv().await {
        match ev {
            ControllerEvent::StateChanged(ExecutionState::Loading) => {
                let _ = out_tx.send(OutputLine::Stderr("Running…".into()));
            }
            ControllerEvent::StateChanged(state @ ExecutionState::Succeeded { .. }) => {
                if let Ok(summary) = build_text_summary(None, &state, limit) {
                    for line in summary.lines {
                        let _ = out_tx.send(OutputLine::Stdout(line));
                    }
                }
            }
            // Failures arrive as InfoEvent::ExecuteFailed.
            ControllerEvent::StateChanged(_) => {}
            ControllerEvent::Info(info) => {
                let _ = out_tx.send(OutputLine::Stderr(info.to_message()));
            }
        }
    }
}

pub(crate) async fn run(
    args: Cli,
    mut controller: ExecutionController,
    range: TimeRangeValue,
    mut event_rx: mpsc::UnboundedReceiver<ControllerEvent>,
) -> Result<()> {
    let (out_tx, out_handle) = spawn_output_writer();

    controller.bootstrap().await;
    // Bootstrap transitions are not query runs; only its notices are shown.
    while let Ok(ev) = event_rx.try_recv() {
        if let ControllerEvent::Info(info) = ev {
            let _ = out_tx.send(OutputLine::Stderr(info.to_message()));
        }
    }
    if controller.endpoint().is_server_managed() {
        let _ = out_tx.send(OutputLine::Stderr(format!(
            "Queries run against {} (managed by the server)",
            controller.endpoint().url
        )));
    }

    let render_handle = tokio::spawn(render_events(event_rx, out_tx.clone(), controller.limit()));
    let parser = TimeExpressionParser::new(controller.parser().zone());
    let mut current = range.clone();
    for line in describe_range(&parser, &current) {
        let _ = out_tx.send(OutputLine::Stderr(line));
    }
    let _ = out_tx.send(OutputLine::Stderr("Type :help for commands.".into()));

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let ctrl_handle = tokio::spawn(run_controller(controller, range, args.mode, cmd_rx));

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let parsed = match parse_line(&line) {
            Ok(parsed) => parsed,
            Err(msg) => {
                let _ = out_tx.send(OutputLine::Stderr(msg));
                continue;
            }
        };
        match parsed {
            SessionLine::Empty => {}
            SessionLine::Sql(sql) => {
                let _ = cmd_tx.send(UiCommand::Execute { sql });
            }
            SessionLine::From(expr) => {
                current.from = expr;
                announce_range(&parser, &current, &out_tx, &cmd_tx);
            }
            SessionLine::To(expr) => {
                current.to = expr;
                announce_range(&parser, &current, &out_tx, &cmd_tx);
            }
            SessionLine::Range(label) => match quick_ranges::find_by_label(&label) {
                Some(qr) => {
                    current = TimeRangeValue::new(qr.from, qr.to);
                    announce_range(&parser, &current, &out_tx, &cmd_tx);
                }
                None => {
                    let _ = out_tx.send(OutputLine::Stderr(format!(
                        "unknown quick range {label:?}, see :ranges"
                    )));
                }
            },
            SessionLine::ListRanges => {
                for line in quick_range_lines(&parser, OffsetDateTime::now_utc()) {
                    let _ = out_tx.send(OutputLine::Stderr(line));
                }
            }
            SessionLine::Mode(mode) => {
                let _ = cmd_tx.send(UiCommand::SetMode(mode));
                let _ = out_tx.send(OutputLine::Stderr(format!("Mode: {}", mode.as_str())));
            }
            SessionLine::Endpoint { url, token } => {
                let _ = cmd_tx.send(UiCommand::SetEndpoint { url, token });
            }
            SessionLine::Help => {
                for line in HELP {
                    let _ = out_tx.send(OutputLine::Stderr((*line).to_string()));
                }
            }
            SessionLine::Quit => break,
        }
    }

    let _ = cmd_tx.send(UiCommand::Quit);
    // Dropping the controller closes the event channel and ends the renderer.
    drop(ctrl_handle.await?);
    let _ = render_handle.await;
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}
