use crate::backend::HttpBackend;
use crate::model::{
    ControllerEvent, EndpointConfig, ExecMode, ExecutionState, InfoEvent, TimeRangeValue,
    DEFAULT_ENDPOINT_URL,
};
use crate::orchestrator::ExecutionController;
use crate::timerange::{caption, quick_ranges, TimeExpressionParser, Zone};
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::io::{LineWriter, Write};
use std::sync::Arc;
use chrono_tz::Tz;
use time::{OffsetDateTime, UtcOffset};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::warn;

/// A line for the terminal, tagged with the stream it belongs on.
pub(crate) enum OutputLine {
    /// Results, so `--json` output can be piped.
    Stdout(String),
    /// Notices and progress.
    Stderr(String),
}

/// Route output through one blocking task so async code never waits on the
/// terminal. The task ends once every sender is dropped.
pub(crate) fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let mut out = LineWriter::new(std::io::stdout().lock());
        let mut err = LineWriter::new(std::io::stderr().lock());
        while let Some(line) = rx.blocking_recv() {
            let written = match &line {
                OutputLine::Stdout(msg) => writeln!(out, "{msg}"),
                OutputLine::Stderr(msg) => writeln!(err, "{msg}"),
            };
            // Reader went away (e.g. `| head`); drop the rest.
            if written.is_err() {
                break;
            }
        }
        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "sql-to-logsql",
    version,
    about = "Translate SQL to LogsQL and query VictoriaLogs over a time range"
)]
pub struct Cli {
    /// Base URL of the sql-to-logsql service
    #[arg(long, env = "SQL_TO_LOGSQL_SERVER", default_value = "http://localhost:8080")]
    pub server: String,

    /// VictoriaLogs endpoint to query (ignored when the server pins one)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Bearer token for the VictoriaLogs endpoint
    #[arg(long, env = "SQL_TO_LOGSQL_BEARER_TOKEN", default_value = "", hide_env_values = true)]
    pub bearer_token: String,

    /// Translate only, or translate and run the query
    #[arg(long, value_enum, default_value_t = ExecMode::Query)]
    pub mode: ExecMode,

    /// Start of the time range: "YYYY-MM-DD HH:mm:ss", "5m ago", "now", "yesterday at 9am", or "" for unset
    #[arg(long, default_value = "1h ago")]
    pub from: String,

    /// End of the time range (same forms as --from)
    #[arg(long, default_value = "now")]
    pub to: String,

    /// Quick range label such as "Last 24 hours" (overrides --from/--to)
    #[arg(long)]
    pub range: Option<String>,

    /// SQL to run; read from stdin when omitted
    #[arg(long)]
    pub sql: Option<String>,

    /// Print JSON result and exit
    #[arg(long)]
    pub json: bool,

    /// Line-oriented session: SQL lines run, ':help' lists commands
    #[arg(long, conflicts_with = "json")]
    pub interactive: bool,

    /// Print the quick ranges with their resolved instants and exit
    #[arg(long)]
    pub list_ranges: bool,

    /// Read and print absolute times in UTC instead of local time
    #[arg(long, conflicts_with = "tz")]
    pub utc: bool,

    /// Read and print absolute times in this IANA zone, e.g. "Europe/Berlin"
    #[arg(long)]
    pub tz: Option<String>,

    /// Verbose logging to stderr (RUST_LOG overrides)
    #[arg(short, long)]
    pub verbose: bool,
}

pub async fn run(args: Cli) -> Result<()> {
    let parser = TimeExpressionParser::new(zone_from_args(&args)?);

    if args.list_ranges {
        let now = OffsetDateTime::now_utc();
        for line in quick_range_lines(&parser, now) {
            println!("{line}");
        }
        return Ok(());
    }

    let range = initial_range(&args)?;
    validate_range(&parser, &range, OffsetDateTime::now_utc())?;

    let (event_tx, event_rx) = mpsc::unbounded_channel::<ControllerEvent>();
    let controller = build_controller(&args, event_tx)?.with_parser(parser);

    if args.interactive {
        return crate::session::run(args, controller, range, event_rx).await;
    }
    run_once(args, controller, range, event_rx).await
}

/// `--utc` wins, then `--tz`, then the system zone.
pub(crate) fn zone_from_args(args: &Cli) -> Result<Zone> {
    if args.utc {
        return Ok(Zone::Fixed(UtcOffset::UTC));
    }
    match args.tz.as_deref().map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => name
            .parse::<Tz>()
            .map(Zone::Named)
            .map_err(|e| anyhow!("unknown time zone {name:?}: {e}")),
        None => Ok(Zone::Local),
    }
}

/// Build the controller from CLI arguments.
pub(crate) fn build_controller(
    args: &Cli,
    event_tx: mpsc::UnboundedSender<ControllerEvent>,
) -> Result<ExecutionController> {
    let user_agent = format!("sql-to-logsql-cli/{}", env!("CARGO_PKG_VERSION"));
    let backend = HttpBackend::new(&args.server, &user_agent)?;
    let endpoint = EndpointConfig {
        url: args
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT_URL.to_string()),
        token: args.bearer_token.clone(),
        enabled: true,
    };
    Ok(ExecutionController::new(Arc::new(backend), event_tx).with_endpoint(endpoint))
}

/// The time range requested on the command line; `--range` wins over `--from`/`--to`.
pub(crate) fn initial_range(args: &Cli) -> Result<TimeRangeValue> {
    match args.range.as_deref() {
        Some(label) => {
            let qr = quick_ranges::find_by_label(label)
                .ok_or_else(|| anyhow!("unknown quick range {label:?}, see --list-ranges"))?;
            Ok(TimeRangeValue::new(qr.from, qr.to))
        }
        None => Ok(TimeRangeValue::new(args.from.trim(), args.to.trim())),
    }
}

/// Reject unparseable bounds before anything is sent.
pub(crate) fn validate_range(
    parser: &TimeExpressionParser,
    range: &TimeRangeValue,
    now: OffsetDateTime,
) -> Result<()> {
    for (flag, expr) in [("--from", &range.from), ("--to", &range.to)] {
        if expr.is_empty() {
            continue;
        }
        parser
            .parse(expr, now)
            .with_context(|| format!("{flag} {expr:?}"))?;
    }
    Ok(())
}

/// One line per quick range: label, expressions and where they land right now.
pub(crate) fn quick_range_lines(parser: &TimeExpressionParser, now: OffsetDateTime) -> Vec<String> {
    quick_ranges::all()
        .iter()
        .map(|qr| {
            let from = parser
                .parse(qr.from, now)
                .map(|t| parser.format(t))
                .unwrap_or_default();
            let to = parser
                .parse(qr.to, now)
                .map(|t| parser.format(t))
                .unwrap_or_default();
            format!("{:<16} {:>9} .. {:<4} {from} .. {to}", qr.label, qr.from, qr.to)
        })
        .collect()
}

async fn read_sql(args: &Cli) -> Result<String> {
    let sql = match args.sql.as_deref() {
        Some(sql) => sql.to_string(),
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("failed to read SQL from stdin")?;
            buf
        }
    };
    let sql = sql.trim().to_string();
    if sql.is_empty() {
        bail!("no SQL given, pass --sql or pipe it on stdin");
    }
    Ok(sql)
}

async fn run_once(
    args: Cli,
    mut controller: ExecutionController,
    range: TimeRangeValue,
    mut event_rx: mpsc::UnboundedReceiver<ControllerEvent>,
) -> Result<()> {
    let sql = read_sql(&args).await?;
    let (out_tx, out_handle) = spawn_output_writer();

    controller.bootstrap().await;
    if controller.endpoint().is_server_managed() && args.endpoint.is_some() {
        warn!("server pins the logs endpoint, --endpoint is ignored");
    }
    controller.execute(&sql, &range, args.mode).await;

    // Surface notices (config, dropped bounds) on stderr; failures come back as the error.
    while let Ok(ev) = event_rx.try_recv() {
        if let ControllerEvent::Info(info) = ev {
            if !args.json && !matches!(info, InfoEvent::ExecuteFailed(_)) {
                let _ = out_tx.send(OutputLine::Stderr(info.to_message()));
            }
        }
    }

    let caption = caption(&range.from, &range.to);
    let state = controller.state();
    let res = if args.json {
        let out = serde_json::json!({
            "timeRange": {
                "from": range.from,
                "to": range.to,
                "caption": caption,
            },
            "execMode": args.mode,
            "limit": controller.limit(),
            "result": state,
        });
        let _ = out_tx.send(OutputLine::Stdout(serde_json::to_string_pretty(&out)?));
        match state {
            ExecutionState::Failed { message } => Err(anyhow!("{message}")),
            _ => Ok(()),
        }
    } else {
        crate::text_summary::build_text_summary(Some(&caption), state, controller.limit()).map(
            |summary| {
                for line in summary.lines {
                    let _ = out_tx.send(OutputLine::Stdout(line));
                }
            },
        )
    };

    drop(out_tx);
    let _ = out_handle.await;
    res.context("execute error")
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn args(extra: &[&str]) -> Cli {
        let mut argv = vec!["sql-to-logsql"];
        argv.extend_from_slice(extra);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults() {
        let cli = args(&[]);
        assert_eq!(cli.mode, ExecMode::Query);
        assert_eq!(cli.from, "1h ago");
        assert_eq!(cli.to, "now");
        assert!(cli.endpoint.is_none());
        assert_eq!(
            initial_range(&cli).unwrap(),
            TimeRangeValue::new("1h ago", "now")
        );
    }

    #[test]
    fn quick_range_label_overrides_bounds() {
        let cli = args(&["--range", "last 7 days", "--from", "ignored"]);
        assert_eq!(
            initial_range(&cli).unwrap(),
            TimeRangeValue::new("7d ago", "now")
        );
        let cli = args(&["--range", "Last forever"]);
        assert!(initial_range(&cli).is_err());
    }

    #[test]
    fn mode_flag() {
        assert_eq!(args(&["--mode", "translate"]).mode, ExecMode::Translate);
        assert!(Cli::try_parse_from(["sql-to-logsql", "--mode", "explain"]).is_err());
    }

    #[test]
    fn json_conflicts_with_interactive() {
        assert!(Cli::try_parse_from(["sql-to-logsql", "--json", "--interactive"]).is_err());
    }

    #[test]
    fn validation_names_the_field() {
        let parser = TimeExpressionParser::new(UtcOffset::UTC);
        let now = datetime!(2024-01-01 00:00:00 UTC);
        assert!(validate_range(&parser, &TimeRangeValue::new("", ""), now).is_ok());
        assert!(validate_range(&parser, &TimeRangeValue::new("5m ago", "now"), now).is_ok());

        let err = validate_range(&parser, &TimeRangeValue::new("5m ago", "someday"), now)
            .unwrap_err();
        assert_eq!(format!("{err:#}"), "--to \"someday\": invalid date format");
    }

    #[test]
    fn explicit_endpoint_is_used() {
        let cli = args(&["--endpoint", "https://logs.example", "--bearer-token", "tok"]);
        let (tx, _rx) = mpsc::unbounded_channel();
        let ctrl = build_controller(&cli, tx).unwrap();
        assert_eq!(ctrl.endpoint().url, "https://logs.example");
        assert_eq!(ctrl.endpoint().token, "tok");
        assert!(ctrl.endpoint().enabled);
    }

    #[test]
    fn zone_selection() {
        assert_eq!(
            zone_from_args(&args(&["--utc"])).unwrap(),
            Zone::Fixed(UtcOffset::UTC)
        );
        assert_eq!(
            zone_from_args(&args(&["--tz", "Europe/Berlin"])).unwrap(),
            Zone::Named(chrono_tz::Europe::Berlin)
        );
        assert!(zone_from_args(&args(&["--tz", "Mars/Olympus"])).is_err());
        assert!(Cli::try_parse_from(["sql-to-logsql", "--utc", "--tz", "UTC"]).is_err());
    }

    #[test]
    fn range_listing_resolves_instants() {
        let parser = TimeExpressionParser::new(UtcOffset::UTC);
        let lines = quick_range_lines(&parser, datetime!(2024-01-01 12:00:00 UTC));
        assert_eq!(lines.len(), 22);
        assert!(lines[0].starts_with("Last 5 minutes"));
        assert!(lines[0].ends_with("2024-01-01 11:55:00 .. 2024-01-01 12:00:00"));
    }
}
