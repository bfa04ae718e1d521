//! Text summary builder for CLI output.
//!
//! Formats a finished execution into human-readable lines for text mode and
//! the interactive session.

use crate::model::ExecutionState;
use anyhow::{bail, Result};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary for a successful execution.
///
/// Fails with the server message when the execution failed, and refuses
/// states that have not finished yet.
pub(crate) fn build_text_summary(
    caption: Option<&str>,
    state: &ExecutionState,
    limit: u64,
) -> Result<TextSummary> {
    let (query, results, message) = match state {
        ExecutionState::Succeeded {
            query,
            results,
            message,
            ..
        } => (query, results, message),
        ExecutionState::Failed { message } => bail!("{message}"),
        ExecutionState::Idle | ExecutionState::Loading => bail!("query has not finished"),
    };

    let mut lines = Vec::new();
    if let Some(caption) = caption {
        lines.push(format!("Time range: {caption}"));
    }
    if !query.is_empty() {
        lines.push(format!("LogsQL: {query}"));
    }

    match results {
        serde_json::Value::Null => {}
        serde_json::Value::Array(rows) => {
            for row in rows {
                lines.push(serde_json::to_string(row)?);
            }
            let shown = rows.len() as u64;
            if limit > 0 && shown >= limit {
                lines.push(format!("Results truncated to the server limit of {limit} rows."));
            }
        }
        other => {
            lines.extend(serde_json::to_string_pretty(other)?.lines().map(String::from));
        }
    }

    if limit > 0 {
        lines.push(format!("Any query will be limited to {limit} rows."));
    }
    lines.push(message.clone());

    Ok(TextSummary { lines })
}
