//! Display caption for a from/to pair.
//!
//! Works on the raw expression text only, so a half-typed value still gets a
//! caption.

use crate::timerange::quick_ranges;

pub fn caption(from: &str, to: &str) -> String {
    match (from.is_empty(), to.is_empty()) {
        (true, true) => "Select a date range".to_string(),
        (true, false) => format!("To {to}"),
        (false, true) => format!("From {from}"),
        (false, false) => match quick_ranges::lookup(from, to) {
            Some(range) => range.label.to_string(),
            None => format!("{from} - {to}"),
        },
    }
}
