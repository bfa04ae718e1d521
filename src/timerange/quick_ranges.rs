//! Predefined quick ranges offered next to the from/to inputs.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuickRange {
    pub label: &'static str,
    pub from: &'static str,
    pub to: &'static str,
}

const fn last(label: &'static str, from: &'static str) -> QuickRange {
    QuickRange {
        label,
        from,
        to: "now",
    }
}

/// Ascending by duration. Entries are unique on the (from, to) pair.
static QUICK_RANGES: [QuickRange; 22] = [
    last("Last 5 minutes", "5m ago"),
    last("Last 10 minutes", "10m ago"),
    last("Last 15 minutes", "15m ago"),
    last("Last 20 minutes", "20m ago"),
    last("Last 30 minutes", "30m ago"),
    last("Last 1 hour", "1h ago"),
    last("Last 2 hours", "2h ago"),
    last("Last 3 hours", "3h ago"),
    last("Last 6 hour", "6h ago"),
    last("Last 12 hours", "12h ago"),
    last("Last 24 hours", "24h ago"),
    last("Last 2 days", "2d ago"),
    last("Last 3 days", "3d ago"),
    last("Last 7 days", "7d ago"),
    last("Last 14 days", "14d ago"),
    last("Last 30 days", "30d ago"),
    last("Last 90 days", "90d ago"),
    last("Last 6 months", "180d ago"),
    last("Last 1 year", "1y ago"),
    last("Last 2 years", "2y ago"),
    last("Last 3 years", "3y ago"),
    last("Last 5 years", "5y ago"),
];

pub fn all() -> &'static [QuickRange] {
    &QUICK_RANGES
}

/// First entry whose expressions equal `from` and `to` exactly.
pub fn lookup(from: &str, to: &str) -> Option<&'static QuickRange> {
    QUICK_RANGES.iter().find(|r| r.from == from && r.to == to)
}

/// Case-insensitive match on the display label.
pub fn find_by_label(label: &str) -> Option<&'static QuickRange> {
    let label = label.trim();
    QUICK_RANGES
        .iter()
        .find(|r| r.label.eq_ignore_ascii_case(label))
}
