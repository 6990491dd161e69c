//! Time-window selection: label lookup, NRQL range clauses, and the
//! divisor used to normalize alert frequency.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unit of a relative NRQL time bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Hours,
    Days,
}

impl TimeUnit {
    /// Singular unit name used in frequency labels ("per hour").
    pub fn singular(self) -> &'static str {
        match self {
            TimeUnit::Hours => "hour",
            TimeUnit::Days => "day",
        }
    }

    fn plural(self) -> &'static str {
        match self {
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
        }
    }

    fn seconds(self) -> i64 {
        match self {
            TimeUnit::Hours => 3_600,
            TimeUnit::Days => 86_400,
        }
    }
}

/// A relative bound: `amount` units before now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub amount: u32,
    pub unit: TimeUnit,
}

impl Span {
    pub fn new(amount: u32, unit: TimeUnit) -> Self {
        Self { amount, unit }
    }

    pub fn as_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(self.amount) * self.unit.seconds())
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ago", self.amount, self.unit.plural())
    }
}

/// A query range expressed relative to query time, `SINCE .. [UNTIL ..]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryRange {
    pub since: Span,
    pub until: Option<Span>,
}

impl QueryRange {
    /// Render the NRQL time clause, e.g. `SINCE 48 hours ago UNTIL 24 hours ago`.
    pub fn nrql_clause(&self) -> String {
        match &self.until {
            Some(until) => format!("SINCE {} UNTIL {}", self.since, until),
            None => format!("SINCE {}", self.since),
        }
    }
}

/// The fixed set of dashboard windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeWindow {
    LastHour,
    Last6Hours,
    #[default]
    Last24Hours,
    Last7Days,
    Last30Days,
}

impl TimeWindow {
    pub const ALL: [TimeWindow; 5] = [
        TimeWindow::LastHour,
        TimeWindow::Last6Hours,
        TimeWindow::Last24Hours,
        TimeWindow::Last7Days,
        TimeWindow::Last30Days,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TimeWindow::LastHour => "Last 1 Hour",
            TimeWindow::Last6Hours => "Last 6 Hours",
            TimeWindow::Last24Hours => "Last 24 Hours",
            TimeWindow::Last7Days => "Last 7 Days",
            TimeWindow::Last30Days => "Last 30 Days",
        }
    }

    fn short_code(self) -> &'static str {
        match self {
            TimeWindow::LastHour => "1h",
            TimeWindow::Last6Hours => "6h",
            TimeWindow::Last24Hours => "24h",
            TimeWindow::Last7Days => "7d",
            TimeWindow::Last30Days => "30d",
        }
    }

    /// Look a window up by its label. Accepts the full label
    /// ("Last 24 Hours"), the label without "Last" ("24 Hours") or the
    /// short code ("24h"), case-insensitively.
    pub fn from_label(label: &str) -> Option<Self> {
        let needle = label.trim().to_ascii_lowercase();
        let needle = needle.strip_prefix("last ").unwrap_or(needle.as_str()).trim();
        Self::ALL.into_iter().find(|w| {
            let full = w.label().to_ascii_lowercase();
            let bare = full.strip_prefix("last ").unwrap_or(full.as_str());
            needle == bare || needle == w.short_code()
        })
    }

    /// Window length as a relative span.
    pub fn span(self) -> Span {
        match self {
            TimeWindow::LastHour => Span::new(1, TimeUnit::Hours),
            TimeWindow::Last6Hours => Span::new(6, TimeUnit::Hours),
            TimeWindow::Last24Hours => Span::new(24, TimeUnit::Hours),
            TimeWindow::Last7Days => Span::new(7, TimeUnit::Days),
            TimeWindow::Last30Days => Span::new(30, TimeUnit::Days),
        }
    }

    /// Frequency normalization: `(divisor, unit)` so that
    /// `count / divisor` is a per-unit rate.
    pub fn frequency_divisor(self) -> (u32, TimeUnit) {
        let span = self.span();
        (span.amount, span.unit)
    }

    /// The current window, `SINCE N units ago`.
    pub fn range(self) -> QueryRange {
        QueryRange {
            since: self.span(),
            until: None,
        }
    }

    /// The preceding window of identical length, `SINCE 2N UNTIL N`.
    pub fn prior_range(self) -> QueryRange {
        let span = self.span();
        QueryRange {
            since: Span::new(span.amount * 2, span.unit),
            until: Some(span),
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TimeWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| format!("unknown time window '{}'", s))
    }
}

impl TryFrom<String> for TimeWindow {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeWindow> for String {
    fn from(value: TimeWindow) -> Self {
        value.label().to_string()
    }
}
