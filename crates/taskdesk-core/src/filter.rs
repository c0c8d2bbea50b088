use chrono::{Days, Months, NaiveDate};
use tracing::trace;

use crate::task::Status;

/// Status dimension of the dashboard filter bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(Status),
}

/// Due-date bucket dimension. Buckets are evaluated against the
/// task's UTC due day, matching the server's query semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DueFilter {
    #[default]
    All,
    Today,
    Week,
    Month,
    Overdue,
}

impl DueFilter {
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "all" => Some(DueFilter::All),
            "today" => Some(DueFilter::Today),
            "week" => Some(DueFilter::Week),
            "month" => Some(DueFilter::Month),
            "overdue" => Some(DueFilter::Overdue),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DueFilter::All => "all",
            DueFilter::Today => "today",
            DueFilter::Week => "week",
            DueFilter::Month => "month",
            DueFilter::Overdue => "overdue",
        }
    }

    /// Bucket membership for a task with due day `due` and `status`.
    /// Tasks without a parseable due date only match the `All` bucket.
    pub fn matches(self, due: Option<NaiveDate>, status: Status, today: NaiveDate) -> bool {
        let ok = match self {
            DueFilter::All => true,
            DueFilter::Today => due == Some(today),
            DueFilter::Week => due.is_some_and(|d| {
                let end = today.checked_add_days(Days::new(7)).unwrap_or(today);
                d >= today && d <= end
            }),
            DueFilter::Month => due.is_some_and(|d| {
                let end = today.checked_add_months(Months::new(1)).unwrap_or(today);
                d >= today && d <= end
            }),
            DueFilter::Overdue => due.is_some_and(|d| d < today) && status != Status::Completed,
        };
        trace!(bucket = self.as_str(), ?due, ok, "due bucket evaluation");
        ok
    }
}

/// The three independent filter dimensions owned by the dashboard:
/// status, due bucket, and free-text search over title and notes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    pub status: StatusFilter,
    pub due: DueFilter,
    pub search: String,
}

impl FilterState {
    /// Parses CLI filter terms: `status:<s>`, `due:<bucket>`, anything
    /// else accumulates into the search term.
    pub fn parse(terms: &[String]) -> anyhow::Result<Self> {
        let mut state = FilterState::default();
        let mut search_terms: Vec<&str> = Vec::new();

        for term in terms {
            if let Some(value) = term.strip_prefix("status:") {
                if value.eq_ignore_ascii_case("all") {
                    state.status = StatusFilter::All;
                    continue;
                }
                let status = Status::parse(value)
                    .ok_or_else(|| anyhow::anyhow!("unknown status filter: {value}"))?;
                state.status = StatusFilter::Only(status);
                continue;
            }

            if let Some(value) = term.strip_prefix("due:") {
                state.due = DueFilter::parse(value)
                    .ok_or_else(|| anyhow::anyhow!("unknown due bucket: {value}"))?;
                continue;
            }

            search_terms.push(term.as_str());
        }

        state.search = search_terms.join(" ");
        Ok(state)
    }

    /// Wire argument for the status dimension; `None` means all.
    pub fn status_arg(&self) -> Option<String> {
        match self.status {
            StatusFilter::All => None,
            StatusFilter::Only(status) => Some(status.label().to_string()),
        }
    }

    /// Wire argument for the due bucket; `None` means all.
    pub fn due_arg(&self) -> Option<String> {
        match self.due {
            DueFilter::All => None,
            other => Some(other.as_str().to_string()),
        }
    }

    /// Wire argument for the search term; `None` when blank.
    pub fn search_arg(&self) -> Option<String> {
        let trimmed = self.search.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// Case-insensitive title/notes search, the client-side twin of the
/// server's `LIKE %term%` match.
pub fn search_matches(term: &str, title: &str, notes: Option<&str>) -> bool {
    let needle = term.to_lowercase();
    if needle.is_empty() {
        return true;
    }
    title.to_lowercase().contains(&needle)
        || notes.is_some_and(|n| n.to_lowercase().contains(&needle))
}
