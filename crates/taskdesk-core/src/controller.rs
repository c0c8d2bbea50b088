use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument, warn};

use crate::filter::{DueFilter, FilterState, StatusFilter};
use crate::i18n::{self, Lang, Msg};
use crate::rpc::{TaskListResponse, TaskQuery, TaskService};

/// What kind of input changed. Search keystrokes arrive faster than
/// select changes, so they get a longer settle window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    FilterSelect,
    SearchInput,
}

/// Collapses bursts of filter changes into one fetch. A new trigger
/// discards any earlier pending deadline.
#[derive(Debug, Clone)]
pub struct Debouncer {
    select_delay: Duration,
    search_delay: Duration,
    deadline: Option<DateTime<Utc>>,
}

impl Debouncer {
    pub fn new(select_delay: Duration, search_delay: Duration) -> Self {
        Self {
            select_delay,
            search_delay,
            deadline: None,
        }
    }

    pub fn note(&mut self, kind: TriggerKind, now: DateTime<Utc>) {
        let delay = match kind {
            TriggerKind::FilterSelect => self.select_delay,
            TriggerKind::SearchInput => self.search_delay,
        };
        let deadline = now + delay;
        debug!(?kind, %deadline, "debounce window restarted");
        self.deadline = Some(deadline);
    }

    /// Consumes the pending deadline when it has elapsed.
    pub fn fire(&mut self, now: DateTime<Utc>) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }
}

/// Fixed-interval unconditional refresh, surfacing externally-made
/// changes and newly-overdue tasks.
#[derive(Debug, Clone)]
pub struct RefreshTimer {
    every: Duration,
    next: DateTime<Utc>,
}

impl RefreshTimer {
    pub fn new(every: Duration, now: DateTime<Utc>) -> Self {
        Self {
            every,
            next: now + every,
        }
    }

    pub fn due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next
    }

    pub fn rearm(&mut self, now: DateTime<Utc>) {
        self.next = now + self.every;
    }
}

/// Monotonic request sequencing: only the response belonging to the
/// most recently issued request may update the view; anything older
/// is dropped.
#[derive(Debug, Clone, Default)]
pub struct RequestGuard {
    issued: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(u64);

impl RequestGuard {
    pub fn issue(&mut self) -> RequestId {
        self.issued += 1;
        RequestId(self.issued)
    }

    pub fn admits(&self, id: RequestId) -> bool {
        id.0 == self.issued
    }
}

/// The dashboard's single-owner state: current filters, debounce and
/// refresh clocks, and the last-admitted response. All mutation goes
/// through its own handlers; each admitted response replaces the view
/// atomically.
#[derive(Debug)]
pub struct Dashboard<S: TaskService> {
    service: S,
    lang: Lang,
    filter: FilterState,
    debounce: Debouncer,
    refresh: RefreshTimer,
    guard: RequestGuard,
    view: TaskListResponse,
}

impl<S: TaskService> Dashboard<S> {
    pub fn new(
        service: S,
        lang: Lang,
        now: DateTime<Utc>,
        refresh_every: Duration,
        select_delay: Duration,
        search_delay: Duration,
    ) -> Self {
        Self {
            service,
            lang,
            filter: FilterState::default(),
            debounce: Debouncer::new(select_delay, search_delay),
            refresh: RefreshTimer::new(refresh_every, now),
            guard: RequestGuard::default(),
            view: TaskListResponse {
                success: true,
                tasks: vec![],
                count: 0,
                stats: Default::default(),
                message: None,
            },
        }
    }

    pub fn view(&self) -> &TaskListResponse {
        &self.view
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn set_status(&mut self, status: StatusFilter, now: DateTime<Utc>) {
        self.filter.status = status;
        self.debounce.note(TriggerKind::FilterSelect, now);
    }

    pub fn set_due(&mut self, due: DueFilter, now: DateTime<Utc>) {
        self.filter.due = due;
        self.debounce.note(TriggerKind::FilterSelect, now);
    }

    pub fn set_search(&mut self, term: &str, now: DateTime<Utc>) {
        self.filter.search = term.to_string();
        self.debounce.note(TriggerKind::SearchInput, now);
    }

    /// Cooperative pump: call on every timer tick. Fetches at most
    /// once, when either the debounce window elapsed or the periodic
    /// refresh came due.
    #[instrument(skip(self))]
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        if self.debounce.fire(now) {
            debug!("debounce elapsed; fetching");
            self.refresh_now(now);
            return true;
        }
        if self.refresh.due(now) {
            debug!("periodic refresh due; fetching");
            self.refresh_now(now);
            return true;
        }
        false
    }

    /// Immediate fetch through the shared path, bypassing debounce
    /// (used for initial load and after a completed action).
    #[instrument(skip(self))]
    pub fn refresh_now(&mut self, now: DateTime<Utc>) {
        let id = self.guard.issue();
        let query = TaskQuery::from_filter(&self.filter);
        let outcome = self.fetch(&query);
        self.apply_response(id, outcome, now);
    }

    /// Issues a request id without completing it, for callers that
    /// drive the fetch themselves (and for exercising out-of-order
    /// completion).
    pub fn issue_request(&mut self) -> (RequestId, TaskQuery) {
        (self.guard.issue(), TaskQuery::from_filter(&self.filter))
    }

    /// Admits `outcome` only when it answers the most recent request;
    /// a stale response is dropped so it can never overwrite newer
    /// data. Returns whether the view was replaced.
    pub fn apply_response(
        &mut self,
        id: RequestId,
        outcome: TaskListResponse,
        now: DateTime<Utc>,
    ) -> bool {
        if !self.guard.admits(id) {
            info!(?id, "dropping stale response");
            return false;
        }
        self.view = outcome;
        self.refresh.rearm(now);
        true
    }

    fn fetch(&self, query: &TaskQuery) -> TaskListResponse {
        match self.service.get_my_tasks(query) {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "task fetch failed");
                TaskListResponse::failure(
                    i18n::text(self.lang, Msg::ServerConnectionFailed).to_string(),
                )
            }
        }
    }

    /// Marks a task complete and, on success, re-fetches through the
    /// shared path. Falls back to the generic set-value operation when
    /// the dedicated endpoint rejects the transition.
    #[instrument(skip(self))]
    pub fn complete_task(&mut self, task_name: &str, now: DateTime<Utc>) -> String {
        let ack = self
            .service
            .mark_task_completed(task_name)
            .and_then(|first| {
                if first.success {
                    Ok(first)
                } else {
                    debug!(task = task_name, "falling back to set_task_field");
                    self.service.set_task_field(task_name, "status", "Completed")
                }
            });

        match ack {
            Ok(ack) if ack.success => {
                self.refresh_now(now);
                ack.message
                    .unwrap_or_else(|| i18n::text(self.lang, Msg::TaskCompleted).to_string())
            }
            Ok(ack) => ack
                .message
                .unwrap_or_else(|| i18n::text(self.lang, Msg::FailedToUpdateTask).to_string()),
            Err(err) => {
                warn!(error = %err, "completion call failed");
                i18n::text(self.lang, Msg::ServerConnectionFailed).to_string()
            }
        }
    }
}
