use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::filter::FilterState;
use crate::protect::PendingEdit;
use crate::task::{Task, TaskStats};

/// Query arguments for `get_my_tasks` and `export_tasks`. `None`
/// dimensions mean "all", matching the wire convention where the
/// dashboard passes null for unset filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskQuery {
    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub due_filter: Option<String>,

    #[serde(default)]
    pub search_term: Option<String>,
}

impl TaskQuery {
    pub fn from_filter(filter: &FilterState) -> Self {
        Self {
            status: filter.status_arg(),
            due_filter: filter.due_arg(),
            search_term: filter.search_arg(),
        }
    }
}

/// `get_my_tasks` envelope. A completed call with `success: false`
/// carries a user-facing message; transport failures never reach this
/// type (they surface as `Err`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskListResponse {
    pub success: bool,

    #[serde(default)]
    pub tasks: Vec<Task>,

    #[serde(default)]
    pub count: u64,

    #[serde(default)]
    pub stats: TaskStats,

    #[serde(default)]
    pub message: Option<String>,
}

impl TaskListResponse {
    pub fn failure(message: String) -> Self {
        Self {
            success: false,
            tasks: vec![],
            count: 0,
            stats: TaskStats::default(),
            message: Some(message),
        }
    }
}

/// Envelope for operations that only acknowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,

    #[serde(default)]
    pub message: Option<String>,
}

impl Ack {
    pub fn ok(message: &str) -> Self {
        Self {
            success: true,
            message: Some(message.to_string()),
        }
    }

    pub fn rejected(message: String) -> Self {
        Self {
            success: false,
            message: Some(message),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDetailResponse {
    pub success: bool,

    #[serde(default)]
    pub task: Option<Task>,

    #[serde(default)]
    pub message: Option<String>,
}

/// `export_tasks` payload: ordered headers plus one row of cells per
/// task. Cells stay JSON values so the CSV writer can apply its
/// per-type quoting rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    pub success: bool,

    #[serde(default)]
    pub headers: Vec<String>,

    #[serde(default)]
    pub rows: Vec<Vec<Value>>,

    #[serde(default)]
    pub message: Option<String>,
}

/// The narrow RPC contract this client consumes. The host framework's
/// server owns filtering, permission scoping and persistence; this
/// trait is the seam a remote transport or an in-process service plugs
/// into.
///
/// `Err` means the call did not complete (transport failure);
/// `success: false` means it completed and the server rejected it.
pub trait TaskService {
    fn get_my_tasks(&self, query: &TaskQuery) -> anyhow::Result<TaskListResponse>;

    fn mark_task_completed(&self, task_name: &str) -> anyhow::Result<Ack>;

    fn get_task_details(&self, task_name: &str) -> anyhow::Result<TaskDetailResponse>;

    fn export_tasks(&self, query: &TaskQuery) -> anyhow::Result<ExportResponse>;

    /// Simplified variant feed: bare list, no envelope.
    fn get_todays_tasks(&self) -> anyhow::Result<Vec<Task>>;

    /// Generic set-value fallback used for direct status transitions.
    /// The server re-checks field protection here regardless of what
    /// the client overlay allowed.
    fn set_task_field(&self, task_name: &str, field: &str, value: &str) -> anyhow::Result<Ack>;

    /// Applies a pending edit after server-side protection validation.
    fn update_task(&self, task_name: &str, edit: &PendingEdit)
    -> anyhow::Result<TaskDetailResponse>;
}
