use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Closed status set for a service task. The wire uses the
/// human-readable labels ("In Progress" with a space), so the serde
/// names follow the wire, not Rust casing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Status {
    Open,
    Pending,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    Cancelled,
}

/// Display badge color class per status, mirroring the dashboard's
/// status badge mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Badge {
    Primary,
    Warning,
    Info,
    Success,
    Secondary,
}

impl Status {
    pub fn badge(self) -> Badge {
        match self {
            Status::Open => Badge::Primary,
            Status::Pending => Badge::Warning,
            Status::InProgress => Badge::Info,
            Status::Completed => Badge::Success,
            Status::Cancelled => Badge::Secondary,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::Open => "Open",
            Status::Pending => "Pending",
            Status::InProgress => "In Progress",
            Status::Completed => "Completed",
            Status::Cancelled => "Cancelled",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "open" => Some(Status::Open),
            "pending" => Some(Status::Pending),
            "in progress" | "in_progress" | "inprogress" => Some(Status::InProgress),
            "completed" => Some(Status::Completed),
            "cancelled" | "canceled" => Some(Status::Cancelled),
            _ => None,
        }
    }
}

impl Badge {
    pub fn class(self) -> &'static str {
        match self {
            Badge::Primary => "primary",
            Badge::Warning => "warning",
            Badge::Info => "info",
            Badge::Success => "success",
            Badge::Secondary => "secondary",
        }
    }
}

/// A task as delivered by the task service. Due dates stay wire
/// strings: a malformed date must degrade to a placeholder at render
/// time rather than fail the whole response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub name: String,

    pub title: String,

    #[serde(default)]
    pub title_translated: Option<String>,

    pub status: Status,

    #[serde(default)]
    pub due_date: Option<String>,

    #[serde(default)]
    pub local_due_date: Option<String>,

    #[serde(default)]
    pub timezone: Option<String>,

    #[serde(default)]
    pub assigned_to: Option<String>,

    #[serde(default)]
    pub assigned_role: Option<String>,

    #[serde(default)]
    pub organization: Option<String>,

    #[serde(default)]
    pub notes: Option<String>,

    #[serde(default)]
    pub completion_notes: Option<String>,

    #[serde(default)]
    pub can_edit: bool,

    #[serde(default)]
    pub parent: Option<String>,

    #[serde(default)]
    pub creation: Option<String>,

    #[serde(default)]
    pub modified: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Task {
    pub fn new(name: &str, title: &str, status: Status) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            title_translated: None,
            status,
            due_date: None,
            local_due_date: None,
            timezone: None,
            assigned_to: None,
            assigned_role: None,
            organization: None,
            notes: None,
            completion_notes: None,
            can_edit: false,
            parent: None,
            creation: None,
            modified: None,
            extra: BTreeMap::new(),
        }
    }

    /// The title preferred for display: translated when the server
    /// supplied one.
    pub fn display_title(&self) -> &str {
        self.title_translated.as_deref().unwrap_or(&self.title)
    }

    /// The instant shown in the "local due date" column. The server
    /// pre-computes it; when absent the UTC value stands in.
    pub fn local_due_or_utc(&self) -> Option<&str> {
        self.local_due_date
            .as_deref()
            .or(self.due_date.as_deref())
    }
}

/// Aggregate counts returned alongside a task list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskStats {
    pub total: u64,
    pub completed: u64,
    pub in_progress: u64,
    pub pending: u64,
    pub overdue: u64,
}

/// The authenticated actor the dashboard renders for. Drives both
/// server-side visibility and the client-side protection overlay.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub user: String,
    pub roles: BTreeSet<String>,
    pub organization: Option<String>,
}

impl Viewer {
    pub fn new(user: &str, roles: &[&str]) -> Self {
        Self {
            user: user.to_string(),
            roles: roles.iter().map(|r| (*r).to_string()).collect(),
            organization: None,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn is_elevated(&self, elevated_role: &str) -> bool {
        self.has_role(elevated_role)
    }
}
