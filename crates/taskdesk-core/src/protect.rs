use std::collections::{BTreeMap, BTreeSet};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::i18n::{self, Lang};
use crate::task::{Task, Viewer};

/// Editable surface of a task record. Audit columns (creation,
/// modified) are deliberately absent: they never participate in change
/// detection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    DueDate,
    LocalDueDate,
    Timezone,
    Organization,
    AssignedTo,
    AssignedRole,
    Parent,
    Status,
    Notes,
    CompletionNotes,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::DueDate => "due_date",
            Field::LocalDueDate => "local_due_date",
            Field::Timezone => "timezone",
            Field::Organization => "organization",
            Field::AssignedTo => "assigned_to",
            Field::AssignedRole => "assigned_role",
            Field::Parent => "parent",
            Field::Status => "status",
            Field::Notes => "notes",
            Field::CompletionNotes => "completion_notes",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "title" | "task_title" => Some(Field::Title),
            "due_date" => Some(Field::DueDate),
            "local_due_date" => Some(Field::LocalDueDate),
            "timezone" => Some(Field::Timezone),
            "organization" => Some(Field::Organization),
            "assigned_to" => Some(Field::AssignedTo),
            "assigned_role" => Some(Field::AssignedRole),
            "parent" | "project" => Some(Field::Parent),
            "status" => Some(Field::Status),
            "notes" => Some(Field::Notes),
            "completion_notes" => Some(Field::CompletionNotes),
            _ => None,
        }
    }

    fn all() -> [Field; 11] {
        [
            Field::Title,
            Field::DueDate,
            Field::LocalDueDate,
            Field::Timezone,
            Field::Organization,
            Field::AssignedTo,
            Field::AssignedRole,
            Field::Parent,
            Field::Status,
            Field::Notes,
            Field::CompletionNotes,
        ]
    }
}

/// Fields a non-elevated viewer may always edit.
pub const ALWAYS_ALLOWED: [Field; 3] = [Field::Status, Field::Notes, Field::CompletionNotes];

/// Pure protection policy: the set of fields the rendering layer must
/// lock for this viewer. Empty for an elevated viewer. Policy only —
/// enforcement lives in `PendingEdit::validate` and, authoritatively,
/// on the server.
pub fn protected_fields(viewer: &Viewer, elevated_role: &str) -> BTreeSet<Field> {
    if viewer.is_elevated(elevated_role) {
        return BTreeSet::new();
    }

    Field::all()
        .into_iter()
        .filter(|field| !ALWAYS_ALLOWED.contains(field))
        .collect()
}

/// Entry-time advisory lock: should this field reject input focus?
/// A protected field with a value is locked; assignment fields are
/// locked even when still empty, so a first-time set is caught too.
pub fn locked_for_entry(
    viewer: &Viewer,
    elevated_role: &str,
    field: Field,
    current_value: Option<&str>,
) -> bool {
    if !protected_fields(viewer, elevated_role).contains(&field) {
        return false;
    }

    let has_value = current_value.is_some_and(|v| !v.trim().is_empty());
    has_value || matches!(field, Field::AssignedTo | Field::AssignedRole)
}

type FieldMap = BTreeMap<Field, Option<String>>;

/// An edit in flight: explicit before/after snapshots instead of an
/// ambient previous-value stash on the record. Built once when the
/// form loads and handed through the validate/save path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingEdit {
    before: FieldMap,
    after: FieldMap,
}

fn snapshot(task: &Task) -> FieldMap {
    let mut map = FieldMap::new();
    map.insert(Field::Title, Some(task.title.clone()));
    map.insert(Field::DueDate, task.due_date.clone());
    map.insert(Field::LocalDueDate, task.local_due_date.clone());
    map.insert(Field::Timezone, task.timezone.clone());
    map.insert(Field::Organization, task.organization.clone());
    map.insert(Field::AssignedTo, task.assigned_to.clone());
    map.insert(Field::AssignedRole, task.assigned_role.clone());
    map.insert(Field::Parent, task.parent.clone());
    map.insert(Field::Status, Some(task.status.label().to_string()));
    map.insert(Field::Notes, task.notes.clone());
    map.insert(Field::CompletionNotes, task.completion_notes.clone());
    map
}

impl PendingEdit {
    /// Opens an edit against the loaded record. `after` starts equal
    /// to `before`; mutations go through [`PendingEdit::set`].
    pub fn open(task: &Task) -> Self {
        let before = snapshot(task);
        Self {
            after: before.clone(),
            before,
        }
    }

    pub fn between(before: &Task, after: &Task) -> Self {
        Self {
            before: snapshot(before),
            after: snapshot(after),
        }
    }

    pub fn set(&mut self, field: Field, value: Option<&str>) {
        self.after.insert(field, value.map(str::to_string));
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.after.get(&field).and_then(|v| v.as_deref())
    }

    /// Fields whose value differs from the loaded snapshot. An
    /// empty-to-value transition counts: "no prior value" is still a
    /// change, which is what keeps first-time assignment protected.
    pub fn changed_fields(&self) -> Vec<Field> {
        let mut changed = Vec::new();
        for (field, after_value) in &self.after {
            let before_value = self.before.get(field).and_then(|v| v.as_ref());
            let normalized_before = before_value.map(|v| v.trim()).filter(|v| !v.is_empty());
            let normalized_after = after_value.as_deref().map(str::trim).filter(|v| !v.is_empty());
            if normalized_before != normalized_after {
                changed.push(*field);
            }
        }
        changed
    }

    /// The changed fields this viewer is not allowed to touch.
    pub fn blocked_fields(&self, viewer: &Viewer, elevated_role: &str) -> Vec<Field> {
        let protected = protected_fields(viewer, elevated_role);
        self.changed_fields()
            .into_iter()
            .filter(|field| protected.contains(field))
            .collect()
    }

    /// All-or-nothing save gate: one blocked field rejects the entire
    /// edit, naming every offender. This is the UX-layer check; the
    /// server re-derives the same rule before persisting.
    pub fn validate(&self, viewer: &Viewer, elevated_role: &str, lang: Lang) -> anyhow::Result<()> {
        let blocked = self.blocked_fields(viewer, elevated_role);
        if blocked.is_empty() {
            debug!(user = %viewer.user, changed = ?self.changed_fields(), "edit passes protection");
            return Ok(());
        }

        let names = blocked
            .iter()
            .map(|field| field.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        warn!(user = %viewer.user, fields = %names, "edit rejected by field protection");
        Err(anyhow!(i18n::cannot_edit_fields(lang, &names)))
    }
}

#[cfg(test)]
mod tests {
    use super::{locked_for_entry, protected_fields, Field, PendingEdit};
    use crate::i18n::Lang;
    use crate::task::{Status, Task, Viewer};

    const ELEVATED: &str = "System Manager";

    fn technician() -> Viewer {
        Viewer::new("tech@example.com", &["Technician"])
    }

    fn manager() -> Viewer {
        Viewer::new("boss@example.com", &["Technician", ELEVATED])
    }

    fn sample_task() -> Task {
        let mut task = Task::new("TASK-0001", "Replace filter", Status::Pending);
        task.due_date = Some("2025-07-22 13:00:00".to_string());
        task.notes = Some("use spare kit".to_string());
        task
    }

    #[test]
    fn elevated_viewer_has_nothing_locked() {
        assert!(protected_fields(&manager(), ELEVATED).is_empty());
        assert!(!locked_for_entry(
            &manager(),
            ELEVATED,
            Field::AssignedRole,
            None
        ));
    }

    #[test]
    fn non_elevated_viewer_keeps_only_allowed_fields() {
        let protected = protected_fields(&technician(), ELEVATED);
        assert!(protected.contains(&Field::Title));
        assert!(protected.contains(&Field::DueDate));
        assert!(protected.contains(&Field::AssignedTo));
        assert!(!protected.contains(&Field::Status));
        assert!(!protected.contains(&Field::Notes));
        assert!(!protected.contains(&Field::CompletionNotes));
    }

    #[test]
    fn first_time_assignment_is_still_locked_for_entry() {
        // Empty non-assignment fields accept focus, empty assignment
        // fields do not.
        assert!(!locked_for_entry(
            &technician(),
            ELEVATED,
            Field::Organization,
            None
        ));
        assert!(locked_for_entry(
            &technician(),
            ELEVATED,
            Field::AssignedTo,
            None
        ));
        assert!(locked_for_entry(
            &technician(),
            ELEVATED,
            Field::Organization,
            Some("ACME")
        ));
    }

    #[test]
    fn setting_empty_assigned_role_blocks_save_and_names_field() {
        let task = sample_task();
        assert!(task.assigned_role.is_none());

        let mut edit = PendingEdit::open(&task);
        edit.set(Field::AssignedRole, Some("Technician"));

        let err = edit
            .validate(&technician(), ELEVATED, Lang::En)
            .unwrap_err();
        assert!(err.to_string().contains("assigned_role"));
    }

    #[test]
    fn one_protected_change_blocks_the_whole_save() {
        let task = sample_task();
        let mut edit = PendingEdit::open(&task);
        edit.set(Field::Status, Some("Completed"));
        edit.set(Field::DueDate, Some("2025-08-01 09:00:00"));

        let err = edit
            .validate(&technician(), ELEVATED, Lang::En)
            .unwrap_err();
        assert!(err.to_string().contains("due_date"));

        // Dropping the protected change lets the allowed one through.
        let mut ok_edit = PendingEdit::open(&task);
        ok_edit.set(Field::Status, Some("Completed"));
        ok_edit.set(Field::CompletionNotes, Some("done"));
        assert!(ok_edit.validate(&technician(), ELEVATED, Lang::En).is_ok());
    }

    #[test]
    fn elevated_viewer_saves_protected_changes() {
        let task = sample_task();
        let mut edit = PendingEdit::open(&task);
        edit.set(Field::Title, Some("Replace filter (urgent)"));
        edit.set(Field::AssignedRole, Some("Supervisor"));
        assert!(edit.validate(&manager(), ELEVATED, Lang::En).is_ok());
    }

    #[test]
    fn whitespace_only_values_do_not_count_as_changes() {
        let task = sample_task();
        let mut edit = PendingEdit::open(&task);
        edit.set(Field::AssignedTo, Some("   "));
        assert!(edit.changed_fields().is_empty());
    }
}
