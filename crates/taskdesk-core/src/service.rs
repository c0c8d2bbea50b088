use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::datastore::DataStore;
use crate::datetime::{self, parse_wire_datetime};
use crate::filter::{search_matches, DueFilter};
use crate::i18n::{self, Lang, Msg};
use crate::protect::{Field, PendingEdit, ALWAYS_ALLOWED};
use crate::rpc::{
    Ack, ExportResponse, TaskDetailResponse, TaskListResponse, TaskQuery, TaskService,
};
use crate::task::{Status, Task, TaskStats, Viewer};

/// In-process task service over the JSONL datastore. Reproduces the
/// remote service's contract: role-scoped visibility, filter
/// dimensions, stats, capability flags, and the authoritative
/// re-check of field protection on every mutation.
#[derive(Debug)]
pub struct LocalTaskService {
    store: DataStore,
    viewer: Viewer,
    elevated_role: String,
    lang: Lang,
    fixed_today: Option<NaiveDate>,
}

impl LocalTaskService {
    pub fn new(store: DataStore, viewer: Viewer, elevated_role: &str, lang: Lang) -> Self {
        Self {
            store,
            viewer,
            elevated_role: elevated_role.to_string(),
            lang,
            fixed_today: None,
        }
    }

    /// Pins "today" for deterministic tests.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.fixed_today = Some(today);
        self
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    fn today(&self) -> NaiveDate {
        self.fixed_today
            .unwrap_or_else(|| datetime::today_for_viewer(Utc::now()))
    }

    fn is_elevated(&self) -> bool {
        self.viewer.is_elevated(&self.elevated_role)
    }

    /// Visibility rule: an individually assigned task is only visible
    /// to its assignee; a role-assigned task without an assignee is
    /// visible to every holder of the role.
    fn visible(&self, task: &Task) -> bool {
        if self.is_elevated() {
            return true;
        }
        if let Some(assignee) = task.assigned_to.as_deref() {
            return assignee == self.viewer.user;
        }
        task.assigned_role
            .as_deref()
            .is_some_and(|role| self.viewer.has_role(role))
    }

    fn can_edit(&self, task: &Task) -> bool {
        if self.is_elevated() {
            return true;
        }
        if let Some(assignee) = task.assigned_to.as_deref() {
            return assignee == self.viewer.user;
        }
        if let Some(role) = task.assigned_role.as_deref() {
            return self.viewer.has_role(role);
        }
        false
    }

    fn due_at(task: &Task) -> Option<chrono::NaiveDateTime> {
        task.due_date.as_deref().and_then(parse_wire_datetime)
    }

    fn due_day(task: &Task) -> Option<NaiveDate> {
        Self::due_at(task).map(|dt| dt.date())
    }

    /// Permission + status + due-bucket scope. The search term is
    /// deliberately excluded here: stats describe the filtered set,
    /// not the searched subset.
    fn scoped_tasks(&self, query: &TaskQuery) -> anyhow::Result<Vec<Task>> {
        let today = self.today();
        let status_filter = match query.status.as_deref() {
            None | Some("All") => None,
            Some(raw) => Some(
                Status::parse(raw).ok_or_else(|| anyhow::anyhow!("unknown status: {raw}"))?,
            ),
        };
        let due_filter = match query.due_filter.as_deref() {
            None => DueFilter::All,
            Some(raw) => DueFilter::parse(raw)
                .ok_or_else(|| anyhow::anyhow!("unknown due bucket: {raw}"))?,
        };

        let tasks = self
            .store
            .load_tasks()?
            .into_iter()
            .filter(|task| self.visible(task))
            .filter(|task| status_filter.is_none_or(|wanted| task.status == wanted))
            .filter(|task| due_filter.matches(Self::due_day(task), task.status, today))
            .collect();
        Ok(tasks)
    }

    fn stats_for(&self, tasks: &[Task]) -> TaskStats {
        let today = self.today();
        let mut stats = TaskStats {
            total: tasks.len() as u64,
            ..TaskStats::default()
        };
        for task in tasks {
            match task.status {
                Status::Completed => stats.completed += 1,
                Status::InProgress => stats.in_progress += 1,
                Status::Pending => stats.pending += 1,
                _ => {}
            }
            if task.status != Status::Completed
                && Self::due_day(task).is_some_and(|due| due < today)
            {
                stats.overdue += 1;
            }
        }
        stats
    }

    fn find_task(&self, task_name: &str) -> anyhow::Result<Option<Task>> {
        Ok(self
            .store
            .load_tasks()?
            .into_iter()
            .find(|task| task.name == task_name))
    }

    fn touch_modified(task: &mut Task) {
        task.modified = Some(Utc::now().format("%Y-%m-%d %H:%M:%S").to_string());
    }

    fn apply_field(task: &mut Task, field: Field, value: Option<&str>) -> anyhow::Result<()> {
        let owned = value.map(str::to_string);
        match field {
            Field::Title => {
                task.title = owned.unwrap_or_default();
            }
            Field::DueDate => task.due_date = owned,
            Field::LocalDueDate => task.local_due_date = owned,
            Field::Timezone => task.timezone = owned,
            Field::Organization => task.organization = owned,
            Field::AssignedTo => task.assigned_to = owned,
            Field::AssignedRole => task.assigned_role = owned,
            Field::Parent => task.parent = owned,
            Field::Status => {
                let raw = value.unwrap_or_default();
                task.status = Status::parse(raw)
                    .ok_or_else(|| anyhow::anyhow!("invalid status value: {raw}"))?;
            }
            Field::Notes => task.notes = owned,
            Field::CompletionNotes => task.completion_notes = owned,
        }
        Ok(())
    }
}

impl TaskService for LocalTaskService {
    #[instrument(skip(self, query), fields(user = %self.viewer.user))]
    fn get_my_tasks(&self, query: &TaskQuery) -> anyhow::Result<TaskListResponse> {
        let scoped = match self.scoped_tasks(query) {
            Ok(scoped) => scoped,
            Err(err) => {
                warn!(error = %err, "task query rejected");
                return Ok(TaskListResponse::failure(format!(
                    "{}: {err}",
                    i18n::text(self.lang, Msg::ErrorLoadingTasks)
                )));
            }
        };
        let stats = self.stats_for(&scoped);

        let mut listed: Vec<Task> = scoped
            .into_iter()
            .filter(|task| match query.search_term.as_deref() {
                Some(term) => search_matches(term, &task.title, task.notes.as_deref()),
                None => true,
            })
            .map(|mut task| {
                task.can_edit = self.can_edit(&task);
                task
            })
            .collect();

        // Server ordering: due date ascending with null due dates
        // first, full datetime within a day, then newest creation
        // first.
        listed.sort_by(|a, b| {
            let due_a = Self::due_at(a);
            let due_b = Self::due_at(b);
            match (due_a, due_b) {
                (Some(a_at), Some(b_at)) if a_at != b_at => a_at.cmp(&b_at),
                (None, Some(_)) => std::cmp::Ordering::Less,
                (Some(_), None) => std::cmp::Ordering::Greater,
                _ => b.creation.cmp(&a.creation),
            }
        });

        debug!(count = listed.len(), total = stats.total, "task list assembled");
        Ok(TaskListResponse {
            success: true,
            count: listed.len() as u64,
            tasks: listed,
            stats,
            message: None,
        })
    }

    #[instrument(skip(self), fields(user = %self.viewer.user))]
    fn mark_task_completed(&self, task_name: &str) -> anyhow::Result<Ack> {
        let Some(mut task) = self.find_task(task_name)? else {
            return Ok(Ack::rejected(
                i18n::text(self.lang, Msg::TaskDoesNotExist).to_string(),
            ));
        };

        if !self.can_edit(&task) {
            warn!(task = task_name, "completion rejected: no edit capability");
            return Ok(Ack::rejected(
                i18n::text(self.lang, Msg::NoPermissionToEdit).to_string(),
            ));
        }

        task.status = Status::Completed;
        Self::touch_modified(&mut task);
        self.store.upsert_task(task)?;
        info!(task = task_name, "task marked completed");
        Ok(Ack::ok(i18n::text(self.lang, Msg::TaskCompleted)))
    }

    #[instrument(skip(self), fields(user = %self.viewer.user))]
    fn get_task_details(&self, task_name: &str) -> anyhow::Result<TaskDetailResponse> {
        let Some(mut task) = self.find_task(task_name)? else {
            return Ok(TaskDetailResponse {
                success: false,
                task: None,
                message: Some(i18n::text(self.lang, Msg::TaskDoesNotExist).to_string()),
            });
        };

        if !self.visible(&task) {
            return Ok(TaskDetailResponse {
                success: false,
                task: None,
                message: Some(i18n::text(self.lang, Msg::NoPermissionToView).to_string()),
            });
        }

        task.can_edit = self.can_edit(&task);
        Ok(TaskDetailResponse {
            success: true,
            task: Some(task),
            message: None,
        })
    }

    #[instrument(skip(self, query), fields(user = %self.viewer.user))]
    fn export_tasks(&self, query: &TaskQuery) -> anyhow::Result<ExportResponse> {
        let listed = self.get_my_tasks(query)?;
        if !listed.success {
            return Ok(ExportResponse {
                success: false,
                headers: vec![],
                rows: vec![],
                message: listed.message,
            });
        }

        let headers: Vec<String> = [
            "Task Title",
            "Status",
            "Due Date",
            "Local Due Date",
            "Assigned To",
            "Assigned Role",
            "Notes",
            "Created",
            "Modified",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();

        let opt = |value: &Option<String>| match value {
            Some(v) => Value::String(v.clone()),
            None => Value::Null,
        };
        let rows = listed
            .tasks
            .iter()
            .map(|task| {
                vec![
                    Value::String(task.display_title().to_string()),
                    Value::String(task.status.label().to_string()),
                    opt(&task.due_date),
                    opt(&task.local_due_date),
                    opt(&task.assigned_to),
                    opt(&task.assigned_role),
                    opt(&task.notes),
                    opt(&task.creation),
                    opt(&task.modified),
                ]
            })
            .collect();

        Ok(ExportResponse {
            success: true,
            headers,
            rows,
            message: None,
        })
    }

    #[instrument(skip(self), fields(user = %self.viewer.user))]
    fn get_todays_tasks(&self) -> anyhow::Result<Vec<Task>> {
        let today = self.today();
        let mut tasks: Vec<Task> = self
            .store
            .load_tasks()?
            .into_iter()
            .filter(|task| self.visible(task))
            .filter(|task| Self::due_day(task) == Some(today))
            .map(|mut task| {
                task.can_edit = self.can_edit(&task);
                task
            })
            .collect();
        tasks.sort_by(|a, b| a.due_date.cmp(&b.due_date));
        Ok(tasks)
    }

    #[instrument(skip(self, value), fields(user = %self.viewer.user))]
    fn set_task_field(&self, task_name: &str, field: &str, value: &str) -> anyhow::Result<Ack> {
        let Some(parsed) = Field::parse(field) else {
            return Ok(Ack::rejected(format!("unknown field: {field}")));
        };

        let Some(mut task) = self.find_task(task_name)? else {
            return Ok(Ack::rejected(
                i18n::text(self.lang, Msg::TaskDoesNotExist).to_string(),
            ));
        };

        if !self.can_edit(&task) {
            return Ok(Ack::rejected(
                i18n::text(self.lang, Msg::NoPermissionToEdit).to_string(),
            ));
        }

        // Authoritative protection re-check, independent of whatever
        // the client overlay allowed.
        if !self.is_elevated() && !ALWAYS_ALLOWED.contains(&parsed) {
            warn!(task = task_name, field, "field write rejected by protection");
            return Ok(Ack::rejected(i18n::cannot_edit_fields(
                self.lang,
                parsed.as_str(),
            )));
        }

        Self::apply_field(&mut task, parsed, Some(value))?;
        Self::touch_modified(&mut task);
        self.store.upsert_task(task)?;
        info!(task = task_name, field, "field updated");
        Ok(Ack::ok(i18n::text(self.lang, Msg::TaskUpdated)))
    }

    #[instrument(skip(self, edit), fields(user = %self.viewer.user))]
    fn update_task(
        &self,
        task_name: &str,
        edit: &PendingEdit,
    ) -> anyhow::Result<TaskDetailResponse> {
        let Some(mut task) = self.find_task(task_name)? else {
            return Ok(TaskDetailResponse {
                success: false,
                task: None,
                message: Some(i18n::text(self.lang, Msg::TaskDoesNotExist).to_string()),
            });
        };

        if !self.can_edit(&task) {
            return Ok(TaskDetailResponse {
                success: false,
                task: None,
                message: Some(i18n::text(self.lang, Msg::NoPermissionToEdit).to_string()),
            });
        }

        if let Err(err) = edit.validate(&self.viewer, &self.elevated_role, self.lang) {
            return Ok(TaskDetailResponse {
                success: false,
                task: None,
                message: Some(err.to_string()),
            });
        }

        for field in edit.changed_fields() {
            Self::apply_field(&mut task, field, edit.get(field))?;
        }
        Self::touch_modified(&mut task);
        self.store.upsert_task(task.clone())?;
        task.can_edit = true;
        Ok(TaskDetailResponse {
            success: true,
            task: Some(task),
            message: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tempfile::tempdir;

    use super::LocalTaskService;
    use crate::datastore::DataStore;
    use crate::i18n::Lang;
    use crate::protect::PendingEdit;
    use crate::rpc::{TaskQuery, TaskService};
    use crate::task::{Status, Task, Viewer};

    const ELEVATED: &str = "System Manager";

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 22).unwrap()
    }

    fn seed(store: &DataStore) {
        let mut mine = Task::new("TASK-0001", "Replace filter", Status::Pending);
        mine.assigned_to = Some("tech@example.com".to_string());
        mine.due_date = Some("2025-07-20 10:00:00".to_string());
        mine.creation = Some("2025-07-01 08:00:00".to_string());

        let mut role_task = Task::new("TASK-0002", "Inspect pump", Status::InProgress);
        role_task.assigned_role = Some("Technician".to_string());
        role_task.due_date = Some("2025-07-22 09:00:00".to_string());
        role_task.notes = Some("north boiler room".to_string());
        role_task.creation = Some("2025-07-02 08:00:00".to_string());

        // Role matches but an individual assignee wins: invisible to
        // other role holders.
        let mut someone_elses = Task::new("TASK-0003", "Calibrate sensor", Status::Open);
        someone_elses.assigned_role = Some("Technician".to_string());
        someone_elses.assigned_to = Some("other@example.com".to_string());
        someone_elses.due_date = Some("2025-07-23 09:00:00".to_string());

        let mut done = Task::new("TASK-0004", "Clean tank", Status::Completed);
        done.assigned_to = Some("tech@example.com".to_string());
        done.due_date = Some("2025-07-10 09:00:00".to_string());

        for task in [mine, role_task, someone_elses, done] {
            store.upsert_task(task).expect("seed task");
        }
    }

    fn service_for(dir: &std::path::Path, viewer: Viewer) -> LocalTaskService {
        let store = DataStore::open(dir).expect("open datastore");
        seed(&store);
        LocalTaskService::new(store, viewer, ELEVATED, Lang::En).with_today(today())
    }

    #[test]
    fn visibility_scopes_to_assignee_and_role() {
        let temp = tempdir().expect("tempdir");
        let service = service_for(temp.path(), Viewer::new("tech@example.com", &["Technician"]));

        let response = service.get_my_tasks(&TaskQuery::default()).expect("fetch");
        assert!(response.success);
        let names: Vec<&str> = response.tasks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["TASK-0004", "TASK-0001", "TASK-0002"]);
        assert!(response.tasks.iter().all(|t| t.can_edit));
    }

    #[test]
    fn elevated_viewer_sees_everything() {
        let temp = tempdir().expect("tempdir");
        let service = service_for(temp.path(), Viewer::new("admin@example.com", &[ELEVATED]));
        let response = service.get_my_tasks(&TaskQuery::default()).expect("fetch");
        assert_eq!(response.count, 4);
    }

    #[test]
    fn stats_ignore_search_but_count_overdue() {
        let temp = tempdir().expect("tempdir");
        let service = service_for(temp.path(), Viewer::new("tech@example.com", &["Technician"]));

        let query = TaskQuery {
            search_term: Some("pump".to_string()),
            ..TaskQuery::default()
        };
        let response = service.get_my_tasks(&query).expect("fetch");
        assert_eq!(response.count, 1);
        assert_eq!(response.tasks[0].name, "TASK-0002");

        // Stats describe the scoped set, not the searched subset.
        assert_eq!(response.stats.total, 3);
        assert_eq!(response.stats.completed, 1);
        assert_eq!(response.stats.in_progress, 1);
        assert_eq!(response.stats.pending, 1);
        // TASK-0001 is past due; completed TASK-0004 is not counted.
        assert_eq!(response.stats.overdue, 1);
    }

    #[test]
    fn due_bucket_filters_apply_before_stats() {
        let temp = tempdir().expect("tempdir");
        let service = service_for(temp.path(), Viewer::new("tech@example.com", &["Technician"]));

        let query = TaskQuery {
            due_filter: Some("today".to_string()),
            ..TaskQuery::default()
        };
        let response = service.get_my_tasks(&query).expect("fetch");
        assert_eq!(response.count, 1);
        assert_eq!(response.tasks[0].name, "TASK-0002");
        assert_eq!(response.stats.total, 1);
    }

    #[test]
    fn unknown_filter_is_an_application_failure_not_a_transport_error() {
        let temp = tempdir().expect("tempdir");
        let service = service_for(temp.path(), Viewer::new("tech@example.com", &["Technician"]));
        let query = TaskQuery {
            status: Some("Bogus".to_string()),
            ..TaskQuery::default()
        };
        let response = service.get_my_tasks(&query).expect("call completes");
        assert!(!response.success);
        assert!(response.message.is_some());
    }

    #[test]
    fn completion_respects_capability() {
        let temp = tempdir().expect("tempdir");
        let service = service_for(temp.path(), Viewer::new("tech@example.com", &["Technician"]));

        let denied = service.mark_task_completed("TASK-0003").expect("call");
        assert!(!denied.success);

        let ok = service.mark_task_completed("TASK-0002").expect("call");
        assert!(ok.success);
        let details = service.get_task_details("TASK-0002").expect("details");
        assert_eq!(details.task.expect("task").status, Status::Completed);
    }

    #[test]
    fn set_task_field_recheck_blocks_protected_fields() {
        let temp = tempdir().expect("tempdir");
        let service = service_for(temp.path(), Viewer::new("tech@example.com", &["Technician"]));

        let denied = service
            .set_task_field("TASK-0001", "due_date", "2025-09-01 10:00:00")
            .expect("call");
        assert!(!denied.success);
        assert!(denied.message.expect("message").contains("due_date"));

        let ok = service
            .set_task_field("TASK-0001", "status", "In Progress")
            .expect("call");
        assert!(ok.success);
    }

    #[test]
    fn generic_field_write_ack_does_not_claim_completion() {
        let temp = tempdir().expect("tempdir");
        let service = service_for(temp.path(), Viewer::new("tech@example.com", &["Technician"]));

        let ack = service
            .set_task_field("TASK-0001", "status", "In Progress")
            .expect("call");
        assert!(ack.success);
        assert_eq!(ack.message.as_deref(), Some("Task updated successfully"));

        let done = service.mark_task_completed("TASK-0001").expect("call");
        assert_eq!(done.message.as_deref(), Some("Task completed successfully"));
    }

    #[test]
    fn ordering_puts_missing_due_first_then_full_datetime() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");

        let mut undated_newer = Task::new("TASK-0010", "Plan audit", Status::Open);
        undated_newer.assigned_to = Some("tech@example.com".to_string());
        undated_newer.creation = Some("2025-07-05 08:00:00".to_string());

        let mut undated_older = Task::new("TASK-0011", "Order parts", Status::Open);
        undated_older.assigned_to = Some("tech@example.com".to_string());
        undated_older.creation = Some("2025-07-01 08:00:00".to_string());

        let mut late_morning = Task::new("TASK-0012", "Inspect pump", Status::Open);
        late_morning.assigned_to = Some("tech@example.com".to_string());
        late_morning.due_date = Some("2025-07-22 09:00:00".to_string());

        let mut early_morning = Task::new("TASK-0013", "Replace filter", Status::Open);
        early_morning.assigned_to = Some("tech@example.com".to_string());
        early_morning.due_date = Some("2025-07-22 08:00:00".to_string());

        for task in [undated_newer, undated_older, late_morning, early_morning] {
            store.upsert_task(task).expect("seed task");
        }

        let service = LocalTaskService::new(
            store,
            Viewer::new("tech@example.com", &[]),
            ELEVATED,
            Lang::En,
        )
        .with_today(today());

        let response = service.get_my_tasks(&TaskQuery::default()).expect("fetch");
        let names: Vec<&str> = response.tasks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["TASK-0010", "TASK-0011", "TASK-0013", "TASK-0012"]
        );
    }

    #[test]
    fn update_task_applies_a_snapshot_diff() {
        let temp = tempdir().expect("tempdir");
        let service = service_for(temp.path(), Viewer::new("tech@example.com", &["Technician"]));

        let before = service
            .get_task_details("TASK-0001")
            .expect("details")
            .task
            .expect("task");
        let mut after = before.clone();
        after.status = Status::Completed;
        after.completion_notes = Some("replaced with spare".to_string());

        let edit = PendingEdit::between(&before, &after);
        let saved = service.update_task("TASK-0001", &edit).expect("update");
        assert!(saved.success);

        let reloaded = service
            .get_task_details("TASK-0001")
            .expect("details")
            .task
            .expect("task");
        assert_eq!(reloaded.status, Status::Completed);
        assert_eq!(reloaded.completion_notes.as_deref(), Some("replaced with spare"));
    }

    #[test]
    fn todays_feed_lists_only_today() {
        let temp = tempdir().expect("tempdir");
        let service = service_for(temp.path(), Viewer::new("tech@example.com", &["Technician"]));
        let tasks = service.get_todays_tasks().expect("feed");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "TASK-0002");
    }
}
