use chrono::NaiveDate;

use crate::datetime::{self, PLACEHOLDER};
use crate::i18n::{self, Lang, Msg};
use crate::rpc::TaskListResponse;
use crate::task::{Status, Task};

const COLUMN_COUNT: usize = 7;

/// Escapes task-supplied text for HTML embedding. Everything that
/// originated on the wire goes through here before it reaches markup.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn escape_opt(raw: Option<&str>) -> String {
    match raw {
        Some(value) => escape_html(value),
        None => PLACEHOLDER.to_string(),
    }
}

/// Table body for the dashboard: one `<tr>` per task, or a single
/// placeholder row for the empty and error cases. The caller swaps
/// the whole body in; re-rendering is an idempotent replace.
pub fn render_table_body(response: &TaskListResponse, today: NaiveDate, lang: Lang) -> String {
    if !response.success {
        let message = response
            .message
            .clone()
            .unwrap_or_else(|| i18n::text(lang, Msg::ErrorLoadingTasks).to_string());
        return placeholder_row("alert-danger", &escape_html(&message));
    }

    if response.tasks.is_empty() {
        return placeholder_row("alert-info", i18n::text(lang, Msg::NoTasksFound));
    }

    let mut body = String::new();
    for task in &response.tasks {
        body.push_str(&render_row(task, today));
    }
    body
}

fn placeholder_row(alert_class: &str, message: &str) -> String {
    format!(
        "<tr><td colspan=\"{COLUMN_COUNT}\" class=\"text-center\">\
         <div class=\"alert {alert_class} mb-0\">{message}</div></td></tr>\n"
    )
}

fn render_row(task: &Task, today: NaiveDate) -> String {
    let overdue =
        datetime::overdue_on(task.local_due_or_utc(), today) && task.status != Status::Completed;

    let row_class = if overdue { " class=\"table-danger\"" } else { "" };
    let date_class = if overdue { " class=\"text-danger\"" } else { "" };

    let mut title_cell = format!("<strong>{}</strong>", escape_html(task.display_title()));
    if let Some(notes) = task.notes.as_deref() {
        title_cell.push_str(&format!(
            "<br><small class=\"text-muted\">{}</small>",
            escape_html(notes)
        ));
    }

    let mut actions = String::new();
    if task.status != Status::Completed && task.can_edit {
        actions.push_str(&format!(
            "<button class=\"btn btn-success btn-sm\" data-action=\"complete\" \
             data-task=\"{}\">Complete</button>",
            escape_html(&task.name)
        ));
    }
    actions.push_str(&format!(
        "<button class=\"btn btn-info btn-sm\" data-action=\"view\" data-task=\"{}\">\
         View</button>",
        escape_html(&task.name)
    ));

    format!(
        "<tr{row_class}>\
         <td>{title_cell}</td>\
         <td><span{date_class}>{utc}</span></td>\
         <td><span{date_class}>{local}</span></td>\
         <td><span class=\"badge badge-{badge}\">{status}</span></td>\
         <td>{assignee}</td>\
         <td>{role}</td>\
         <td>{actions}</td>\
         </tr>\n",
        utc = datetime::format_compact(task.due_date.as_deref()),
        local = datetime::format_compact(task.local_due_or_utc()),
        badge = task.status.badge().class(),
        status = escape_html(task.status.label()),
        assignee = escape_opt(task.assigned_to.as_deref()),
        role = escape_opt(task.assigned_role.as_deref()),
    )
}

/// Standalone HTML table for `export --format html`.
pub fn render_table(response: &TaskListResponse, today: NaiveDate, lang: Lang) -> String {
    let headers = [
        "Task",
        "UTC Due Date",
        "Local Due Date",
        "Status",
        "Assigned To",
        "Role",
        "Actions",
    ];
    let head: String = headers
        .iter()
        .map(|h| format!("<th>{h}</th>"))
        .collect();
    format!(
        "<table class=\"table\"><thead><tr>{head}</tr></thead>\n<tbody>\n{}</tbody></table>\n",
        render_table_body(response, today, lang)
    )
}

/// Detail panel for a single task, dual-timezone due date included.
pub fn render_details(task: &Task, lang: Lang) -> String {
    let mut out = format!("<h4>{}</h4>", escape_html(task.display_title()));
    out.push_str(&format!(
        "<p><strong>Status:</strong> <span class=\"badge badge-{}\">{}</span></p>",
        task.status.badge().class(),
        escape_html(task.status.label())
    ));
    out.push_str(&format!(
        "<p><strong>Due:</strong> {}</p>",
        escape_html(&datetime::dual_display(
            task.due_date.as_deref(),
            task.local_due_date.as_deref(),
            task.timezone.as_deref(),
            lang
        ))
    ));
    out.push_str(&format!(
        "<p><strong>Assigned To:</strong> {}</p>",
        escape_opt(task.assigned_to.as_deref())
    ));
    out.push_str(&format!(
        "<p><strong>Role:</strong> {}</p>",
        escape_opt(task.assigned_role.as_deref())
    ));
    if let Some(parent) = task.parent.as_deref() {
        out.push_str(&format!(
            "<p><strong>Project:</strong> {}</p>",
            escape_html(parent)
        ));
    }
    if let Some(notes) = task.notes.as_deref() {
        out.push_str(&format!(
            "<div class=\"task-notes\"><strong>Notes:</strong> {}</div>",
            escape_html(notes)
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{escape_html, render_details, render_table_body};
    use crate::i18n::Lang;
    use crate::rpc::TaskListResponse;
    use crate::task::{Status, Task, TaskStats};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 22).unwrap()
    }

    fn loaded(tasks: Vec<Task>) -> TaskListResponse {
        TaskListResponse {
            success: true,
            count: tasks.len() as u64,
            stats: TaskStats::default(),
            tasks,
            message: None,
        }
    }

    #[test]
    fn task_text_is_escaped() {
        let mut task = Task::new("TASK-0001", "<script>alert(1)</script>", Status::Open);
        task.notes = Some("a & b".to_string());
        let body = render_table_body(&loaded(vec![task]), today(), Lang::En);
        assert!(!body.contains("<script>"));
        assert!(body.contains("&lt;script&gt;"));
        assert!(body.contains("a &amp; b"));
    }

    #[test]
    fn overdue_styling_skips_completed() {
        let mut late = Task::new("TASK-0001", "Replace filter", Status::Pending);
        late.local_due_date = Some("2025-07-20 10:00:00".to_string());
        let mut done = Task::new("TASK-0002", "Clean tank", Status::Completed);
        done.local_due_date = Some("2025-07-20 10:00:00".to_string());

        let body = render_table_body(&loaded(vec![late, done]), today(), Lang::En);
        let rows: Vec<&str> = body.lines().collect();
        assert!(rows[0].contains("table-danger"));
        assert!(rows[0].contains("text-danger"));
        assert!(!rows[1].contains("table-danger"));
    }

    #[test]
    fn empty_and_error_render_single_placeholder_rows() {
        let empty = render_table_body(&loaded(vec![]), today(), Lang::En);
        assert_eq!(empty.matches("<tr>").count(), 1);
        assert!(empty.contains("No tasks found"));

        let failed = TaskListResponse::failure("server exploded".to_string());
        let error = render_table_body(&failed, today(), Lang::En);
        assert_eq!(error.matches("<tr>").count(), 1);
        assert!(error.contains("alert-danger"));
        assert!(error.contains("server exploded"));
    }

    #[test]
    fn complete_button_requires_capability() {
        let mut editable = Task::new("TASK-0001", "Replace filter", Status::Pending);
        editable.can_edit = true;
        let readonly = Task::new("TASK-0002", "Inspect pump", Status::Open);

        let body = render_table_body(&loaded(vec![editable, readonly]), today(), Lang::En);
        let rows: Vec<&str> = body.lines().collect();
        assert!(rows[0].contains("data-action=\"complete\""));
        assert!(!rows[1].contains("data-action=\"complete\""));
        assert!(rows[1].contains("data-action=\"view\""));
    }

    #[test]
    fn details_include_dual_timezone_line() {
        let mut task = Task::new("TASK-0001", "Replace filter", Status::Pending);
        task.due_date = Some("2025-07-22 13:00:00".to_string());
        task.local_due_date = Some("2025-07-22 15:00:00".to_string());
        task.timezone = Some("Africa/Cairo".to_string());

        let html = render_details(&task, Lang::En);
        assert!(html.contains("Africa/Cairo"));
        assert!(html.contains("UTC: 1:00 PM"));

        let arabic = render_details(&task, Lang::Ar);
        assert!(arabic.contains("يوليو"));
    }

    #[test]
    fn escape_handles_quotes() {
        assert_eq!(escape_html(r#"a"b'c"#), "a&quot;b&#39;c");
    }
}
