use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::{self, PLACEHOLDER};
use crate::i18n::{self, Lang, Msg};
use crate::rpc::TaskListResponse;
use crate::task::{Badge, Status, Task, TaskStats};

/// ANSI text renderer for the task table. Every call rewrites the
/// whole table from the given response; nothing is appended to
/// earlier output state.
#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    lang: Lang,
}

const HEADERS: [&str; 7] = [
    "Task",
    "UTC Due",
    "Local Due",
    "Status",
    "Assigned To",
    "Role",
    "Actions",
];

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self {
            color,
            lang: cfg.lang(),
        })
    }

    #[tracing::instrument(skip(self, response))]
    pub fn print_task_table(
        &self,
        response: &TaskListResponse,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_task_table(&mut out, response, today)
    }

    /// Renders the full dashboard body: counter, table (or a
    /// placeholder row), stats summary.
    pub fn write_task_table<W: Write>(
        &self,
        out: &mut W,
        response: &TaskListResponse,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        if !response.success {
            let message = response
                .message
                .clone()
                .unwrap_or_else(|| i18n::text(self.lang, Msg::ErrorLoadingTasks).to_string());
            writeln!(out, "{}", self.paint(&message, "31"))?;
            return Ok(());
        }

        writeln!(
            out,
            "({} {})",
            response.count,
            i18n::text(self.lang, Msg::TaskWord)
        )?;

        if response.tasks.is_empty() {
            writeln!(out, "{}", i18n::text(self.lang, Msg::NoTasksFound))?;
            self.write_stats(out, &response.stats)?;
            return Ok(());
        }

        let mut rows = Vec::with_capacity(response.tasks.len());
        for task in &response.tasks {
            rows.push(self.task_row(task, today));
        }

        write_table(out, &HEADERS, rows)?;
        self.write_stats(out, &response.stats)?;
        Ok(())
    }

    fn task_row(&self, task: &Task, today: NaiveDate) -> Vec<String> {
        let overdue = datetime::overdue_on(task.local_due_or_utc(), today)
            && task.status != Status::Completed;

        let mut title = task.display_title().to_string();
        if let Some(notes) = task.notes.as_deref() {
            title.push_str(" · ");
            title.push_str(notes);
        }
        let title = if overdue {
            self.paint(&title, "31")
        } else {
            title
        };

        let utc_cell = datetime::format_compact(task.due_date.as_deref());
        let local_cell = datetime::format_compact(task.local_due_or_utc());
        let (utc_cell, local_cell) = if overdue {
            (self.paint(&utc_cell, "31"), self.paint(&local_cell, "31"))
        } else {
            (utc_cell, local_cell)
        };

        let status_cell = self.paint(task.status.label(), badge_code(task.status.badge()));

        let mut actions = Vec::new();
        if task.status != Status::Completed && task.can_edit {
            actions.push("complete");
        }
        actions.push("view");

        vec![
            title,
            utc_cell,
            local_cell,
            status_cell,
            task.assigned_to.clone().unwrap_or_else(|| PLACEHOLDER.to_string()),
            task.assigned_role.clone().unwrap_or_else(|| PLACEHOLDER.to_string()),
            actions.join(" "),
        ]
    }

    pub fn print_stats(&self, stats: &TaskStats) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_stats(&mut out, stats)
    }

    fn write_stats<W: Write>(&self, out: &mut W, stats: &TaskStats) -> anyhow::Result<()> {
        writeln!(
            out,
            "Total {} · Completed {} · In Progress {} · Pending {} · Overdue {}",
            stats.total,
            stats.completed,
            stats.in_progress,
            stats.pending,
            if stats.overdue > 0 {
                self.paint(&stats.overdue.to_string(), "31")
            } else {
                stats.overdue.to_string()
            }
        )?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task))]
    pub fn print_task_info(&self, task: &Task) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "name        {}", task.name)?;
        writeln!(out, "title       {}", task.display_title())?;
        writeln!(
            out,
            "status      {}",
            self.paint(task.status.label(), badge_code(task.status.badge()))
        )?;
        writeln!(
            out,
            "due         {}",
            datetime::dual_display(
                task.due_date.as_deref(),
                task.local_due_date.as_deref(),
                task.timezone.as_deref(),
                self.lang
            )
        )?;
        writeln!(
            out,
            "assigned    {}",
            task.assigned_to.as_deref().unwrap_or(PLACEHOLDER)
        )?;
        writeln!(
            out,
            "role        {}",
            task.assigned_role.as_deref().unwrap_or(PLACEHOLDER)
        )?;
        if let Some(organization) = task.organization.as_deref() {
            writeln!(out, "org         {organization}")?;
        }
        if let Some(parent) = task.parent.as_deref() {
            writeln!(out, "project     {parent}")?;
        }
        if let Some(notes) = task.notes.as_deref() {
            writeln!(out, "notes       {notes}")?;
        }
        if let Some(completion) = task.completion_notes.as_deref() {
            writeln!(out, "completion  {completion}")?;
        }
        writeln!(
            out,
            "created     {}",
            datetime::format_compact(task.creation.as_deref())
        )?;
        writeln!(
            out,
            "modified    {}",
            datetime::format_compact(task.modified.as_deref())
        )?;

        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn badge_code(badge: Badge) -> &'static str {
    match badge {
        Badge::Primary => "34",
        Badge::Warning => "33",
        Badge::Info => "36",
        Badge::Success => "32",
        Badge::Secondary => "90",
    }
}

fn write_table<W: Write>(
    writer: &mut W,
    headers: &[&str],
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths: Vec<usize> = headers
        .iter()
        .map(|header| UnicodeWidthStr::width(*header))
        .collect();

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::Renderer;
    use crate::config::Config;
    use crate::i18n::Lang;
    use crate::rpc::TaskListResponse;
    use crate::task::{Status, Task, TaskStats};

    fn renderer() -> Renderer {
        Renderer::new(&Config::test_defaults()).expect("renderer")
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 22).unwrap()
    }

    fn render(response: &TaskListResponse) -> String {
        let mut buf = Vec::new();
        renderer()
            .write_task_table(&mut buf, response, today())
            .expect("render");
        String::from_utf8(buf).expect("utf8")
    }

    fn loaded(tasks: Vec<Task>) -> TaskListResponse {
        TaskListResponse {
            success: true,
            count: tasks.len() as u64,
            stats: TaskStats {
                total: tasks.len() as u64,
                ..TaskStats::default()
            },
            tasks,
            message: None,
        }
    }

    #[test]
    fn empty_result_renders_placeholder_not_table() {
        let output = render(&loaded(vec![]));
        assert!(output.contains("No tasks found"));
        assert!(!output.contains("Assigned To"));
    }

    #[test]
    fn error_result_renders_server_message() {
        let response = TaskListResponse::failure("boom".to_string());
        let output = render(&response);
        assert!(output.contains("boom"));
        assert!(!output.contains("Task(s)"));
    }

    #[test]
    fn complete_action_is_gated_on_status_and_capability() {
        let mut editable = Task::new("TASK-0001", "Replace filter", Status::Pending);
        editable.can_edit = true;
        let mut done = Task::new("TASK-0002", "Clean tank", Status::Completed);
        done.can_edit = true;
        let readonly = Task::new("TASK-0003", "Inspect pump", Status::Open);

        let output = render(&loaded(vec![editable, done, readonly]));
        let lines: Vec<&str> = output.lines().collect();
        let row = |needle: &str| {
            lines
                .iter()
                .find(|line| line.contains(needle))
                .copied()
                .expect("row present")
        };
        assert!(row("Replace filter").contains("complete view"));
        assert!(!row("Clean tank").contains("complete"));
        assert!(!row("Inspect pump").contains("complete"));
    }

    #[test]
    fn malformed_due_date_renders_placeholder_row() {
        let mut task = Task::new("TASK-0001", "Replace filter", Status::Pending);
        task.due_date = Some("definitely not a date".to_string());
        let output = render(&loaded(vec![task]));
        assert!(output.contains("—"));
    }

    #[test]
    fn lang_follows_config() {
        let mut cfg = Config::test_defaults();
        cfg.apply_overrides([("lang".to_string(), "ar".to_string())]);
        assert_eq!(cfg.lang(), Lang::Ar);

        let renderer = Renderer::new(&cfg).expect("renderer");
        let mut buf = Vec::new();
        renderer
            .write_task_table(&mut buf, &loaded(vec![]), today())
            .expect("render");
        let output = String::from_utf8(buf).expect("utf8");
        assert!(output.contains("لا توجد مهام"));
    }
}
