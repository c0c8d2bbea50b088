use std::thread;
use std::time::Duration as StdDuration;

use anyhow::{Context, anyhow};
use chrono::{Duration, Utc};
use tracing::{debug, info, instrument, warn};

use crate::cli::Invocation;
use crate::config::Config;
use crate::controller::Dashboard;
use crate::datetime;
use crate::export;
use crate::filter::FilterState;
use crate::render::Renderer;
use crate::rpc::{TaskListResponse, TaskQuery, TaskService};
use crate::service::LocalTaskService;
use crate::task::{Status, Task, TaskStats};
use crate::view;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "list", "today", "show", "complete", "status", "export", "stats", "watch", "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(service, cfg, renderer, inv))]
pub fn dispatch(
    service: LocalTaskService,
    cfg: &Config,
    renderer: &Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let command = inv.command.as_str();
    debug!(
        command,
        filter = ?inv.filter_terms,
        args = ?inv.command_args,
        "dispatching command"
    );

    match command {
        "list" => cmd_list(&service, renderer, &inv.filter_terms, &inv.command_args),
        "today" => cmd_today(&service, renderer),
        "show" => cmd_show(&service, renderer, &inv.command_args),
        "complete" => cmd_complete(&service, &inv.command_args),
        "status" => cmd_status(&service, &inv.command_args),
        "export" => cmd_export(&service, cfg, &inv.filter_terms, &inv.command_args),
        "stats" => cmd_stats(&service, renderer, &inv.filter_terms),
        "watch" => cmd_watch(service, cfg, renderer, &inv.filter_terms),
        "help" => cmd_help(),
        "version" => cmd_version(),
        other => Err(anyhow!("unknown command: {other}")),
    }
}

/// Filter terms may sit before or after the command token; both halves
/// feed the same parser.
fn parse_filters(filter_terms: &[String], command_args: &[String]) -> anyhow::Result<FilterState> {
    let mut terms = filter_terms.to_vec();
    terms.extend(command_args.iter().cloned());
    FilterState::parse(&terms)
}

#[instrument(skip_all)]
fn cmd_list(
    service: &LocalTaskService,
    renderer: &Renderer,
    filter_terms: &[String],
    command_args: &[String],
) -> anyhow::Result<()> {
    info!("command list");
    let filter = parse_filters(filter_terms, command_args)?;
    let response = service.get_my_tasks(&TaskQuery::from_filter(&filter))?;
    let today = datetime::today_for_viewer(Utc::now());
    renderer.print_task_table(&response, today)?;
    Ok(())
}

#[instrument(skip_all)]
fn cmd_today(service: &LocalTaskService, renderer: &Renderer) -> anyhow::Result<()> {
    info!("command today");
    let tasks = service.get_todays_tasks()?;
    let today = datetime::today_for_viewer(Utc::now());

    let stats = stats_of(&tasks);
    let response = TaskListResponse {
        success: true,
        count: tasks.len() as u64,
        tasks,
        stats,
        message: None,
    };
    renderer.print_task_table(&response, today)?;
    Ok(())
}

fn stats_of(tasks: &[Task]) -> TaskStats {
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
    }
    stats
}

#[instrument(skip_all)]
fn cmd_show(
    service: &LocalTaskService,
    renderer: &Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    let name = args.first().context("show requires a task name")?;
    let details = service.get_task_details(name)?;

    match details.task {
        Some(task) if details.success => renderer.print_task_info(&task),
        _ => {
            let message = details.message.unwrap_or_else(|| "not available".to_string());
            warn!(task = %name, message = %message, "show rejected");
            println!("{message}");
            Ok(())
        }
    }
}

#[instrument(skip_all)]
fn cmd_complete(service: &LocalTaskService, args: &[String]) -> anyhow::Result<()> {
    let name = args.first().context("complete requires a task name")?;

    let ack = service.mark_task_completed(name)?;
    let ack = if ack.success {
        ack
    } else {
        debug!(task = %name, "falling back to set_task_field");
        service.set_task_field(name, "status", "Completed")?
    };

    if let Some(message) = ack.message {
        println!("{message}");
    }
    if ack.success {
        Ok(())
    } else {
        Err(anyhow!("could not complete task {name}"))
    }
}

#[instrument(skip_all)]
fn cmd_status(service: &LocalTaskService, args: &[String]) -> anyhow::Result<()> {
    let name = args.first().context("status requires a task name")?;
    let value = args.get(1).context("status requires a new status value")?;

    let ack = service.set_task_field(name, "status", value)?;
    if let Some(message) = ack.message {
        println!("{message}");
    }
    if ack.success {
        Ok(())
    } else {
        Err(anyhow!("could not update task {name}"))
    }
}

#[instrument(skip_all)]
fn cmd_export(
    service: &LocalTaskService,
    cfg: &Config,
    filter_terms: &[String],
    command_args: &[String],
) -> anyhow::Result<()> {
    let (format, rest): (&str, &[String]) = match command_args.first().map(String::as_str) {
        Some("csv") => ("csv", &command_args[1..]),
        Some("html") => ("html", &command_args[1..]),
        _ => ("csv", command_args),
    };

    let filter = parse_filters(filter_terms, rest)?;
    let query = TaskQuery::from_filter(&filter);
    let today = datetime::today_for_viewer(Utc::now());

    match format {
        "html" => {
            let response = service.get_my_tasks(&query)?;
            print!("{}", view::render_table(&response, today, cfg.lang()));
        }
        _ => {
            let exported = service.export_tasks(&query)?;
            if !exported.success {
                let message = exported
                    .message
                    .unwrap_or_else(|| "export failed".to_string());
                return Err(anyhow!(message));
            }
            info!(
                rows = exported.rows.len(),
                filename = %export::export_filename(today),
                "export assembled"
            );
            print!("{}", export::to_csv(&exported.headers, &exported.rows));
        }
    }
    Ok(())
}

#[instrument(skip_all)]
fn cmd_stats(
    service: &LocalTaskService,
    renderer: &Renderer,
    filter_terms: &[String],
) -> anyhow::Result<()> {
    let filter = parse_filters(filter_terms, &[])?;
    let response = service.get_my_tasks(&TaskQuery::from_filter(&filter))?;
    if !response.success {
        return Err(anyhow!(
            response
                .message
                .unwrap_or_else(|| "stats unavailable".to_string())
        ));
    }
    renderer.print_stats(&response.stats)?;
    Ok(())
}

/// Live dashboard loop: debounced filter state plus the periodic
/// refresh, re-rendering whenever a fetch was admitted.
#[instrument(skip_all)]
fn cmd_watch(
    service: LocalTaskService,
    cfg: &Config,
    renderer: &Renderer,
    filter_terms: &[String],
) -> anyhow::Result<()> {
    let filter = parse_filters(filter_terms, &[])?;
    let refresh_secs = cfg.get_u64("refresh.seconds")?.unwrap_or(300);
    let select_ms = cfg.get_u64("debounce.select.ms")?.unwrap_or(300);
    let search_ms = cfg.get_u64("debounce.search.ms")?.unwrap_or(500);

    let now = Utc::now();
    let mut dashboard = Dashboard::new(
        service,
        cfg.lang(),
        now,
        Duration::seconds(refresh_secs as i64),
        Duration::milliseconds(select_ms as i64),
        Duration::milliseconds(search_ms as i64),
    );
    dashboard.set_status(filter.status, now);
    dashboard.set_due(filter.due, now);
    if !filter.search.is_empty() {
        dashboard.set_search(&filter.search, now);
    }
    dashboard.refresh_now(now);
    renderer.print_task_table(dashboard.view(), datetime::today_for_viewer(now))?;

    info!(refresh_secs, "entering watch loop");
    loop {
        thread::sleep(StdDuration::from_secs(1));
        let now = Utc::now();
        if dashboard.tick(now) {
            renderer.print_task_table(dashboard.view(), datetime::today_for_viewer(now))?;
        }
    }
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "Implemented commands: list, today, show, complete, status, export, stats, watch, help, version"
    );
    println!("Filters: status:<Open|Pending|\"In Progress\"|Completed|Cancelled> due:<today|week|month|overdue> <search terms>");
    Ok(())
}

fn cmd_version() -> anyhow::Result<()> {
    println!("mytasks {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}
