mod app;
mod board;
mod chat;
mod cli;
mod config;
mod db;
mod entities;
mod error;
mod forecast;
mod metrics;
mod model;
mod performance;
mod store;
mod util;

use std::collections::HashSet;

use chrono::{Datelike, Local, NaiveDate};
use clap::Parser;
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::App;
use crate::board::{SessionState, TaskBoardRequest, TaskBoardView};
use crate::chat::ChatClient;
use crate::cli::{
    ChatArgs, Cli, Command, CountdownArgs, ForecastArgs, MetricsArgs, PerformanceArgs,
    RedistributeArgs, SubtaskAdd, SubtaskCommand, SubtaskList, SubtaskRemove, TaskAdd, TaskBoard,
    TaskCommand, TaskExport, TaskFilterArgs, TaskImport, TaskList, TaskRemove, TaskShow,
    TaskStatusArg, TaskUpdate,
};
use crate::config::DashboardConfig;
use crate::error::AppError;
use crate::forecast::{ForecastReport, InclusiveProjection, Redistribution};
use crate::metrics::{Countdown, MetricsReport};
use crate::model::{SubtaskInput, TaskChanges, TaskInput, TaskStatus};
use crate::performance::{CategoryFilter, PerformanceRecord, PerformanceViews};
use crate::util::{format_amount, format_due, format_percent, format_task_detail};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run() -> Result<(), AppError> {
    let Cli {
        config,
        home,
        verbose,
        command,
    } = Cli::parse();
    init_tracing(verbose);

    let config = DashboardConfig::load(config.as_deref(), home)?;
    debug!(home = %config.home.display(), "configuration resolved");

    match command {
        Command::Metrics(args) => handle_metrics(&config, args),
        Command::Countdown(args) => handle_countdown(args),
        Command::Forecast(args) => handle_forecast(&config, args),
        Command::Redistribute(args) => handle_redistribute(&config, args),
        Command::Categories => handle_categories(&config),
        Command::Task(command) => handle_task(&config, command).await,
        Command::Subtask(command) => handle_subtask(&config, command).await,
        Command::Chat(args) => handle_chat(&config, args).await,
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_records(config: &DashboardConfig) -> Result<Vec<PerformanceRecord>, AppError> {
    let path = config.performance_path();
    debug!(path = %path.display(), "loading performance data");
    performance::load_performance(&path)
}

fn load_views(
    config: &DashboardConfig,
    args: &PerformanceArgs,
) -> Result<(Vec<PerformanceRecord>, PerformanceViews), AppError> {
    let records = load_records(config)?;
    let filter = CategoryFilter {
        selected: args.categories.clone(),
    };
    let views = filter.apply(&records, &config.categories.disbursement);
    Ok((records, views))
}

/// The month before `as_of`; 0 in January.
fn last_closed_month(as_of: NaiveDate) -> u32 {
    as_of.month() - 1
}

fn handle_metrics(config: &DashboardConfig, args: MetricsArgs) -> Result<(), AppError> {
    let as_of = args.common.as_of.unwrap_or_else(today);
    let (_, views) = load_views(config, &args.common)?;
    let report = metrics::metrics_report(&views.excluding, &views.including, as_of);
    if args.common.json {
        return print_json(&report);
    }
    print_metrics(&report);
    Ok(())
}

fn print_metrics(report: &MetricsReport) {
    println!("Monthly Performance (as of {})", report.as_of);
    print_metric_lines(
        report.excluding.mtd_total,
        report.excluding.mtd_target,
        report.excluding.mtd_achievement,
        report.including.mtd_total,
        report.including.mtd_target,
        report.including.mtd_achievement,
    );
    println!();
    println!("FY Performance (as of {})", report.as_of);
    print_metric_lines(
        report.excluding.ytd_total,
        report.excluding.ytd_target,
        report.excluding.ytd_achievement,
        report.including.ytd_total,
        report.including.ytd_target,
        report.including.ytd_achievement,
    );
}

fn print_metric_lines(
    total: f64,
    target: f64,
    ach: f64,
    total_incl: f64,
    target_incl: f64,
    ach_incl: f64,
) {
    println!("  Total: {}", format_amount(total));
    println!("  Target: {}", format_amount(target));
    println!("  Ach: {}", format_percent(ach));
    println!("  Total (incl. disbursement): {}", format_amount(total_incl));
    println!("  Target (incl. disbursement): {}", format_amount(target_incl));
    println!("  Ach (incl. disbursement): {}", format_percent(ach_incl));
}

fn handle_countdown(args: CountdownArgs) -> Result<(), AppError> {
    let countdown = Countdown::as_of(args.as_of.unwrap_or_else(today));
    if args.json {
        return print_json(&countdown);
    }
    println!(
        "Days to end of month: {}/{} (work days: {}/{})",
        countdown.days_to_end_of_month,
        countdown.total_days_month,
        countdown.workdays_to_end_of_month,
        countdown.total_workdays_month
    );
    println!(
        "Days to end of year: {}/{} (work days: {}/{})",
        countdown.days_to_end_of_year,
        countdown.total_days_year,
        countdown.workdays_to_end_of_year,
        countdown.total_workdays_year
    );
    Ok(())
}

#[derive(Serialize)]
struct ForecastOutput<'a> {
    excluding: &'a ForecastReport,
    including: &'a InclusiveProjection,
}

fn handle_forecast(config: &DashboardConfig, args: ForecastArgs) -> Result<(), AppError> {
    let as_of = args.common.as_of.unwrap_or_else(today);
    let through_month = args
        .through_month
        .unwrap_or_else(|| last_closed_month(as_of));
    let (records, views) = load_views(config, &args.common)?;

    let monthly = performance::monthly_totals(&views.excluding);
    let report = forecast::forecast(&monthly, as_of.year(), through_month)?;

    // Disbursement comes from the whole table regardless of the selection.
    let disbursement = performance::monthly_totals(&performance::only_categories(
        &records,
        &config.categories.disbursement,
    ));
    let including = forecast::project_including(
        &report,
        &disbursement,
        config.forecast.disbursement_forecast,
    );

    if args.common.json {
        return print_json(&ForecastOutput {
            excluding: &report,
            including: &including,
        });
    }
    print_forecast(&report, &including);
    Ok(())
}

fn print_forecast(report: &ForecastReport, including: &InclusiveProjection) {
    println!(
        "{:<9} {:>14} {:>14} {:>14} {:>14}",
        "MONTH", "ACTUAL", "TARGET", "FIT", "FORECAST"
    );
    let cell = |value: Option<f64>| value.map(format_amount).unwrap_or_default();
    for point in &report.timeline {
        println!(
            "{:<9} {:>14} {:>14} {:>14} {:>14}",
            point.label,
            format_amount(point.actual),
            cell(point.target),
            cell(point.fitted),
            cell(point.forecast)
        );
    }
    println!();
    println!(
        "Projected revenue ({}): {}",
        report.year,
        format_amount(report.projected_total)
    );
    println!(
        "Projected achievement ({}): {}",
        report.year,
        format_percent(report.projected_achievement)
    );
    println!(
        "Projected revenue incl. disbursement ({}): {} (manual disbursement forecast {})",
        report.year,
        format_amount(including.projected_total),
        format_amount(including.disbursement_forecast)
    );
    println!(
        "Projected achievement incl. disbursement ({}): {}",
        report.year,
        format_percent(including.projected_achievement)
    );
}

fn handle_redistribute(config: &DashboardConfig, args: RedistributeArgs) -> Result<(), AppError> {
    let as_of = args.common.as_of.unwrap_or_else(today);
    let cutoff = args
        .cutoff_month
        .unwrap_or_else(|| last_closed_month(as_of));
    let (_, views) = load_views(config, &args.common)?;
    let records = if args.include_disbursement {
        &views.including
    } else {
        &views.excluding
    };
    let result = forecast::redistribute(&performance::monthly_totals(records), cutoff)?;
    if args.common.json {
        return print_json(&result);
    }
    print_redistribution(&result);
    Ok(())
}

fn print_redistribution(result: &Redistribution) {
    let through = match result.cutoff_month {
        0 => "start of year",
        month => forecast::month_name(month),
    };
    println!(
        "Through {}: target {}, actual {}, shortfall {}",
        through,
        format_amount(result.ytd_target),
        format_amount(result.ytd_actual),
        format_amount(result.shortfall)
    );
    if result.months.is_empty() {
        println!("No open months.");
        return;
    }
    println!(
        "{:<6} {:>14} {:>8} {:>14} {:>14}",
        "MONTH", "TARGET", "WEIGHT", "SHARE", "ADJUSTED"
    );
    for month in &result.months {
        println!(
            "{:<6} {:>14} {:>8} {:>14} {:>14}",
            forecast::month_name(month.month),
            format_amount(month.original_target),
            format_percent(month.weight * 100.0),
            format_amount(month.share),
            format_amount(month.adjusted_target)
        );
    }
    if result.open_target_total <= 0.0 {
        println!("Open months carry no target; nothing was redistributed.");
    }
    if result.over_achieved {
        println!("Note: actual is ahead of target, so remaining targets were lowered.");
    }
}

fn handle_categories(config: &DashboardConfig) -> Result<(), AppError> {
    let records = load_records(config)?;
    let disbursement: HashSet<&str> = config
        .categories
        .disbursement
        .iter()
        .map(String::as_str)
        .collect();
    for category in performance::sorted_categories(&records) {
        if disbursement.contains(category.as_str()) {
            println!("{category} (disbursement)");
        } else {
            println!("{category}");
        }
    }
    Ok(())
}

async fn handle_task(config: &DashboardConfig, command: TaskCommand) -> Result<(), AppError> {
    match command {
        TaskCommand::List(args) => handle_task_list(config, args).await,
        TaskCommand::Board(args) => handle_task_board(config, args).await,
        TaskCommand::Add(args) => {
            let mut lock = store_lock(config)?;
            let _guard = lock.write()?;
            handle_task_add(&open_app(config).await?, args).await
        }
        TaskCommand::Show(args) => {
            let mut lock = store_lock(config)?;
            let _guard = lock.write()?;
            handle_task_show(&open_app(config).await?, args).await
        }
        TaskCommand::Update(args) => {
            let mut lock = store_lock(config)?;
            let _guard = lock.write()?;
            handle_task_update(&open_app(config).await?, args).await
        }
        TaskCommand::Remove(args) => {
            let mut lock = store_lock(config)?;
            let _guard = lock.write()?;
            handle_task_remove(&open_app(config).await?, args).await
        }
        TaskCommand::Import(args) => {
            let mut lock = store_lock(config)?;
            let _guard = lock.write()?;
            handle_task_import(&open_app(config).await?, args).await
        }
        TaskCommand::Export(args) => {
            let mut lock = store_lock(config)?;
            let _guard = lock.write()?;
            handle_task_export(&open_app(config).await?, args).await
        }
    }
}

/// Lock file next to the local database; writers hold it while the store is open.
fn store_lock(config: &DashboardConfig) -> Result<fd_lock::RwLock<std::fs::File>, AppError> {
    let db_path = config.database_path();
    db::ensure_parent_dir(&db_path)?;
    db::open_lock(&db_path)
}

async fn open_app(config: &DashboardConfig) -> Result<App, AppError> {
    Ok(App::new(db::open(config).await?))
}

fn task_status_from_arg(arg: TaskStatusArg) -> TaskStatus {
    match arg {
        TaskStatusArg::NotStarted => TaskStatus::NotStarted,
        TaskStatusArg::InProgress => TaskStatus::InProgress,
        TaskStatusArg::Completed => TaskStatus::Completed,
    }
}

fn board_request(filter: TaskFilterArgs) -> TaskBoardRequest {
    TaskBoardRequest {
        statuses: filter.status.into_iter().map(task_status_from_arg).collect(),
        units: filter.unit,
    }
}

async fn handle_task_add(app: &App, args: TaskAdd) -> Result<(), AppError> {
    require_non_empty("task name", &args.name)?;
    require_non_empty("assigned unit", &args.unit)?;
    let task = app
        .add_task(TaskInput {
            task_name: args.name,
            assigned_unit: args.unit,
            start_date: args.start.unwrap_or_else(today),
            due_date: args.due,
            status: task_status_from_arg(args.status),
            completed_activities: args.completed.unwrap_or_default(),
            pending_activities: args.pending.unwrap_or_default(),
            follow_up: args.follow_up.unwrap_or_default(),
        })
        .await?;
    println!("Created task ID: {}: {}", task.id, task.task_name);
    Ok(())
}

async fn handle_task_list(config: &DashboardConfig, args: TaskList) -> Result<(), AppError> {
    let view = load_board(
        config,
        board_request(args.filter),
        &mut SessionState::default(),
    ).await?;
    if view.rows.is_empty() {
        println!("No tasks found.");
        return Ok(());
    }
    print_task_rows(&view);
    Ok(())
}

async fn load_board(
    config: &DashboardConfig,
    request: TaskBoardRequest,
    session: &mut SessionState,
) -> Result<TaskBoardView, AppError> {
    let loaded = store::load_tasks(config).await?;
    if let Some(warning) = &loaded.warning {
        eprintln!("Warning: {warning}");
    }
    let ids: HashSet<i64> = loaded.tasks.iter().map(|task| task.id).collect();
    session.retain_tasks(&ids);
    Ok(board::build_board(
        &loaded.tasks,
        &request,
        session,
        config.unit_delimiter(),
    ))
}

async fn handle_task_board(config: &DashboardConfig, args: TaskBoard) -> Result<(), AppError> {
    let mut session = SessionState::default();
    for id in &args.expand {
        session.toggle_details(*id);
    }
    for id in &args.edit {
        session.toggle_editing(*id);
    }
    let view = load_board(config, board_request(args.filter), &mut session).await?;
    if args.json {
        return print_json(&view);
    }

    let overview = view.overview;
    println!(
        "Total: {}  Completed: {}  In Progress: {}  Not Started: {}",
        overview.total, overview.completed, overview.in_progress, overview.not_started
    );
    if !view.distribution.is_empty() {
        println!();
        println!("By status:");
        for slice in &view.distribution {
            println!(
                "  {:<12} {:>4} ({})",
                slice.status.as_str(),
                slice.count,
                format_percent(slice.percent)
            );
        }
    }
    if !view.by_unit.is_empty() {
        println!();
        println!("By unit:");
        for entry in &view.by_unit {
            println!(
                "  {:<24} {:<12} {:>4}",
                entry.unit,
                entry.status.as_str(),
                entry.count
            );
        }
    }
    println!();
    if view.rows.is_empty() {
        println!("No tasks found.");
        return Ok(());
    }
    print_task_rows(&view);
    for row in view.rows.iter().filter(|row| row.expanded) {
        println!();
        println!("Task ID: {} {}", row.id, row.task_name);
        println!("  Completed: {}", or_none(&row.completed_activities));
        println!("  Pending: {}", or_none(&row.pending_activities));
        if !row.follow_up.trim().is_empty() {
            println!("  Follow up: {}", row.follow_up);
        }
    }
    Ok(())
}

fn or_none(text: &str) -> &str {
    if text.trim().is_empty() {
        "None"
    } else {
        text
    }
}

fn print_task_rows(view: &TaskBoardView) {
    println!(
        "{:<4} {:<12} {:<11} {:<11} {:<24} {:<30}",
        "ID", "STATUS", "START", "DUE", "UNIT", "NAME"
    );
    for row in &view.rows {
        let marker = if row.editing { " (editing)" } else { "" };
        println!(
            "{:<4} {:<12} {:<11} {:<11} {:<24} {:<30}{}",
            row.id,
            row.status.as_str(),
            row.start_date,
            format_due(row.due_date),
            row.assigned_unit,
            row.task_name,
            marker
        );
    }
}

async fn handle_task_show(app: &App, args: TaskShow) -> Result<(), AppError> {
    let detail = app.get_task_detail(args.id).await?;
    let timeline = board::timeline(&detail.task, &detail.subtasks);
    println!("{}", format_task_detail(&detail.task, &timeline));
    Ok(())
}

async fn handle_task_update(app: &App, args: TaskUpdate) -> Result<(), AppError> {
    let due_date = if args.clear_due {
        Some(None)
    } else {
        args.due.map(Some)
    };
    let task = app
        .update_task(
            args.id,
            TaskChanges {
                task_name: args.name,
                assigned_unit: args.unit,
                start_date: args.start,
                due_date,
                status: args.status.map(task_status_from_arg),
                completed_activities: args.completed,
                pending_activities: args.pending,
                follow_up: args.follow_up,
            },
        )
        .await?;
    println!("Updated task ID: {}.", task.id);
    Ok(())
}

async fn handle_task_remove(app: &App, args: TaskRemove) -> Result<(), AppError> {
    let subtasks = app.delete_task(args.id).await?;
    println!("Removed task ID: {} (subtasks: {}).", args.id, subtasks);
    Ok(())
}

async fn handle_task_import(app: &App, args: TaskImport) -> Result<(), AppError> {
    let tasks = store::read_tasks_csv(&args.path)?;
    let count = app.import_tasks(store::task_inputs(tasks)).await?;
    println!("Imported {count} tasks from {}.", args.path.display());
    Ok(())
}

async fn handle_task_export(app: &App, args: TaskExport) -> Result<(), AppError> {
    let tasks = app.list_tasks().await?;
    store::write_tasks_csv(&args.path, &tasks)?;
    println!("Exported {} tasks to {}.", tasks.len(), args.path.display());
    Ok(())
}

async fn handle_subtask(config: &DashboardConfig, command: SubtaskCommand) -> Result<(), AppError> {
    let mut lock = store_lock(config)?;
    let _guard = lock.write()?;
    let app = open_app(config).await?;

    match command {
        SubtaskCommand::Add(args) => handle_subtask_add(&app, args).await,
        SubtaskCommand::List(args) => handle_subtask_list(&app, args).await,
        SubtaskCommand::Remove(args) => handle_subtask_remove(&app, args).await,
    }
}

async fn handle_subtask_add(app: &App, args: SubtaskAdd) -> Result<(), AppError> {
    require_non_empty("subtask label", &args.label)?;
    let subtask = app
        .add_subtask(
            args.task_id,
            SubtaskInput {
                label: args.label,
                start_date: args.start,
                end_date: args.end,
            },
        )
        .await?;
    println!(
        "Created subtask ID: {} for task ID: {}",
        subtask.id, subtask.task_id
    );
    Ok(())
}

async fn handle_subtask_list(app: &App, args: SubtaskList) -> Result<(), AppError> {
    let subtasks = app.list_subtasks(args.task_id).await?;
    if subtasks.is_empty() {
        println!("No subtasks found for task ID: {}.", args.task_id);
        return Ok(());
    }
    println!("{:<4} {:<11} {:<11} {}", "ID", "START", "END", "LABEL");
    for subtask in subtasks {
        println!(
            "{:<4} {:<11} {:<11} {}",
            subtask.id, subtask.start_date, subtask.end_date, subtask.label
        );
    }
    Ok(())
}

async fn handle_subtask_remove(app: &App, args: SubtaskRemove) -> Result<(), AppError> {
    let removed = app.delete_subtask(args.id).await?;
    println!(
        "Removed subtask ID: {} from task ID: {}.",
        removed.id, removed.task_id
    );
    Ok(())
}

async fn handle_chat(config: &DashboardConfig, args: ChatArgs) -> Result<(), AppError> {
    let question = args.question.join(" ");
    require_non_empty("question", &question)?;
    let client = ChatClient::new(config.chat.clone())?;
    let records = load_records(config)?;
    let answer = client.ask(&question, &records).await?;
    println!("{answer}");
    Ok(())
}

fn require_non_empty(label: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidInput(format!("{label} cannot be empty")));
    }
    Ok(())
}
