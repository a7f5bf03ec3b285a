use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "perfdash",
    version,
    about = "Sales performance metrics, forecasts and team task tracking"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Config file (default: <home>/config.toml when present)"
    )]
    pub config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Data directory (default: $PERFDASH_HOME or ./.perfdash)"
    )]
    pub home: Option<PathBuf>,
    #[arg(short, long, global = true, action = ArgAction::Count, help = "Increase log verbosity")]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Month-to-date and year-to-date totals against target.
    Metrics(MetricsArgs),
    /// Days and working days left in the month and year.
    Countdown(CountdownArgs),
    /// Trend and seasonality projection for the rest of the year.
    Forecast(ForecastArgs),
    /// Spread the year-to-date gap over the remaining months' targets.
    Redistribute(RedistributeArgs),
    /// Categories in the performance data.
    Categories,
    #[command(subcommand)]
    Task(TaskCommand),
    #[command(subcommand)]
    Subtask(SubtaskCommand),
    /// Ask a question about the performance data.
    Chat(ChatArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct PerformanceArgs {
    #[arg(long, value_name = "DATE", help = "Report date (default: today)")]
    pub as_of: Option<NaiveDate>,
    #[arg(long = "category", value_name = "NAME")]
    pub categories: Vec<String>,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct MetricsArgs {
    #[command(flatten)]
    pub common: PerformanceArgs,
}

#[derive(Args, Debug)]
pub struct CountdownArgs {
    #[arg(long, value_name = "DATE")]
    pub as_of: Option<NaiveDate>,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ForecastArgs {
    #[command(flatten)]
    pub common: PerformanceArgs,
    #[arg(
        long,
        value_name = "MONTH",
        help = "Last fully reported month (default: month before --as-of)"
    )]
    pub through_month: Option<u32>,
}

#[derive(Args, Debug)]
pub struct RedistributeArgs {
    #[command(flatten)]
    pub common: PerformanceArgs,
    #[arg(
        long,
        value_name = "MONTH",
        help = "Last month counted as closed (default: month before --as-of)"
    )]
    pub cutoff_month: Option<u32>,
    #[arg(long, help = "Use the view that includes disbursement categories")]
    pub include_disbursement: bool,
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    #[arg(value_name = "QUESTION", num_args = 1..)]
    pub question: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    Add(TaskAdd),
    List(TaskList),
    Show(TaskShow),
    Update(TaskUpdate),
    Remove(TaskRemove),
    Board(TaskBoard),
    Import(TaskImport),
    Export(TaskExport),
}

#[derive(Subcommand, Debug)]
pub enum SubtaskCommand {
    Add(SubtaskAdd),
    List(SubtaskList),
    Remove(SubtaskRemove),
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum TaskStatusArg {
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Args, Debug)]
pub struct TaskAdd {
    pub name: String,
    #[arg(long, value_name = "UNITS", help = "Assigned units, joined with ' & '")]
    pub unit: String,
    #[arg(long, value_name = "DATE", help = "Start date (default: today)")]
    pub start: Option<NaiveDate>,
    #[arg(long, value_name = "DATE", help = "Due date (omit for open-ended tasks)")]
    pub due: Option<NaiveDate>,
    #[arg(long, value_enum, default_value = "not-started")]
    pub status: TaskStatusArg,
    #[arg(long)]
    pub completed: Option<String>,
    #[arg(long)]
    pub pending: Option<String>,
    #[arg(long)]
    pub follow_up: Option<String>,
}

#[derive(Args, Debug)]
pub struct TaskFilterArgs {
    #[arg(long, value_enum)]
    pub status: Vec<TaskStatusArg>,
    #[arg(long, value_name = "UNIT")]
    pub unit: Vec<String>,
}

#[derive(Args, Debug)]
pub struct TaskList {
    #[command(flatten)]
    pub filter: TaskFilterArgs,
}

#[derive(Args, Debug)]
pub struct TaskShow {
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct TaskUpdate {
    pub id: i64,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub unit: Option<String>,
    #[arg(long, value_name = "DATE")]
    pub start: Option<NaiveDate>,
    #[arg(long, value_name = "DATE", conflicts_with = "clear_due")]
    pub due: Option<NaiveDate>,
    #[arg(long, help = "Make the task open-ended")]
    pub clear_due: bool,
    #[arg(long, value_enum)]
    pub status: Option<TaskStatusArg>,
    #[arg(long)]
    pub completed: Option<String>,
    #[arg(long)]
    pub pending: Option<String>,
    #[arg(long)]
    pub follow_up: Option<String>,
}

#[derive(Args, Debug)]
pub struct TaskRemove {
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct TaskBoard {
    #[command(flatten)]
    pub filter: TaskFilterArgs,
    #[arg(long, value_name = "ID", help = "Show details for these tasks")]
    pub expand: Vec<i64>,
    #[arg(long, value_name = "ID", help = "Mark these tasks as being edited")]
    pub edit: Vec<i64>,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct TaskImport {
    pub path: PathBuf,
}

#[derive(Args, Debug)]
pub struct TaskExport {
    pub path: PathBuf,
}

#[derive(Args, Debug)]
pub struct SubtaskAdd {
    pub task_id: i64,
    pub label: String,
    #[arg(long, value_name = "DATE")]
    pub start: NaiveDate,
    #[arg(long, value_name = "DATE")]
    pub end: NaiveDate,
}

#[derive(Args, Debug)]
pub struct SubtaskList {
    pub task_id: i64,
}

#[derive(Args, Debug)]
pub struct SubtaskRemove {
    pub id: i64,
}
