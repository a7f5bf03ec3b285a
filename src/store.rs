//! Task loading for the board, with a CSV file standing in when the store is
//! unreachable, plus the task CSV import/export format.

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::app::App;
use crate::config::DashboardConfig;
use crate::db;
use crate::entities::task;
use crate::error::AppError;
use crate::model::{TaskInput, TaskStatus};

pub struct LoadedTasks {
    pub tasks: Vec<task::Model>,
    /// Set when the rows came from the fallback file.
    pub warning: Option<String>,
}

pub async fn load_tasks(config: &DashboardConfig) -> Result<LoadedTasks, AppError> {
    match load_from_store(config).await {
        Ok(tasks) => Ok(LoadedTasks {
            tasks,
            warning: None,
        }),
        Err(err) => {
            let path = config.tasks_csv_path();
            warn!(error = %err, fallback = %path.display(), "task store unavailable");
            let tasks = if path.is_file() {
                read_tasks_csv(&path)?
            } else {
                Vec::new()
            };
            Ok(LoadedTasks {
                tasks,
                warning: Some(format!(
                    "task store unavailable ({err}); showing tasks from {}",
                    path.display()
                )),
            })
        }
    }
}

async fn load_from_store(config: &DashboardConfig) -> Result<Vec<task::Model>, AppError> {
    let db = db::open(config).await?;
    App::new(db).list_tasks().await
}

#[derive(Debug, Serialize, Deserialize)]
struct TaskRow {
    #[serde(default)]
    id: Option<i64>,
    task_name: String,
    assigned_unit: String,
    #[serde(default)]
    start_date: String,
    #[serde(default)]
    due_date: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    completed_activities: String,
    #[serde(default)]
    pending_activities: String,
    #[serde(default)]
    follow_up: String,
    #[serde(default)]
    last_updated: String,
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    // Spreadsheet exports sometimes carry a time part.
    let date_part = value.split(['T', ' ']).next().unwrap_or(value);
    ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(date_part, format).ok())
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

impl TaskRow {
    fn into_model(self, id: i64) -> task::Model {
        task::Model {
            id,
            task_name: self.task_name,
            assigned_unit: self.assigned_unit,
            start_date: parse_date(&self.start_date).unwrap_or_else(today),
            due_date: parse_date(&self.due_date),
            status: TaskStatus::from_stored(&self.status).as_str().to_string(),
            completed_activities: self.completed_activities,
            pending_activities: self.pending_activities,
            follow_up: self.follow_up,
            last_updated: parse_timestamp(&self.last_updated).unwrap_or_else(Utc::now),
        }
    }

    fn from_model(model: &task::Model) -> Self {
        Self {
            id: Some(model.id),
            task_name: model.task_name.clone(),
            assigned_unit: model.assigned_unit.clone(),
            start_date: model.start_date.to_string(),
            due_date: model.due_date.map(|date| date.to_string()).unwrap_or_default(),
            status: model.status.clone(),
            completed_activities: model.completed_activities.clone(),
            pending_activities: model.pending_activities.clone(),
            follow_up: model.follow_up.clone(),
            last_updated: model.last_updated.to_rfc3339(),
        }
    }
}

/// Reads task rows, coercing bad dates and statuses instead of failing.
pub fn read_tasks_csv(path: &Path) -> Result<Vec<task::Model>, AppError> {
    let mut reader = csv::Reader::from_reader(File::open(path)?);
    let rows = reader
        .deserialize::<TaskRow>()
        .collect::<Result<Vec<_>, _>>()?;
    // Rows without an id are numbered after the largest explicit one.
    let mut next_id = rows.iter().filter_map(|row| row.id).max().unwrap_or(0);
    Ok(rows
        .into_iter()
        .map(|row| {
            let id = row.id.unwrap_or_else(|| {
                next_id += 1;
                next_id
            });
            row.into_model(id)
        })
        .collect())
}

pub fn write_tasks_csv(path: &Path, tasks: &[task::Model]) -> Result<(), AppError> {
    db::ensure_parent_dir(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    for task in tasks {
        writer.serialize(TaskRow::from_model(task))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn task_inputs(tasks: Vec<task::Model>) -> Vec<TaskInput> {
    tasks
        .into_iter()
        .map(|task| TaskInput {
            status: TaskStatus::from_stored(&task.status),
            task_name: task.task_name,
            assigned_unit: task.assigned_unit,
            start_date: task.start_date,
            due_date: task.due_date,
            completed_activities: task.completed_activities,
            pending_activities: task.pending_activities,
            follow_up: task.follow_up,
        })
        .collect()
}
