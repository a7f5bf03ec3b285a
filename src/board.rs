//! Task board view model.
//!
//! A board request (filters) plus the caller's session state produce a plain
//! view model that any renderer can draw: overview counts, the status
//! distribution, per-unit chart data and the filtered task rows.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::entities::{subtask, task};
use crate::model::TaskStatus;

/// A task repeated once per assigned unit; never stored.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UnitRow {
    pub task_id: i64,
    pub unit: String,
    pub status: TaskStatus,
}

pub fn split_units<'a>(assigned: &'a str, delimiter: &'a str) -> impl Iterator<Item = &'a str> {
    assigned
        .split(delimiter)
        .map(str::trim)
        .filter(|unit| !unit.is_empty())
}

pub fn expand_units(tasks: &[task::Model], delimiter: &str) -> Vec<UnitRow> {
    tasks
        .iter()
        .flat_map(|task| {
            let status = TaskStatus::from_stored(&task.status);
            split_units(&task.assigned_unit, delimiter).map(move |unit| UnitRow {
                task_id: task.id,
                unit: unit.to_string(),
                status,
            })
        })
        .collect()
}

/// Editing and detail toggles for one caller; the board never keeps state.
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    expanded: HashSet<i64>,
    editing: HashSet<i64>,
    pub add_form_open: bool,
}

impl SessionState {
    /// Returns whether the details are now shown.
    pub fn toggle_details(&mut self, task_id: i64) -> bool {
        toggle(&mut self.expanded, task_id)
    }

    /// Returns whether the task is now in edit mode.
    pub fn toggle_editing(&mut self, task_id: i64) -> bool {
        toggle(&mut self.editing, task_id)
    }

    pub fn is_expanded(&self, task_id: i64) -> bool {
        self.expanded.contains(&task_id)
    }

    pub fn is_editing(&self, task_id: i64) -> bool {
        self.editing.contains(&task_id)
    }

    /// Drops toggles for tasks that no longer exist.
    pub fn retain_tasks(&mut self, ids: &HashSet<i64>) {
        self.expanded.retain(|id| ids.contains(id));
        self.editing.retain(|id| ids.contains(id));
    }
}

fn toggle(set: &mut HashSet<i64>, id: i64) -> bool {
    if set.remove(&id) {
        false
    } else {
        set.insert(id);
        true
    }
}

#[derive(Clone, Debug, Default)]
pub struct TaskBoardRequest {
    /// Empty means every status.
    pub statuses: Vec<TaskStatus>,
    /// Empty means every unit.
    pub units: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Overview {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub not_started: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct StatusSlice {
    pub status: TaskStatus,
    pub count: usize,
    pub percent: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UnitStatusCount {
    pub unit: String,
    pub status: TaskStatus,
    pub count: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct TaskRow {
    pub id: i64,
    pub task_name: String,
    pub assigned_unit: String,
    pub start_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub status: TaskStatus,
    pub expanded: bool,
    pub editing: bool,
    pub completed_activities: String,
    pub pending_activities: String,
    pub follow_up: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct TaskBoardView {
    pub overview: Overview,
    pub distribution: Vec<StatusSlice>,
    pub by_unit: Vec<UnitStatusCount>,
    /// Every unit seen, for filter choices.
    pub units: Vec<String>,
    pub rows: Vec<TaskRow>,
    pub add_form_open: bool,
}

pub fn build_board(
    tasks: &[task::Model],
    request: &TaskBoardRequest,
    session: &SessionState,
    delimiter: &str,
) -> TaskBoardView {
    let mut overview = Overview {
        total: tasks.len(),
        ..Default::default()
    };
    for task in tasks {
        match TaskStatus::from_stored(&task.status) {
            TaskStatus::Completed => overview.completed += 1,
            TaskStatus::InProgress => overview.in_progress += 1,
            TaskStatus::NotStarted => overview.not_started += 1,
        }
    }

    let distribution = TaskStatus::ALL
        .iter()
        .map(|status| {
            let count = match status {
                TaskStatus::Completed => overview.completed,
                TaskStatus::InProgress => overview.in_progress,
                TaskStatus::NotStarted => overview.not_started,
            };
            let percent = if overview.total > 0 {
                count as f64 / overview.total as f64 * 100.0
            } else {
                0.0
            };
            StatusSlice {
                status: *status,
                count,
                percent,
            }
        })
        .filter(|slice| slice.count > 0)
        .collect();

    let expanded = expand_units(tasks, delimiter);
    let mut counts: BTreeMap<(String, u8), (TaskStatus, usize)> = BTreeMap::new();
    for row in &expanded {
        counts
            .entry((row.unit.clone(), row.status.sort_rank()))
            .or_insert((row.status, 0))
            .1 += 1;
    }
    let by_unit = counts
        .into_iter()
        .map(|((unit, _), (status, count))| UnitStatusCount {
            unit,
            status,
            count,
        })
        .collect();

    let units: Vec<String> = expanded
        .iter()
        .map(|row| row.unit.clone())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut rows: Vec<TaskRow> = tasks
        .iter()
        .filter(|task| matches_request(task, request, delimiter))
        .map(|task| TaskRow {
            id: task.id,
            task_name: task.task_name.clone(),
            assigned_unit: task.assigned_unit.clone(),
            start_date: task.start_date,
            due_date: task.due_date,
            status: TaskStatus::from_stored(&task.status),
            expanded: session.is_expanded(task.id),
            editing: session.is_editing(task.id),
            completed_activities: task.completed_activities.clone(),
            pending_activities: task.pending_activities.clone(),
            follow_up: task.follow_up.clone(),
        })
        .collect();
    rows.sort_by_key(|row| (row.status.sort_rank(), row.id));

    TaskBoardView {
        overview,
        distribution,
        by_unit,
        units,
        rows,
        add_form_open: session.add_form_open,
    }
}

fn matches_request(task: &task::Model, request: &TaskBoardRequest, delimiter: &str) -> bool {
    let status = TaskStatus::from_stored(&task.status);
    if !request.statuses.is_empty() && !request.statuses.contains(&status) {
        return false;
    }
    if request.units.is_empty() {
        return true;
    }
    split_units(&task.assigned_unit, delimiter)
        .any(|unit| request.units.iter().any(|wanted| wanted.eq_ignore_ascii_case(unit)))
}

#[derive(Clone, Debug, Serialize)]
pub struct TimelineEntry {
    pub label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: i64,
}

/// The task's own span first, then its subtasks by start date.
pub fn timeline(task: &task::Model, subtasks: &[subtask::Model]) -> Vec<TimelineEntry> {
    let mut entries = Vec::with_capacity(subtasks.len() + 1);
    if let Some(due) = task.due_date {
        entries.push(TimelineEntry {
            label: task.task_name.clone(),
            start_date: task.start_date,
            end_date: due,
            days: (due - task.start_date).num_days() + 1,
        });
    }
    let mut ordered: Vec<&subtask::Model> = subtasks.iter().collect();
    ordered.sort_by_key(|item| (item.start_date, item.id));
    entries.extend(ordered.into_iter().map(|item| TimelineEntry {
        label: item.label.clone(),
        start_date: item.start_date,
        end_date: item.end_date,
        days: (item.end_date - item.start_date).num_days() + 1,
    }));
    entries
}
