use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "Not Started")]
    NotStarted,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [Self::NotStarted, Self::InProgress, Self::Completed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "Not Started",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
        }
    }

    /// Board ordering: open work first.
    pub fn sort_rank(&self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::InProgress => 1,
            Self::Completed => 2,
        }
    }

    /// Parses a stored or typed label. "Pending" is the label older rows used
    /// for tasks that had not started yet.
    pub fn parse(label: &str) -> Option<Self> {
        let normalized: String = label
            .trim()
            .chars()
            .filter(|ch| !matches!(ch, ' ' | '_' | '-'))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "notstarted" | "pending" => Some(Self::NotStarted),
            "inprogress" => Some(Self::InProgress),
            "completed" | "done" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Stored values are free text in older tables, so reads never fail.
    pub fn from_stored(label: &str) -> Self {
        Self::parse(label).unwrap_or(Self::NotStarted)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskInput {
    pub task_name: String,
    pub assigned_unit: String,
    pub start_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub status: TaskStatus,
    pub completed_activities: String,
    pub pending_activities: String,
    pub follow_up: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskChanges {
    pub task_name: Option<String>,
    pub assigned_unit: Option<String>,
    pub start_date: Option<NaiveDate>,
    /// `Some(None)` clears the due date.
    pub due_date: Option<Option<NaiveDate>>,
    pub status: Option<TaskStatus>,
    pub completed_activities: Option<String>,
    pub pending_activities: Option<String>,
    pub follow_up: Option<String>,
}

impl TaskChanges {
    pub fn is_empty(&self) -> bool {
        self.task_name.is_none()
            && self.assigned_unit.is_none()
            && self.start_date.is_none()
            && self.due_date.is_none()
            && self.status.is_none()
            && self.completed_activities.is_none()
            && self.pending_activities.is_none()
            && self.follow_up.is_none()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubtaskInput {
    pub label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}
