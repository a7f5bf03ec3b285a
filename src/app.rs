use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tracing::info;

use crate::entities::{subtask, task};
use crate::error::AppError;
use crate::model::{SubtaskInput, TaskChanges, TaskInput};

pub struct App {
    db: DatabaseConnection,
}

pub struct TaskDetail {
    pub task: task::Model,
    pub subtasks: Vec<subtask::Model>,
}

impl App {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn add_task(&self, input: TaskInput) -> Result<task::Model, AppError> {
        validate_task(&input)?;
        let insert = task::Entity::insert(new_task(input)).exec(&self.db).await?;
        let created = task::Entity::find_by_id(insert.last_insert_id)
            .one(&self.db)
            .await?;
        let created =
            created.ok_or_else(|| AppError::NotFound("task not found after insert".to_string()))?;
        info!(task_id = created.id, "task added");
        Ok(created)
    }

    /// Inserts all rows or none.
    pub async fn import_tasks(&self, inputs: Vec<TaskInput>) -> Result<usize, AppError> {
        for input in &inputs {
            validate_task(input)?;
        }
        let txn = self.db.begin().await?;
        let result: Result<usize, AppError> = async {
            let mut count = 0usize;
            for input in inputs {
                task::Entity::insert(new_task(input)).exec(&txn).await?;
                count += 1;
            }
            Ok(count)
        }
        .await;
        finalize_transaction(txn, result).await
    }

    pub async fn list_tasks(&self) -> Result<Vec<task::Model>, AppError> {
        Ok(task::Entity::find()
            .order_by_asc(task::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn get_task(&self, id: i64) -> Result<task::Model, AppError> {
        task::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("task id {id}")))
    }

    pub async fn get_task_detail(&self, id: i64) -> Result<TaskDetail, AppError> {
        let task = self.get_task(id).await?;
        let subtasks = self.list_subtasks(id).await?;
        Ok(TaskDetail { task, subtasks })
    }

    pub async fn update_task(&self, id: i64, changes: TaskChanges) -> Result<task::Model, AppError> {
        if changes.is_empty() {
            return Err(AppError::InvalidInput("no changes provided".to_string()));
        }
        if let Some(name) = &changes.task_name {
            ensure_non_empty("task name", name)?;
        }
        if let Some(unit) = &changes.assigned_unit {
            ensure_non_empty("assigned unit", unit)?;
        }

        let existing = self.get_task(id).await?;
        let start = changes.start_date.unwrap_or(existing.start_date);
        let due = match changes.due_date {
            Some(due) => due,
            None => existing.due_date,
        };
        ensure_date_order("due date", start, due)?;

        let mut active = existing.into_active_model();
        if let Some(name) = changes.task_name {
            active.task_name = Set(name);
        }
        if let Some(unit) = changes.assigned_unit {
            active.assigned_unit = Set(unit);
        }
        if let Some(start) = changes.start_date {
            active.start_date = Set(start);
        }
        if let Some(due) = changes.due_date {
            active.due_date = Set(due);
        }
        if let Some(status) = changes.status {
            active.status = Set(status.as_str().to_string());
        }
        if let Some(text) = changes.completed_activities {
            active.completed_activities = Set(text);
        }
        if let Some(text) = changes.pending_activities {
            active.pending_activities = Set(text);
        }
        if let Some(text) = changes.follow_up {
            active.follow_up = Set(text);
        }
        active.last_updated = Set(Utc::now());
        let updated = active.update(&self.db).await?;
        info!(task_id = updated.id, "task updated");
        Ok(updated)
    }

    pub async fn delete_task(&self, id: i64) -> Result<usize, AppError> {
        self.get_task(id).await?;
        let txn = self.db.begin().await?;
        let result: Result<usize, AppError> = async {
            let removed = subtask::Entity::delete_many()
                .filter(subtask::Column::TaskId.eq(id))
                .exec(&txn)
                .await?;
            task::Entity::delete_by_id(id).exec(&txn).await?;
            Ok(removed.rows_affected as usize)
        }
        .await;
        finalize_transaction(txn, result).await
    }

    pub async fn add_subtask(
        &self,
        task_id: i64,
        input: SubtaskInput,
    ) -> Result<subtask::Model, AppError> {
        ensure_non_empty("subtask label", &input.label)?;
        ensure_date_order("end date", input.start_date, Some(input.end_date))?;
        self.get_task(task_id).await?;

        let active = subtask::ActiveModel {
            task_id: Set(task_id),
            label: Set(input.label),
            start_date: Set(input.start_date),
            end_date: Set(input.end_date),
            ..Default::default()
        };
        let insert = subtask::Entity::insert(active).exec(&self.db).await?;
        subtask::Entity::find_by_id(insert.last_insert_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("subtask not found after insert".to_string()))
    }

    pub async fn list_subtasks(&self, task_id: i64) -> Result<Vec<subtask::Model>, AppError> {
        Ok(subtask::Entity::find()
            .filter(subtask::Column::TaskId.eq(task_id))
            .order_by_asc(subtask::Column::StartDate)
            .order_by_asc(subtask::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn delete_subtask(&self, id: i64) -> Result<subtask::Model, AppError> {
        let existing = subtask::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("subtask id {id}")))?;
        subtask::Entity::delete_by_id(id).exec(&self.db).await?;
        Ok(existing)
    }
}

fn new_task(input: TaskInput) -> task::ActiveModel {
    task::ActiveModel {
        task_name: Set(input.task_name),
        assigned_unit: Set(input.assigned_unit),
        start_date: Set(input.start_date),
        due_date: Set(input.due_date),
        status: Set(input.status.as_str().to_string()),
        completed_activities: Set(input.completed_activities),
        pending_activities: Set(input.pending_activities),
        follow_up: Set(input.follow_up),
        last_updated: Set(Utc::now()),
        ..Default::default()
    }
}

fn validate_task(input: &TaskInput) -> Result<(), AppError> {
    ensure_non_empty("task name", &input.task_name)?;
    ensure_non_empty("assigned unit", &input.assigned_unit)?;
    ensure_date_order("due date", input.start_date, input.due_date)
}

async fn finalize_transaction<T>(
    txn: DatabaseTransaction,
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    match result {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                return Err(rollback_err.into());
            }
            Err(err)
        }
    }
}

fn ensure_non_empty(label: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidInput(format!("{label} cannot be empty")));
    }
    Ok(())
}

fn ensure_date_order(label: &str, start: NaiveDate, end: Option<NaiveDate>) -> Result<(), AppError> {
    match end {
        Some(end) if end < start => Err(AppError::InvalidInput(format!(
            "{label} {end} is before start date {start}"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::model::TaskStatus;
    use sea_orm::{EntityTrait, PaginatorTrait};
    use tempfile::TempDir;

    async fn setup_app() -> (TempDir, App) {
        let dir = TempDir::new().expect("temp dir");
        let db_path = dir.path().join("perfdash.db");
        db::ensure_parent_dir(&db_path).expect("ensure parent");
        let db = db::connect(&db_path).await.expect("connect db");
        db::ensure_schema(&db).await.expect("ensure schema");
        (dir, App::new(db))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn input(name: &str, unit: &str) -> TaskInput {
        TaskInput {
            task_name: name.to_string(),
            assigned_unit: unit.to_string(),
            start_date: date(2025, 3, 1),
            due_date: Some(date(2025, 6, 30)),
            status: TaskStatus::NotStarted,
            completed_activities: String::new(),
            pending_activities: String::new(),
            follow_up: String::new(),
        }
    }

    #[tokio::test]
    async fn add_and_list_tasks_in_id_order() {
        let (_dir, app) = setup_app().await;
        let first = app.add_task(input("Launch", "Sales")).await.expect("add");
        let second = app
            .add_task(input("Campaign", "Sales & Marketing"))
            .await
            .expect("add");

        let tasks = app.list_tasks().await.expect("list");
        let ids: Vec<i64> = tasks.iter().map(|task| task.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
        assert_eq!(tasks[0].status, "Not Started");
        assert_eq!(tasks[1].assigned_unit, "Sales & Marketing");
    }

    #[tokio::test]
    async fn add_task_rejects_empty_name() {
        let (_dir, app) = setup_app().await;
        let err = app.add_task(input("   ", "Sales")).await.unwrap_err();
        match err {
            AppError::InvalidInput(message) => {
                assert!(message.contains("task name cannot be empty"));
            }
            _ => panic!("unexpected error type"),
        }
    }

    #[tokio::test]
    async fn add_task_rejects_due_before_start() {
        let (_dir, app) = setup_app().await;
        let mut bad = input("Launch", "Sales");
        bad.due_date = Some(date(2025, 2, 1));
        let err = app.add_task(bad).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn open_ended_tasks_have_no_due_date() {
        let (_dir, app) = setup_app().await;
        let mut open = input("Ongoing review", "Finance");
        open.due_date = None;
        let created = app.add_task(open).await.expect("add");
        assert!(created.due_date.is_none());
    }

    #[tokio::test]
    async fn update_task_applies_partial_changes() {
        let (_dir, app) = setup_app().await;
        let created = app.add_task(input("Launch", "Sales")).await.expect("add");

        let updated = app
            .update_task(
                created.id,
                TaskChanges {
                    status: Some(TaskStatus::InProgress),
                    completed_activities: Some("Kickoff held".to_string()),
                    due_date: Some(None),
                    ..Default::default()
                },
            )
            .await
            .expect("update");
        assert_eq!(updated.status, "In Progress");
        assert_eq!(updated.completed_activities, "Kickoff held");
        assert_eq!(updated.task_name, "Launch");
        assert!(updated.due_date.is_none());
        assert!(updated.last_updated >= created.last_updated);
    }

    #[tokio::test]
    async fn update_task_rejects_empty_changes_and_missing_ids() {
        let (_dir, app) = setup_app().await;
        let created = app.add_task(input("Launch", "Sales")).await.expect("add");

        let err = app
            .update_task(created.id, TaskChanges::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let err = app
            .update_task(
                999,
                TaskChanges {
                    status: Some(TaskStatus::Completed),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_task_checks_new_start_against_existing_due() {
        let (_dir, app) = setup_app().await;
        let created = app.add_task(input("Launch", "Sales")).await.expect("add");
        let err = app
            .update_task(
                created.id,
                TaskChanges {
                    start_date: Some(date(2025, 7, 1)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn delete_task_removes_subtasks() {
        let (_dir, app) = setup_app().await;
        let created = app.add_task(input("Launch", "Sales")).await.expect("add");
        app.add_subtask(
            created.id,
            SubtaskInput {
                label: "Draft".to_string(),
                start_date: date(2025, 3, 1),
                end_date: date(2025, 3, 10),
            },
        )
        .await
        .expect("add subtask");

        let removed = app.delete_task(created.id).await.expect("delete");
        assert_eq!(removed, 1);
        let remaining = subtask::Entity::find()
            .count(&app.db)
            .await
            .expect("count subtasks");
        assert_eq!(remaining, 0);
        assert!(matches!(
            app.get_task(created.id).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn subtasks_list_by_start_date() {
        let (_dir, app) = setup_app().await;
        let created = app.add_task(input("Launch", "Sales")).await.expect("add");
        for (label, start, end) in [
            ("Review", date(2025, 4, 1), date(2025, 4, 5)),
            ("Draft", date(2025, 3, 1), date(2025, 3, 10)),
        ] {
            app.add_subtask(
                created.id,
                SubtaskInput {
                    label: label.to_string(),
                    start_date: start,
                    end_date: end,
                },
            )
            .await
            .expect("add subtask");
        }

        let detail = app.get_task_detail(created.id).await.expect("detail");
        let labels: Vec<&str> = detail.subtasks.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["Draft", "Review"]);

        let removed = app
            .delete_subtask(detail.subtasks[0].id)
            .await
            .expect("delete subtask");
        assert_eq!(removed.label, "Draft");
        assert_eq!(app.list_subtasks(created.id).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn add_subtask_rejects_inverted_range_and_unknown_task() {
        let (_dir, app) = setup_app().await;
        let created = app.add_task(input("Launch", "Sales")).await.expect("add");
        let err = app
            .add_subtask(
                created.id,
                SubtaskInput {
                    label: "Draft".to_string(),
                    start_date: date(2025, 3, 10),
                    end_date: date(2025, 3, 1),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let err = app
            .add_subtask(
                42,
                SubtaskInput {
                    label: "Draft".to_string(),
                    start_date: date(2025, 3, 1),
                    end_date: date(2025, 3, 10),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn import_is_all_or_nothing() {
        let (_dir, app) = setup_app().await;
        let err = app
            .import_tasks(vec![input("Launch", "Sales"), input("", "Sales")])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert!(app.list_tasks().await.expect("list").is_empty());

        let count = app
            .import_tasks(vec![input("Launch", "Sales"), input("Audit", "Finance")])
            .await
            .expect("import");
        assert_eq!(count, 2);
        assert_eq!(app.list_tasks().await.expect("list").len(), 2);
    }
}
