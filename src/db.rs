use std::fs::{self, File, OpenOptions};
use std::path::Path;

use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Schema, Statement};
use tracing::debug;
use url::Url;

use crate::config::DashboardConfig;
use crate::entities::{subtask, task};
use crate::error::AppError;

pub fn ensure_parent_dir(path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub fn open_lock(path: &Path) -> Result<fd_lock::RwLock<File>, AppError> {
    let lock_path = path.with_extension("lock");
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(lock_path)?;
    Ok(fd_lock::RwLock::new(file))
}

pub fn sqlite_url(path: &Path) -> Result<String, AppError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let mut url = Url::from_file_path(&absolute)
        .map_err(|_| AppError::InvalidInput(format!("invalid sqlite path: {}", path.display())))?;
    url.set_query(Some("mode=rwc"));
    Ok(url.as_str().replacen("file://", "sqlite://", 1))
}

pub async fn connect(path: &Path) -> Result<DatabaseConnection, AppError> {
    connect_url(&sqlite_url(path)?).await
}

pub async fn connect_url(url: &str) -> Result<DatabaseConnection, AppError> {
    debug!("connecting to task store");
    Ok(Database::connect(url).await?)
}

/// Opens the configured store and makes sure the tables exist.
pub async fn open(config: &DashboardConfig) -> Result<DatabaseConnection, AppError> {
    let db = match config.database_url() {
        Some(url) => connect_url(url).await?,
        None => {
            let path = config.database_path();
            ensure_parent_dir(&path)?;
            connect(&path).await?
        }
    };
    ensure_schema(&db).await?;
    Ok(db)
}

pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), AppError> {
    let builder = db.get_database_backend();
    if builder == DatabaseBackend::Sqlite {
        db.execute(Statement::from_string(
            DatabaseBackend::Sqlite,
            "PRAGMA foreign_keys = ON;",
        ))
        .await?;
    }

    let schema = Schema::new(builder);

    let mut task_stmt = schema.create_table_from_entity(task::Entity);
    task_stmt.if_not_exists();
    db.execute(builder.build(&task_stmt)).await?;

    let mut subtask_stmt = schema.create_table_from_entity(subtask::Entity);
    subtask_stmt.if_not_exists();
    db.execute(builder.build(&subtask_stmt)).await?;

    let mut subtask_index = Index::create()
        .name("idx_subtasks_task")
        .table(subtask::Entity)
        .col(subtask::Column::TaskId)
        .col(subtask::Column::StartDate)
        .to_owned();
    subtask_index.if_not_exists();
    db.execute(builder.build(&subtask_index)).await?;

    Ok(())
}
