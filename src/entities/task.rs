use sea_orm::entity::prelude::*;

use super::subtask;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "tasks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub task_name: String,
    pub assigned_unit: String,
    pub start_date: Date,
    pub due_date: Option<Date>,
    pub status: String,
    pub completed_activities: String,
    pub pending_activities: String,
    pub follow_up: String,
    pub last_updated: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    Subtask,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Self::Subtask => Entity::has_many(subtask::Entity).into(),
        }
    }
}

impl Related<subtask::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subtask.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
