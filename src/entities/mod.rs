pub mod subtask;
pub mod task;
