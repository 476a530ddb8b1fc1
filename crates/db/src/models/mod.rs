pub mod progress;
pub mod quality;
pub mod subtask;
pub mod task;
