pub mod index;
pub mod models;
pub mod store;

pub use index::{IndexError, IndexStats, OrgTasks, TaskIndex, INDEX_VERSION};
pub use store::{MergeOutcome, TaskStore};
