pub mod content;
pub mod engine;
pub mod options;
pub mod prompts;
pub mod run;
pub mod summary;

pub use engine::{Collaborators, Pipeline, PipelinePaths};
pub use options::RunOptions;
pub use run::{SetupError, run};
pub use summary::RunSummary;
