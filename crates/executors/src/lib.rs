pub mod command;
pub mod executors;
pub mod extract;

pub use executors::{CodingAgent, ExecutorError, WorkerRequest, WorkerResponse};
