//! Worker requests for each stage.
//!
//! Each stage gets its own capability allow-list and turn budget:
//! evaluation is read-only, prep may run commands but not edit, and only
//! implementation gets the full toolbox. The prompts ask for a fenced JSON
//! block, but nothing downstream depends on getting one — extraction is
//! tolerant by contract.

use db::models::subtask::DiscreteSubtask;
use db::models::task::Task;
use executors::WorkerRequest;

pub const EVALUATION_TOOLS: &[&str] = &["Read", "Grep", "Glob"];
pub const PREP_TOOLS: &[&str] = &["Read", "Grep", "Glob", "Bash"];
pub const IMPLEMENTATION_TOOLS: &[&str] = &["Read", "Grep", "Glob", "Edit", "Write", "Bash"];

pub const EVALUATION_TURNS: u32 = 15;
pub const PREP_TURNS: u32 = 30;
pub const IMPLEMENTATION_TURNS: u32 = 80;

pub fn evaluation_request(task: &Task) -> WorkerRequest {
    let instruction = format!(
        "You are triaging a paid bounty. Assess whether it is worth attempting.\n\n\
         {}\n\n\
         The task has been attempted by {} other hunter(s) so far.\n\n\
         Reply with a fenced ```json block containing exactly these fields:\n\
         {{\"decision\": \"go|no-go|caution\", \"complexity\": 1-10,\n\
          \"success_probability\": 0-100, \"risk_level\": \"low|medium|high\",\n\
          \"confidence\": 0-100, \"rationale\": [\"...\"]}}\n",
        task.to_prompt(),
        task.attempt_count
    );
    WorkerRequest::new(instruction)
        .with_tools(EVALUATION_TOOLS.iter().copied())
        .with_max_turns(EVALUATION_TURNS)
}

pub fn prep_request(task: &Task) -> WorkerRequest {
    let instruction = format!(
        "You are preparing to implement a bounty inside this checkout.\n\n\
         {}\n\n\
         Explore the repository, then write a prep document covering: the \
         approach, the files you expect to change, how you will test the \
         change, and the main risk. Finish with a numbered implementation \
         plan, one discrete step per line; annotate ordering constraints as \
         \"(depends on N)\" and effort as \"(~M min)\".\n",
        task.to_prompt()
    );
    WorkerRequest::new(instruction)
        .with_tools(PREP_TOOLS.iter().copied())
        .with_max_turns(PREP_TURNS)
}

pub fn implementation_request(task: &Task, plan: &[DiscreteSubtask]) -> WorkerRequest {
    let plan_text = if plan.is_empty() {
        "No prep plan was recorded; derive the steps from the task itself.".to_string()
    } else {
        let mut lines = vec!["Work through the prep plan in order:".to_string()];
        for (position, subtask) in plan.iter().enumerate() {
            lines.push(format!("{}. {}", position + 1, subtask.description));
        }
        lines.join("\n")
    };

    let instruction = format!(
        "Implement this bounty in the current checkout. Commit nothing; \
         leave the working tree holding the finished change.\n\n\
         {}\n\n\
         {}\n\n\
         Run the test suite before you finish. End your reply with a fenced \
         ```json block:\n\
         {{\"tests_passing\": bool, \"requirements_met\": bool,\n\
          \"quality_validated\": bool, \"summary\": \"one line\"}}\n",
        task.to_prompt(),
        plan_text
    );
    WorkerRequest::new(instruction)
        .with_tools(IMPLEMENTATION_TOOLS.iter().copied())
        .with_max_turns(IMPLEMENTATION_TURNS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::models::task::{IngestedTask, Reward};

    fn task() -> Task {
        Task::from_ingested(IngestedTask {
            id: "t-1".to_string(),
            org: "acme".to_string(),
            repo: "widget".to_string(),
            issue_number: Some(4),
            title: "Fix the frobnicator".to_string(),
            body: "It frobs when it should nicate.".to_string(),
            url: "https://example.com/t-1".to_string(),
            reward: Reward::new(10_000, "USD"),
            attempt_count: 2,
        })
    }

    #[test]
    fn test_evaluation_request_is_read_only() {
        let request = evaluation_request(&task());
        assert!(request.instruction.contains("Fix the frobnicator"));
        assert!(request.instruction.contains("2 other hunter(s)"));
        assert_eq!(request.allowed_tools, vec!["Read", "Grep", "Glob"]);
        assert_eq!(request.max_turns, Some(EVALUATION_TURNS));
        assert!(!request.allowed_tools.contains(&"Edit".to_string()));
    }

    #[test]
    fn test_stage_budgets_escalate() {
        let t = task();
        let eval = evaluation_request(&t);
        let prep = prep_request(&t);
        let implementation = implementation_request(&t, &[]);
        assert!(eval.max_turns < prep.max_turns);
        assert!(prep.max_turns < implementation.max_turns);
        assert!(implementation.allowed_tools.contains(&"Write".to_string()));
    }

    #[test]
    fn test_implementation_request_lists_plan_in_order() {
        let plan = vec![
            DiscreteSubtask::new("st-1", "add a failing test"),
            DiscreteSubtask::new("st-2", "fix the tokenizer"),
        ];
        let request = implementation_request(&task(), &plan);
        let test_pos = request.instruction.find("1. add a failing test").unwrap();
        let fix_pos = request.instruction.find("2. fix the tokenizer").unwrap();
        assert!(test_pos < fix_pos);
    }

    #[test]
    fn test_empty_plan_falls_back_to_task_text() {
        let request = implementation_request(&task(), &[]);
        assert!(request.instruction.contains("No prep plan was recorded"));
    }
}
