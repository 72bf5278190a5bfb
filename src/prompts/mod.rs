//! System prompts for the workflow steps
//!
//! Each model call in the orchestration workflow (classify, inquire,
//! research, suggest) runs under its own system prompt. The classify,
//! inquire and suggest prompts ask for a single JSON object so the reply can
//! be parsed into the matching structured output.

pub mod research_prompt;
pub mod task_prompt;

pub use research_prompt::{generate_researcher_prompt, generate_suggestor_prompt};
pub use task_prompt::{generate_inquire_prompt, generate_task_manager_prompt};

/// Fixed text of the `followup` message appended after every answer
pub const FOLLOWUP_TEXT: &str = "Is there anything else about watches you would like to know?";

/// Workflow steps that run under a system prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    TaskManager,
    Inquire,
    Researcher,
    QuerySuggestor,
}

impl Step {
    /// Name used in logs and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::TaskManager => "task_manager",
            Step::Inquire => "inquire",
            Step::Researcher => "researcher",
            Step::QuerySuggestor => "query_suggestor",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the system prompt for a workflow step
///
/// # Examples
///
/// ```
/// use watchpro::prompts::{build_system_prompt, Step};
///
/// let prompt = build_system_prompt(Step::TaskManager);
/// assert!(prompt.contains("\"next\""));
/// ```
pub fn build_system_prompt(step: Step) -> String {
    match step {
        Step::TaskManager => generate_task_manager_prompt(),
        Step::Inquire => generate_inquire_prompt(),
        Step::Researcher => generate_researcher_prompt(chrono::Utc::now()),
        Step::QuerySuggestor => generate_suggestor_prompt(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_system_prompt_not_empty() {
        for step in [
            Step::TaskManager,
            Step::Inquire,
            Step::Researcher,
            Step::QuerySuggestor,
        ] {
            let prompt = build_system_prompt(step);
            assert!(prompt.len() > 50, "Prompt too short for {}", step);
            assert!(prompt.to_lowercase().contains("watch"));
        }
    }

    #[test]
    fn test_structured_prompts_request_json() {
        assert!(build_system_prompt(Step::TaskManager).contains("JSON"));
        assert!(build_system_prompt(Step::Inquire).contains("JSON"));
        assert!(build_system_prompt(Step::QuerySuggestor).contains("JSON"));
    }

    #[test]
    fn test_step_names() {
        assert_eq!(Step::QuerySuggestor.to_string(), "query_suggestor");
        assert_eq!(Step::TaskManager.as_str(), "task_manager");
    }
}
