//! Agent module for Watch Pro
//!
//! This module contains the orchestration workflow, the model transcript
//! built from chat history, and the structured outputs the workflow parses.

pub mod conversation;
pub mod output;
pub mod workflow;

pub use conversation::Conversation;
pub use output::{Inquiry, InquiryOption, NextAction, RelatedQueries, RelatedQuery};
pub use workflow::{Outcome, Submission, Workflow, WorkflowEvent, WorkflowRun};
