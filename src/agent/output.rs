//! Structured outputs of the classify, inquire and suggest steps
//!
//! Models are asked for a single JSON object. Replies are often wrapped in
//! prose or a Markdown code fence, so parsing first extracts the outermost
//! `{...}` span.

use crate::error::{Result, WatchProError};
use crate::prompts::Step;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Number of related queries a suggestion must carry
pub const RELATED_QUERY_COUNT: usize = 3;

/// Next action chosen by the task manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NextAction {
    Proceed,
    Inquire,
}

/// Task manager reply, `{"next": ...}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDecision {
    pub next: NextAction,
}

/// One predefined answer of an inquiry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InquiryOption {
    pub value: String,
    pub label: String,
}

/// Clarifying question shown to the user as a form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inquiry {
    pub question: String,
    #[serde(default)]
    pub options: Vec<InquiryOption>,
    #[serde(default)]
    pub allows_input: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_placeholder: Option<String>,
}

/// One suggested follow-up query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedQuery {
    pub query: String,
}

/// Suggested follow-up queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedQueries {
    pub items: Vec<RelatedQuery>,
}

impl RelatedQueries {
    /// Keeps exactly [`RELATED_QUERY_COUNT`] non-blank queries
    ///
    /// Extra items are dropped.
    ///
    /// # Errors
    ///
    /// Returns `WatchProError::InvalidModelOutput` when fewer remain.
    pub fn normalize(mut self) -> Result<Self> {
        self.items.retain(|item| !item.query.trim().is_empty());
        if self.items.len() < RELATED_QUERY_COUNT {
            return Err(invalid(
                Step::QuerySuggestor,
                format!(
                    "expected {} related queries, got {}",
                    RELATED_QUERY_COUNT,
                    self.items.len()
                ),
            ));
        }
        self.items.truncate(RELATED_QUERY_COUNT);
        Ok(self)
    }
}

fn invalid(step: Step, message: impl Into<String>) -> anyhow::Error {
    WatchProError::InvalidModelOutput {
        step: step.to_string(),
        message: message.into(),
    }
    .into()
}

/// Returns the outermost `{...}` span of `text`, if any
fn json_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parses the JSON object a model produced for `step`
///
/// # Errors
///
/// Returns `WatchProError::InvalidModelOutput` if the text holds no JSON
/// object or the object does not match `T`.
///
/// # Examples
///
/// ```
/// use watchpro::agent::output::{parse_model_json, NextAction, TaskDecision};
/// use watchpro::prompts::Step;
///
/// let reply = "```json\n{\"next\": \"inquire\"}\n```";
/// let decision: TaskDecision = parse_model_json(Step::TaskManager, reply).unwrap();
/// assert_eq!(decision.next, NextAction::Inquire);
/// ```
pub fn parse_model_json<T: DeserializeOwned>(step: Step, text: &str) -> Result<T> {
    let span = json_object_span(text).ok_or_else(|| invalid(step, "no JSON object in reply"))?;
    serde_json::from_str(span).map_err(|e| invalid(step, e.to_string()))
}

/// Parses and checks an inquiry
///
/// # Errors
///
/// Returns `WatchProError::InvalidModelOutput` if the reply is malformed or
/// the question is blank.
pub fn parse_inquiry(text: &str) -> Result<Inquiry> {
    let inquiry: Inquiry = parse_model_json(Step::Inquire, text)?;
    if inquiry.question.trim().is_empty() {
        return Err(invalid(Step::Inquire, "inquiry question is empty"));
    }
    Ok(inquiry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queries(n: usize) -> RelatedQueries {
        RelatedQueries {
            items: (0..n)
                .map(|i| RelatedQuery {
                    query: format!("query {}", i),
                })
                .collect(),
        }
    }

    #[test]
    fn test_parse_decision_with_surrounding_prose() {
        let decision: TaskDecision =
            parse_model_json(Step::TaskManager, "Sure. {\"next\": \"proceed\"} Done.").unwrap();
        assert_eq!(decision.next, NextAction::Proceed);
    }

    #[test]
    fn test_parse_decision_unknown_action() {
        let err = parse_model_json::<TaskDecision>(Step::TaskManager, "{\"next\": \"search\"}")
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WatchProError>(),
            Some(WatchProError::InvalidModelOutput { step, .. }) if step == "task_manager"
        ));
    }

    #[test]
    fn test_parse_without_json_object() {
        assert!(parse_model_json::<TaskDecision>(Step::TaskManager, "proceed").is_err());
        assert!(parse_model_json::<TaskDecision>(Step::TaskManager, "} {").is_err());
    }

    #[test]
    fn test_parse_inquiry_camel_case() {
        let inquiry = parse_inquiry(
            r#"{"question":"Which size?","options":[{"value":"38","label":"38mm"}],"allowsInput":true,"inputPlaceholder":"e.g. 40mm"}"#,
        )
        .unwrap();
        assert!(inquiry.allows_input);
        assert_eq!(inquiry.options[0].label, "38mm");
        assert_eq!(inquiry.input_placeholder.as_deref(), Some("e.g. 40mm"));
        assert!(inquiry.input_label.is_none());

        let json = serde_json::to_value(&inquiry).unwrap();
        assert_eq!(json["allowsInput"], true);
        assert!(json.get("inputLabel").is_none());
    }

    #[test]
    fn test_parse_inquiry_blank_question() {
        assert!(parse_inquiry(r#"{"question":"  ","options":[]}"#).is_err());
    }

    #[test]
    fn test_related_queries_truncated_to_three() {
        let normalized = queries(5).normalize().unwrap();
        assert_eq!(normalized.items.len(), 3);
        assert_eq!(normalized.items[2].query, "query 2");
    }

    #[test]
    fn test_related_queries_too_few() {
        assert!(queries(2).normalize().is_err());

        let mut blank = queries(3);
        blank.items[1].query = " ".to_string();
        assert!(blank.normalize().is_err());
    }
}
