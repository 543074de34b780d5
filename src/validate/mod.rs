//! Structure validation for message sequences.
//!
//! Chat backends reject histories whose tool messages are not paired with a
//! preceding assistant tool call, or that contain duplicated entries.
//! Persisted history may have been written by an older, buggier writer, so it
//! is treated as untrusted input and repaired by dropping rather than by
//! failing the run.
//!
//! `validate` is pure and idempotent: running it over its own output yields
//! the same sequence.

use std::collections::HashSet;

use crate::types::{Message, Role};

/// Per-reason drop counts from one validation pass.
///
/// The validator itself never logs; callers decide how loudly to report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub kept: usize,
    pub dropped_duplicates: usize,
    pub dropped_orphan_tools: usize,
    pub dropped_missing_call_id: usize,
}

impl ValidationReport {
    /// Total number of messages removed.
    pub fn dropped(&self) -> usize {
        self.dropped_duplicates + self.dropped_orphan_tools + self.dropped_missing_call_id
    }

    /// Whether the input already satisfied every invariant.
    pub fn is_clean(&self) -> bool {
        self.dropped() == 0
    }
}

/// Equality key used for duplicate suppression. The tool-call id only
/// participates for tool messages; requested call ids only for assistant
/// messages, so successive no-content tool-call rounds are not conflated.
type Fingerprint<'a> = (Role, Option<&'a str>, Option<&'a str>, Vec<&'a str>);

fn fingerprint(message: &Message) -> Fingerprint<'_> {
    let call_id = if message.role == Role::Tool {
        message.tool_call_id.as_deref()
    } else {
        None
    };
    let requested: Vec<&str> = if message.role == Role::Assistant {
        message.tool_calls.iter().map(|c| c.id.as_str()).collect()
    } else {
        Vec::new()
    };
    (message.role, message.content.as_deref(), call_id, requested)
}

/// Validate a message sequence, returning the repaired sequence.
pub fn validate(messages: &[Message]) -> Vec<Message> {
    validate_report(messages).0
}

/// Validate a message sequence, returning the repaired sequence and a report
/// of what was dropped and why.
///
/// Single pass with local accumulator state: a running set of tool-call ids
/// introduced by assistant messages, and a set of fingerprints already seen.
/// First occurrence wins for duplicates; tool messages without a matching
/// prior call are dropped; relative order of kept messages is preserved.
pub fn validate_report(messages: &[Message]) -> (Vec<Message>, ValidationReport) {
    let mut kept = Vec::with_capacity(messages.len());
    let mut report = ValidationReport::default();
    let mut seen_call_ids: HashSet<&str> = HashSet::new();
    let mut seen_fingerprints: HashSet<Fingerprint<'_>> = HashSet::new();

    for message in messages {
        if !seen_fingerprints.insert(fingerprint(message)) {
            report.dropped_duplicates += 1;
            continue;
        }

        match message.role {
            Role::Tool => {
                let Some(call_id) = message.tool_call_id.as_deref() else {
                    report.dropped_missing_call_id += 1;
                    continue;
                };
                if !seen_call_ids.contains(call_id) {
                    report.dropped_orphan_tools += 1;
                    continue;
                }
            }
            Role::Assistant => {
                for call in &message.tool_calls {
                    seen_call_ids.insert(call.id.as_str());
                }
            }
            Role::System | Role::User => {}
        }

        kept.push(message.clone());
        report.kept += 1;
    }

    (kept, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolCall;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall::new(id, name, json!({}))
    }

    #[test]
    fn passes_well_formed_history_unchanged() {
        let history = vec![
            Message::system("be helpful"),
            Message::user("hi"),
            Message::assistant_tool_calls(None, vec![call("c1", "echo")]),
            Message::tool("c1", "hi"),
            Message::assistant("done"),
        ];
        let (validated, report) = validate_report(&history);
        assert_eq!(validated, history);
        assert!(report.is_clean());
        assert_eq!(report.kept, 5);
    }

    #[test]
    fn is_idempotent() {
        let history = vec![
            Message::user("hi"),
            Message::tool("orphan", "x"),
            Message::assistant_tool_calls(None, vec![call("c1", "echo")]),
            Message::tool("c1", "hi"),
            Message::tool("c1", "hi"),
        ];
        let once = validate(&history);
        let twice = validate(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn drops_duplicate_tool_response_keeping_first() {
        let history = vec![
            Message::user("hi"),
            Message::assistant_tool_calls(None, vec![call("c1", "echo")]),
            Message::tool("c1", "hi"),
            Message::tool("c1", "hi"),
        ];
        let (validated, report) = validate_report(&history);
        assert_eq!(validated.len(), 3);
        assert_eq!(report.dropped_duplicates, 1);
        assert_eq!(validated[2], history[2]);
    }

    #[test]
    fn orphan_tool_message_yields_empty_history() {
        let history = vec![Message::tool("zzz", "x")];
        let (validated, report) = validate_report(&history);
        assert!(validated.is_empty());
        assert_eq!(report.dropped_orphan_tools, 1);
    }

    #[test]
    fn orphan_removal_preserves_relative_order_of_the_rest() {
        let history = vec![
            Message::user("a"),
            Message::tool("nope", "orphan"),
            Message::assistant("b"),
            Message::user("c"),
        ];
        let validated = validate(&history);
        assert_eq!(
            validated,
            vec![history[0].clone(), history[2].clone(), history[3].clone()]
        );
    }

    #[test]
    fn drops_tool_message_missing_call_id() {
        let mut stray = Message::tool("c1", "result");
        stray.tool_call_id = None;
        let history = vec![
            Message::assistant_tool_calls(None, vec![call("c1", "echo")]),
            stray,
        ];
        let (validated, report) = validate_report(&history);
        assert_eq!(validated.len(), 1);
        assert_eq!(report.dropped_missing_call_id, 1);
    }

    #[test]
    fn duplicate_plain_messages_keep_first_occurrence() {
        let first = Message::user("same");
        let mut second = Message::user("same");
        // Timestamps differ; fingerprints intentionally do not include them.
        second.timestamp = first.timestamp + chrono::Duration::seconds(5);
        let history = vec![first.clone(), Message::assistant("ok"), second];
        let (validated, report) = validate_report(&history);
        assert_eq!(validated.len(), 2);
        assert_eq!(validated[0], first);
        assert_eq!(report.dropped_duplicates, 1);
    }

    #[test]
    fn successive_no_content_tool_call_rounds_are_not_duplicates() {
        let history = vec![
            Message::user("go"),
            Message::assistant_tool_calls(None, vec![call("c1", "echo")]),
            Message::tool("c1", "one"),
            Message::assistant_tool_calls(None, vec![call("c2", "echo")]),
            Message::tool("c2", "two"),
        ];
        let (validated, report) = validate_report(&history);
        assert_eq!(validated, history);
        assert!(report.is_clean());
    }

    #[test]
    fn tool_message_before_its_call_is_dropped() {
        let history = vec![
            Message::tool("c1", "too early"),
            Message::assistant_tool_calls(None, vec![call("c1", "echo")]),
        ];
        let (validated, report) = validate_report(&history);
        assert_eq!(validated.len(), 1);
        assert_eq!(report.dropped_orphan_tools, 1);
    }

    #[test]
    fn distinct_tool_responses_for_distinct_calls_survive() {
        let history = vec![
            Message::assistant_tool_calls(None, vec![call("c1", "echo"), call("c2", "date")]),
            Message::tool("c1", "hi"),
            Message::tool("c2", "2026-08-25"),
        ];
        let (validated, report) = validate_report(&history);
        assert_eq!(validated, history);
        assert!(report.is_clean());
    }
}
