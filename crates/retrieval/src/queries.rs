//! Search query construction.

use parley_core::message::{Message, Role};

/// Build the search query set for a turn.
///
/// The current message is always query 0 (highest priority). When history
/// queries are enabled, up to `max_history` most recent *distinct* prior
/// human-turn contents are appended, newest first; content equal to the
/// current message is excluded.
pub fn build_queries(
    current_message: &str,
    history: &[Message],
    include_history: bool,
    max_history: usize,
) -> Vec<String> {
    let mut queries = vec![current_message.to_string()];

    if include_history && max_history > 0 {
        let mut from_history: Vec<String> = Vec::new();
        for message in history.iter().rev() {
            if from_history.len() >= max_history {
                break;
            }
            if message.role != Role::Human || message.content == current_message {
                continue;
            }
            if from_history.contains(&message.content) {
                continue;
            }
            from_history.push(message.content.clone());
        }
        tracing::debug!(
            total = 1 + from_history.len(),
            from_history = from_history.len(),
            "Built search queries"
        );
        queries.extend(from_history);
    }

    queries
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::session::SessionId;

    fn history(turns: &[(&str, Role)]) -> Vec<Message> {
        let sid = SessionId::new();
        turns
            .iter()
            .map(|(content, role)| match role {
                Role::Human => Message::human(sid.clone(), *content),
                Role::Ai => Message::ai(sid.clone(), *content),
            })
            .collect()
    }

    #[test]
    fn current_message_is_always_first() {
        let queries = build_queries("what is aspirin?", &[], true, 2);
        assert_eq!(queries, vec!["what is aspirin?"]);
    }

    #[test]
    fn history_queries_are_newest_first() {
        let hist = history(&[
            ("first question", Role::Human),
            ("first answer", Role::Ai),
            ("second question", Role::Human),
            ("second answer", Role::Ai),
            ("third question", Role::Human),
        ]);
        let queries = build_queries("current", &hist, true, 2);
        assert_eq!(queries, vec!["current", "third question", "second question"]);
    }

    #[test]
    fn ai_turns_are_ignored() {
        let hist = history(&[("answer text", Role::Ai)]);
        let queries = build_queries("current", &hist, true, 2);
        assert_eq!(queries, vec!["current"]);
    }

    #[test]
    fn current_message_excluded_from_history() {
        let hist = history(&[("repeat me", Role::Human), ("other", Role::Human)]);
        let queries = build_queries("repeat me", &hist, true, 2);
        assert_eq!(queries, vec!["repeat me", "other"]);
    }

    #[test]
    fn duplicate_history_contents_collapse() {
        let hist = history(&[
            ("same", Role::Human),
            ("same", Role::Human),
            ("different", Role::Human),
        ]);
        let queries = build_queries("current", &hist, true, 3);
        assert_eq!(queries, vec!["current", "same", "different"]);
    }

    #[test]
    fn disabled_history_yields_single_query() {
        let hist = history(&[("prior", Role::Human)]);
        assert_eq!(build_queries("current", &hist, false, 2).len(), 1);
        assert_eq!(build_queries("current", &hist, true, 0).len(), 1);
    }
}
