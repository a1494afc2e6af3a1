//! Learning-extraction heuristic — invoked asynchronously after a
//! successful turn. Best-effort: failures are logged, never surfaced to the
//! client, mirroring the fire-and-forget persistence pattern already used for
//! [`crate::engine::repositories::MessageRepository`].

use std::sync::Arc;

use crate::engine::repositories::{LearningEntry, LearningStore};

const CORRECTION_KEYWORDS: &[&str] = &["no,", "that's wrong", "incorrect", "actually,", "not right", "fix that"];
const PREFERENCE_KEYWORDS: &[&str] = &["i prefer", "i like", "always use", "never use", "from now on"];
const FACT_KEYWORDS: &[&str] = &["my name is", "i am", "i work at", "remember that"];
const SKILL_KEYWORDS: &[&str] = &["how do i", "how to", "teach me", "show me how"];

/// Classify `user_message` by keyword group. Falls back to `general` when no
/// group matches.
fn classify(user_message: &str) -> &'static str {
    let lower = user_message.to_lowercase();
    if CORRECTION_KEYWORDS.iter().any(|k| lower.contains(k)) {
        "correction"
    } else if PREFERENCE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        "preference"
    } else if FACT_KEYWORDS.iter().any(|k| lower.contains(k)) {
        "fact"
    } else if SKILL_KEYWORDS.iter().any(|k| lower.contains(k)) {
        "skill"
    } else {
        "general"
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

fn build_summary(user_message: &str, assistant_message: &str) -> String {
    format!(
        "User: {} | Assistant: {}",
        truncate(user_message, 200),
        truncate(assistant_message, 300)
    )
}

/// Extract and submit one learning entry for `agent_name`. Spawns its own
/// task so the caller (the end of the orchestration loop) never waits on it.
pub fn extract_and_submit(
    store: Arc<dyn LearningStore>,
    agent_name: String,
    user_message: String,
    assistant_message: String,
) {
    tokio::spawn(async move {
        let category = classify(&user_message).to_string();
        let summary = build_summary(&user_message, &assistant_message);
        let entry = LearningEntry {
            agent_name,
            category,
            summary,
        };
        if let Err(e) = store.submit(entry).await {
            log::warn!("learning store submission failed: {}", e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_correction() {
        assert_eq!(classify("No, that's wrong, try again"), "correction");
    }

    #[test]
    fn classifies_preference() {
        assert_eq!(classify("I prefer tabs over spaces"), "preference");
    }

    #[test]
    fn classifies_fact() {
        assert_eq!(classify("My name is Angel and I work at a startup"), "fact");
    }

    #[test]
    fn classifies_skill_question() {
        assert_eq!(classify("How do I set up a cron job?"), "skill");
    }

    #[test]
    fn falls_back_to_general() {
        assert_eq!(classify("What's the weather like today?"), "general");
    }

    #[test]
    fn truncates_long_text_with_ellipsis() {
        let long = "a".repeat(500);
        let truncated = truncate(&long, 200);
        assert_eq!(truncated.chars().count(), 203);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn leaves_short_text_unchanged() {
        assert_eq!(truncate("short", 200), "short");
    }
}
