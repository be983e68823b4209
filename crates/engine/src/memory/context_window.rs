//! Per-NPC bounded message log and graphization triggering (§3.7, §4.2.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Approximate token count when no real tokenizer is wired up: Chinese
/// characters count double a non-Chinese one, rounded up (§4.2.4).
pub fn count_tokens(text: &str) -> u32 {
    let mut chinese = 0u32;
    let mut other = 0u32;
    for ch in text.chars() {
        if is_chinese(ch) {
            chinese += 1;
        } else {
            other += 1;
        }
    }
    chinese / 2 + other / 4 + 1
}

fn is_chinese(ch: char) -> bool {
    matches!(ch as u32, 0x4E00..=0x9FFF | 0x3400..=0x4DBF)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub token_count: u32,
    pub is_graphized: bool,
    pub graphized_at: Option<DateTime<Utc>>,
}

/// The net effect of a `remove_graphized_messages` call (§4.2.4).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphizationRemoval {
    pub removed_count: usize,
    pub tokens_freed: u32,
}

#[derive(Debug, Clone)]
pub struct ContextWindow {
    messages: Vec<WindowMessage>,
    system_prompt: String,
    system_prompt_tokens: u32,
    max_tokens: u32,
    graphize_threshold: f64,
    keep_recent_tokens: u32,
    current_tokens: u32,
    next_id: u64,
}

impl ContextWindow {
    pub fn new(system_prompt: impl Into<String>, max_tokens: u32, graphize_threshold: f64, keep_recent_tokens: u32) -> Self {
        let system_prompt = system_prompt.into();
        let system_prompt_tokens = count_tokens(&system_prompt);
        Self {
            messages: Vec::new(),
            system_prompt,
            system_prompt_tokens,
            max_tokens,
            graphize_threshold,
            keep_recent_tokens,
            current_tokens: 0,
            next_id: 0,
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn messages(&self) -> &[WindowMessage] {
        &self.messages
    }

    /// Invariant (§3.7): `current_tokens = system_prompt_tokens + Σ token_count`.
    pub fn current_tokens(&self) -> u32 {
        self.current_tokens + self.system_prompt_tokens
    }

    pub fn usage_ratio(&self) -> f64 {
        if self.max_tokens == 0 {
            return 0.0;
        }
        self.current_tokens() as f64 / self.max_tokens as f64
    }

    pub fn available_tokens(&self) -> u32 {
        self.max_tokens.saturating_sub(self.current_tokens())
    }

    pub fn should_graphize(&self) -> bool {
        self.usage_ratio() >= self.graphize_threshold
    }

    /// Append a message, returning its assigned id and whether this push
    /// crossed `graphize_threshold` (§4.2.4).
    pub fn add_message(&mut self, role: MessageRole, content: impl Into<String>, now: DateTime<Utc>) -> (String, bool) {
        let content = content.into();
        let token_count = count_tokens(&content);
        let id = format!("msg-{}", self.next_id);
        self.next_id += 1;

        self.messages.push(WindowMessage {
            id: id.clone(),
            role,
            content,
            timestamp: now,
            token_count,
            is_graphized: false,
            graphized_at: None,
        });
        self.current_tokens += token_count;

        (id, self.should_graphize())
    }

    /// Walk from the newest message backward, accumulating tokens while the
    /// running sum stays `<= keep_recent_tokens`; stop (don't skip) the
    /// first time a message would exceed the budget. Every remaining
    /// non-graphized message older than the kept tail is a graphization
    /// candidate (§4.2.4).
    pub fn select_messages_for_graphize(&self) -> Vec<String> {
        let mut keep_ids = std::collections::HashSet::new();
        let mut accumulated = 0u32;
        for msg in self.messages.iter().rev() {
            if accumulated + msg.token_count > self.keep_recent_tokens {
                break;
            }
            accumulated += msg.token_count;
            keep_ids.insert(msg.id.clone());
        }

        self.messages
            .iter()
            .filter(|m| !keep_ids.contains(&m.id) && !m.is_graphized)
            .map(|m| m.id.clone())
            .collect()
    }

    /// Flag the given message ids graphized (§4.2.4).
    pub fn mark_messages_graphized(&mut self, ids: &[String], now: DateTime<Utc>) {
        let id_set: std::collections::HashSet<&str> = ids.iter().map(String::as_str).collect();
        for msg in &mut self.messages {
            if id_set.contains(msg.id.as_str()) {
                msg.is_graphized = true;
                msg.graphized_at = Some(now);
            }
        }
    }

    /// Drop all flagged messages, decrementing `current_tokens` by their
    /// summed count (§4.2.4).
    pub fn remove_graphized_messages(&mut self) -> GraphizationRemoval {
        let mut tokens_freed = 0u32;
        let mut removed_count = 0usize;
        self.messages.retain(|m| {
            if m.is_graphized {
                tokens_freed += m.token_count;
                removed_count += 1;
                false
            } else {
                true
            }
        });
        self.current_tokens = self.current_tokens.saturating_sub(tokens_freed);
        GraphizationRemoval {
            removed_count,
            tokens_freed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn current_tokens_matches_invariant() {
        let mut window = ContextWindow::new("sys", 1000, 0.9, 400);
        window.add_message(MessageRole::User, "hello there", now());
        window.add_message(MessageRole::Assistant, "hi!", now());
        let total: u32 = window.messages().iter().map(|m| m.token_count).sum();
        assert_eq!(window.current_tokens(), window.system_prompt_tokens + total);
    }

    #[test]
    fn should_graphize_flips_past_threshold() {
        let mut window = ContextWindow::new("s", 100, 0.5, 20);
        assert!(!window.should_graphize());
        let long = "x".repeat(400);
        window.add_message(MessageRole::User, long, now());
        assert!(window.should_graphize());
    }

    #[test]
    fn select_for_graphize_keeps_recent_tail() {
        let mut window = ContextWindow::new("s", 10_000, 0.9, 10);
        for i in 0..5 {
            window.add_message(MessageRole::User, format!("msg number {i} content here"), now());
        }
        let candidates = window.select_messages_for_graphize();
        assert!(!candidates.is_empty());
        let kept: Vec<&WindowMessage> = window
            .messages()
            .iter()
            .filter(|m| !candidates.contains(&m.id))
            .collect();
        let kept_total: u32 = kept.iter().map(|m| m.token_count).sum();
        assert!(kept_total <= 10);
    }

    #[test]
    fn mark_then_remove_frees_tokens_and_keeps_invariant() {
        let mut window = ContextWindow::new("s", 10_000, 0.9, 5);
        for i in 0..6 {
            window.add_message(MessageRole::User, format!("message {i} with some text"), now());
        }
        let candidates = window.select_messages_for_graphize();
        assert!(!candidates.is_empty());
        window.mark_messages_graphized(&candidates, now());
        let result = window.remove_graphized_messages();
        assert_eq!(result.removed_count, candidates.len());

        let total: u32 = window.messages().iter().map(|m| m.token_count).sum();
        assert_eq!(window.current_tokens(), window.system_prompt_tokens + total);
    }

    #[test]
    fn chinese_text_counts_at_half_rate() {
        let tokens = count_tokens("你好世界");
        assert_eq!(tokens, 4 / 2 + 1);
    }
}
