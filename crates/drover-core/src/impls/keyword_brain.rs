//! KeywordBrain - LLM なしで動く既定の Brain
//!
//! タスク説明の先頭の動詞（click / type / scroll / search / open）と
//! いくつかのキーワードから Tool を選びます。
//! プランナーが `precomputed_intent` に `{"tool": .., "params": ..}` を
//! 入れていれば、それをそのまま使います。

use async_trait::async_trait;

use crate::ports::tool::names;
use crate::ports::{Brain, BrainInput, BrainThought};

#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordBrain;

#[async_trait]
impl Brain for KeywordBrain {
    async fn propose_next_step(&self, input: BrainInput<'_>) -> BrainThought {
        if let Some(thought) = precomputed(input) {
            return thought;
        }
        let description = input.task.description.trim();
        propose(description, input.screen_context)
    }
}

fn precomputed(input: BrainInput<'_>) -> Option<BrainThought> {
    let intent = input.task.precomputed_intent.as_ref()?;
    let tool = intent.get("tool")?.as_str()?;
    let params = match intent.get("params") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "{}".to_string(),
    };
    Some(BrainThought::new("Planner supplied the action.", tool, params))
}

/// Case-insensitive `strip_prefix` on a word followed by whitespace.
fn after_verb<'a>(description: &'a str, verbs: &[&str]) -> Option<&'a str> {
    let lower = description.to_lowercase();
    verbs.iter().find_map(|verb| {
        let rest = lower.strip_prefix(verb)?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        // ASCII verbs keep byte offsets aligned between `lower` and `description`.
        description.get(verb.len()..).map(str::trim)
    })
}

fn propose(description: &str, screen: &str) -> BrainThought {
    if let Some(target) = after_verb(description, &["click on", "click"]) {
        if !screen.trim().is_empty() && !screen.to_lowercase().contains(&target.to_lowercase()) {
            return BrainThought::new(
                format!("Target '{target}' is not visible on screen. I should scroll down to find it."),
                names::SCROLL,
                "down",
            );
        }
        return BrainThought::new(format!("User asked to click '{target}'."), "click_element", target);
    }
    if let Some(text) = after_verb(description, &["type"]) {
        return BrainThought::new(format!("User asked to type '{text}'."), "input_text", text);
    }
    if let Some(direction) = after_verb(description, &["scroll"]) {
        return BrainThought::new(format!("User asked to scroll '{direction}'."), names::SCROLL, direction);
    }
    if let Some(query) = after_verb(description, &["search for", "search", "browse"]) {
        return BrainThought::new(format!("User asked to search for '{query}'."), "open_chrome", query);
    }
    if let Some(app) = after_verb(description, &["open", "launch"])
        && !app.to_lowercase().contains("settings")
    {
        return BrainThought::new(format!("User asked to launch app '{app}'."), "launch_app", app);
    }

    let lower = description.to_lowercase();
    let (reasoning, tool) = if lower.contains("home") {
        ("User asked to go home.", "go_home")
    } else if lower.contains("settings") {
        ("User asked to open settings.", "open_settings")
    } else if lower.contains("back") {
        ("User asked to go back.", names::GO_BACK)
    } else if lower.contains("screen") || lower.contains("read") {
        ("User asked to read screen content.", names::READ_SCREEN)
    } else {
        return BrainThought::unknown("I don't know how to handle this task yet.");
    };
    BrainThought::new(reasoning, tool, "{}")
}
