use serde::{Deserialize, Serialize};

use super::segments::Segment;
use super::tokens::{
    is_header_candidate, is_reward_candidate, ButtonKind, Rect, Token, NARRATIVE_OPENERS,
    REWARD_LABEL,
};
use crate::config::Tunables;
use crate::store::VocabularyStore;

const TIME_LIMIT_PREFIXES: &[&str] = &["任务时限：", "任务时限:"];
const DIFFICULTY_PREFIXES: &[&str] = &["敌人等级：", "敌人等级:"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub name: String,
    pub description: String,
    pub reward: Option<String>,
    pub time_limit: Option<String>,
    pub difficulty: Option<String>,
    pub accept_box: Option<Rect>,
    pub abandon_box: Option<Rect>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Button {
    pub kind: ButtonKind,
    pub rect: Rect,
}

/// Build one record from a segment. `tokens` is the full y-sorted body
/// sequence the segment indexes into; `buttons` must be sorted by y.
pub fn extract_record(
    segment: &Segment,
    tokens: &[Token],
    buttons: &[Button],
    vocab: &VocabularyStore,
    tunables: &Tunables,
) -> Option<TaskRecord> {
    let mut name = None;
    let mut description = String::new();
    let mut reward: Vec<&str> = Vec::new();
    let mut time_limit = None;
    let mut difficulty = None;

    for (offset, token) in segment.tokens(tokens).iter().enumerate() {
        let text = token.text.as_str();
        if name.is_none() && is_header_candidate(token, vocab, tunables) {
            name = Some(text.to_string());
            continue;
        }

        if let Some(value) = strip_label(text, TIME_LIMIT_PREFIXES) {
            time_limit = value.or(time_limit);
        } else if let Some(value) = strip_label(text, DIFFICULTY_PREFIXES) {
            difficulty = value.or(difficulty);
        } else if is_description(text, tunables) {
            description.push_str(text);
        } else if is_reward_candidate(text)
            && near_reward_label(tokens, segment.range.start + offset, tunables.reward_window)
        {
            reward.push(text);
        }
    }

    let name = name?;
    let (top, bottom) = segment.span(tokens)?;
    let find_button = |kind: ButtonKind| {
        buttons
            .iter()
            .find(|b| b.kind == kind && (top..=bottom).contains(&b.rect.y))
            .map(|b| b.rect)
    };

    Some(TaskRecord {
        name,
        description,
        reward: if reward.is_empty() {
            None
        } else {
            Some(reward.join(" + "))
        },
        time_limit,
        difficulty,
        accept_box: find_button(ButtonKind::Accept),
        abandon_box: find_button(ButtonKind::Abandon),
    })
}

/// `Some(value)` when `text` carries one of the labels; an empty value is `None`.
fn strip_label(text: &str, prefixes: &[&str]) -> Option<Option<String>> {
    let rest = prefixes.iter().find_map(|p| text.strip_prefix(p))?.trim();
    Some((!rest.is_empty()).then(|| rest.to_string()))
}

fn is_description(text: &str, tunables: &Tunables) -> bool {
    NARRATIVE_OPENERS.iter().any(|p| text.starts_with(p))
        || text.chars().count() >= tunables.long_text_len
}

fn near_reward_label(tokens: &[Token], idx: usize, radius: usize) -> bool {
    let lo = idx.saturating_sub(radius);
    let hi = (idx + radius).min(tokens.len().saturating_sub(1));
    tokens[lo..=hi].iter().any(|t| t.text.contains(REWARD_LABEL))
}
