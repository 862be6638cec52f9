use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::Tunables;
use crate::store::VocabularyStore;

static NUMERIC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").unwrap());
static QUANTITY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[xX×]\d+$").unwrap());

pub const ACCEPT_MARKER: &str = "接受";
pub const ABANDON_MARKER: &str = "放弃";
pub const REWARD_LABEL: &str = "奖励";

pub const NARRATIVE_OPENERS: &[&str] = &["有一名", "还声称", "一支从", "必须", "委托", "尽快"];

/// Fragments that never occur in a header name.
const EXCLUDED_FRAGMENTS: &[&str] = &[
    REWARD_LABEL, "任务时限", "敌人等级", "时限", "等级",
    ACCEPT_MARKER, ABANDON_MARKER,
    "有一名", "还声称", "一支从", "必须", "委托", "尽快",
    "×", "：", ":",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Rect { x, y, width, height }
    }

    /// Click point.
    pub fn center(&self) -> (u32, u32) {
        (
            self.x.saturating_add(self.width / 2),
            self.y.saturating_add(self.height / 2),
        )
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub rect: Rect,
}

impl Token {
    pub fn new(text: impl Into<String>, rect: Rect) -> Self {
        Token {
            text: text.into(),
            rect,
        }
    }

    pub fn y(&self) -> u32 {
        self.rect.y
    }

    pub fn bottom(&self) -> u32 {
        self.rect.bottom()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonKind {
    Accept,
    Abandon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Button(ButtonKind),
    Header,
    Body,
}

impl TokenKind {
    pub fn label(&self) -> &'static str {
        match self {
            TokenKind::Button(ButtonKind::Accept) => "accept",
            TokenKind::Button(ButtonKind::Abandon) => "abandon",
            TokenKind::Header => "header",
            TokenKind::Body => "body",
        }
    }
}

/// Substring match so OCR noise around the label still counts.
pub fn classify_button(text: &str) -> Option<ButtonKind> {
    if text.contains(ACCEPT_MARKER) {
        Some(ButtonKind::Accept)
    } else if text.contains(ABANDON_MARKER) {
        Some(ButtonKind::Abandon)
    } else {
        None
    }
}

pub fn is_numeric(text: &str) -> bool {
    NUMERIC_RE.is_match(text)
}

/// `x328`, `X5`, `×12`.
pub fn is_quantity(text: &str) -> bool {
    QUANTITY_RE.is_match(text)
}

pub fn is_reward_candidate(text: &str) -> bool {
    is_quantity(text) || is_numeric(text)
}

/// Only meaningful for non-button tokens.
pub fn is_header_candidate(token: &Token, vocab: &VocabularyStore, t: &Tunables) -> bool {
    let text = token.text.as_str();
    let len = text.chars().count();
    if len < t.min_header_len || len > t.max_header_len {
        return false;
    }
    if EXCLUDED_FRAGMENTS.iter().any(|f| text.contains(f)) {
        return false;
    }
    if is_reward_candidate(text) {
        return false;
    }
    if vocab.contains(text) {
        return true;
    }
    (t.band_top..=t.band_bottom).contains(&token.y())
}

pub fn classify(token: &Token, vocab: &VocabularyStore, t: &Tunables) -> TokenKind {
    if let Some(kind) = classify_button(&token.text) {
        TokenKind::Button(kind)
    } else if is_header_candidate(token, vocab, t) {
        TokenKind::Header
    } else {
        TokenKind::Body
    }
}
