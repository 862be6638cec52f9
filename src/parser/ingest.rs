use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

use super::tokens::{Rect, Token};

/// Read a recognizer dump from disk. Only unreadable files or invalid JSON
/// are errors; bad individual entries are normalized or skipped.
pub fn read_tokens(path: &Path) -> Result<Vec<Token>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;
    Ok(tokens_from_json(&value))
}

/// Accepts a bare array of results, or an object carrying one under
/// `all_results` or `tokens`.
pub fn tokens_from_json(value: &Value) -> Vec<Token> {
    let entries: &[Value] = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("all_results").or_else(|| map.get("tokens")) {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        },
        _ => &[],
    };

    let tokens: Vec<Token> = entries.iter().filter_map(token_from_entry).collect();
    if tokens.len() != entries.len() {
        debug!("Dropped {} entries without text", entries.len() - tokens.len());
    }
    tokens
}

fn token_from_entry(entry: &Value) -> Option<Token> {
    let text = entry.get("text")?.as_str()?;
    let rect = entry.get("box").map(rect_from_json).unwrap_or_default();
    Some(Token::new(text, rect))
}

/// `[x, y, w, h]` or `{x, y, width|w, height|h}`; anything else is the zero rect.
fn rect_from_json(value: &Value) -> Rect {
    let parts = match value {
        Value::Array(items) if items.len() >= 4 => {
            [&items[0], &items[1], &items[2], &items[3]].map(coord)
        }
        Value::Object(map) => {
            let get = |keys: &[&str]| keys.iter().find_map(|k| map.get(*k)).and_then(coord);
            [get(&["x"]), get(&["y"]), get(&["width", "w"]), get(&["height", "h"])]
        }
        _ => return Rect::default(),
    };
    match parts {
        [Some(x), Some(y), Some(w), Some(h)] => Rect::new(x, y, w, h),
        _ => Rect::default(),
    }
}

fn coord(value: &Value) -> Option<u32> {
    let n = value.as_f64()?;
    if !n.is_finite() {
        return None;
    }
    Some(n.round().clamp(0.0, u32::MAX as f64) as u32)
}
