use std::ops::Range;

use tracing::debug;

use super::tokens::{is_header_candidate, Token};
use crate::config::Tunables;
use crate::store::VocabularyStore;

/// A contiguous run of the y-sorted body tokens believed to form one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub range: Range<usize>,
}

impl Segment {
    pub fn tokens<'a>(&self, all: &'a [Token]) -> &'a [Token] {
        &all[self.range.clone()]
    }

    /// Inclusive vertical span from the topmost token's top edge to the
    /// lowest token's bottom edge, cut off above the next run's first token.
    pub fn span(&self, all: &[Token]) -> Option<(u32, u32)> {
        let tokens = self.tokens(all);
        let top = tokens.iter().map(Token::y).min()?;
        let mut bottom = tokens.iter().map(Token::bottom).max()?;
        if let Some(next) = all.get(self.range.end) {
            bottom = bottom.min(next.y().saturating_sub(1)).max(top);
        }
        Some((top, bottom))
    }
}

/// Split y-sorted, button-free tokens into per-record runs.
///
/// A header candidate opens a new run only when it sits more than
/// `gap_threshold` below the previous token; closer candidates stay in the
/// current run. Every header that opens a run is learned into `vocab`.
pub fn segment_tokens(
    tokens: &[Token],
    vocab: &mut VocabularyStore,
    tunables: &Tunables,
) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current: Option<usize> = None;

    for (i, token) in tokens.iter().enumerate() {
        let Some(start) = current else {
            if is_header_candidate(token, vocab, tunables) {
                vocab.learn(&token.text);
            }
            current = Some(i);
            continue;
        };

        if !is_header_candidate(token, vocab, tunables) {
            continue;
        }
        let gap = token.y().saturating_sub(tokens[i - 1].y());
        if gap > tunables.gap_threshold {
            debug!("Segment break at {:?} (y={}, gap={})", token.text, token.y(), gap);
            segments.push(Segment { range: start..i });
            vocab.learn(&token.text);
            current = Some(i);
        }
    }

    if let Some(start) = current {
        segments.push(Segment {
            range: start..tokens.len(),
        });
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tokens::Rect;
    use crate::store::MemoryStore;

    fn tok(text: &str, y: u32) -> Token {
        Token::new(text, Rect::new(20, y, 80, 24))
    }

    fn empty_vocab() -> VocabularyStore {
        VocabularyStore::load(Box::new(MemoryStore::default()), &[])
    }

    fn texts<'a>(seg: &Segment, all: &'a [Token]) -> Vec<&'a str> {
        seg.tokens(all).iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn empty_input() {
        let mut vocab = empty_vocab();
        assert!(segment_tokens(&[], &mut vocab, &Tunables::default()).is_empty());
        assert!(vocab.is_empty());
    }

    #[test]
    fn wide_gap_splits() {
        let tokens = vec![
            tok("讨伐", 310),
            tok("有一名悍匪在城外作乱", 340),
            tok("护送", 420),
            tok("一支从北方来的商队", 450),
        ];
        let mut vocab = empty_vocab();
        let segs = segment_tokens(&tokens, &mut vocab, &Tunables::default());
        assert_eq!(segs.len(), 2);
        assert_eq!(texts(&segs[0], &tokens), ["讨伐", "有一名悍匪在城外作乱"]);
        assert_eq!(texts(&segs[1], &tokens), ["护送", "一支从北方来的商队"]);
        assert!(vocab.contains("讨伐"));
        assert!(vocab.contains("护送"));
    }

    #[test]
    fn narrow_gap_folds_without_learning() {
        let tokens = vec![tok("讨伐", 310), tok("悍匪头目", 360)];
        let mut vocab = empty_vocab();
        let segs = segment_tokens(&tokens, &mut vocab, &Tunables::default());
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].range, 0..2);
        assert!(vocab.contains("讨伐"));
        assert!(!vocab.contains("悍匪头目"));
    }

    #[test]
    fn gap_is_measured_from_previous_token() {
        // 讨伐 -> 护送 is 100px, but the body line in between leaves a 40px gap.
        let tokens = vec![tok("讨伐", 310), tok("有一名悍匪在城外作乱", 370), tok("护送", 410)];
        let mut vocab = empty_vocab();
        let segs = segment_tokens(&tokens, &mut vocab, &Tunables::default());
        assert_eq!(segs.len(), 1);
    }

    #[test]
    fn leading_body_text_forms_its_own_run() {
        let tokens = vec![tok("有一名悍匪在城外作乱", 310), tok("讨伐", 400)];
        let mut vocab = empty_vocab();
        let segs = segment_tokens(&tokens, &mut vocab, &Tunables::default());
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].range, 0..1);
        assert_eq!(segs[1].range, 1..2);
    }

    #[test]
    fn threshold_is_configurable() {
        let tokens = vec![tok("讨伐", 310), tok("护送", 370)];
        let tight = Tunables {
            gap_threshold: 50,
            ..Tunables::default()
        };
        let loose = Tunables {
            gap_threshold: 80,
            ..Tunables::default()
        };
        assert_eq!(segment_tokens(&tokens, &mut empty_vocab(), &tight).len(), 2);
        assert_eq!(segment_tokens(&tokens, &mut empty_vocab(), &loose).len(), 1);
    }

    #[test]
    fn span_reaches_lowest_bottom_edge() {
        let tokens = vec![
            tok("讨伐", 310),
            Token::new("x328", Rect::new(130, 365, 60, 22)),
            tok("奖励：", 360),
        ];
        let seg = Segment { range: 0..3 };
        assert_eq!(seg.span(&tokens), Some((310, 387)));
        assert_eq!(Segment { range: 1..1 }.span(&tokens), None);
    }

    #[test]
    fn span_stops_above_next_run() {
        let tall = |text: &str, y: u32| Token::new(text, Rect::new(20, y, 80, 90));
        let tokens = vec![tall("讨伐", 310), tall("护送", 370)];
        let segs = segment_tokens(&tokens, &mut empty_vocab(), &Tunables::default());
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].span(&tokens), Some((310, 369)));
        assert_eq!(segs[1].span(&tokens), Some((370, 460)));
    }
}
