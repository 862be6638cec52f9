pub mod extract;
pub mod ingest;
pub mod segments;
pub mod tokens;

use std::collections::HashSet;

use tracing::{debug, info};

use crate::config::{ExtractorConfig, Tunables};
use crate::store::{self, JsonFileStore, LineFileStore, VocabularyStore};
use extract::{Button, TaskRecord};
use tokens::{classify_button, Token};

/// Tokens → body/buttons → y-sorted runs → records → blacklist filter.
pub struct TaskExtractor {
    tunables: Tunables,
    vocab: VocabularyStore,
    blacklist: HashSet<String>,
}

impl TaskExtractor {
    pub fn new(
        tunables: Tunables,
        vocab: VocabularyStore,
        blacklist: HashSet<String>,
    ) -> Self {
        TaskExtractor {
            tunables,
            vocab,
            blacklist,
        }
    }

    /// Extractor backed by the vocabulary and blacklist files in the data dir.
    pub fn open(config: &ExtractorConfig) -> Self {
        let vocab = VocabularyStore::load(
            Box::new(JsonFileStore::new(config.vocabulary_path())),
            &config.seed_headers,
        );
        let blacklist = store::load_blacklist(&LineFileStore::new(config.blacklist_path()));
        Self::new(config.tunables.clone(), vocab, blacklist)
    }

    /// Like `open`, but learned names stay in memory.
    pub fn open_dry_run(config: &ExtractorConfig) -> Self {
        let vocab = VocabularyStore::load_detached(
            &JsonFileStore::new(config.vocabulary_path()),
            &config.seed_headers,
        );
        let blacklist = store::load_blacklist(&LineFileStore::new(config.blacklist_path()));
        Self::new(config.tunables.clone(), vocab, blacklist)
    }

    pub fn vocabulary(&self) -> &VocabularyStore {
        &self.vocab
    }

    pub fn tunables(&self) -> &Tunables {
        &self.tunables
    }

    /// Never fails: bad tokens are skipped and segments without a header
    /// produce nothing.
    pub fn extract_tasks(&mut self, tokens: &[Token]) -> Vec<TaskRecord> {
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut buttons = Vec::new();
        let mut body = Vec::with_capacity(tokens.len());
        for token in tokens {
            let text = token.text.trim();
            if text.is_empty() {
                continue;
            }
            let token = Token::new(text, token.rect);
            match classify_button(text) {
                Some(kind) => buttons.push(Button {
                    kind,
                    rect: token.rect,
                }),
                None => body.push(token),
            }
        }
        body.sort_by_key(Token::y);
        buttons.sort_by_key(|b| b.rect.y);

        let segments = segments::segment_tokens(&body, &mut self.vocab, &self.tunables);
        debug!(
            "{} tokens -> {} body, {} buttons, {} segments",
            tokens.len(),
            body.len(),
            buttons.len(),
            segments.len()
        );

        segments
            .iter()
            .filter_map(|seg| {
                extract::extract_record(seg, &body, &buttons, &self.vocab, &self.tunables)
            })
            .filter(|record| {
                let blocked = self.blacklist.contains(&record.name);
                if blocked {
                    debug!("Suppressed blacklisted task: {}", record.name);
                }
                !blocked
            })
            .collect()
    }
}

/// Log each record the way the panel reads.
pub fn log_task_details(tasks: &[TaskRecord]) {
    for task in tasks {
        info!("Task: {}", task.name);
        info!("Description: {}", task.description);
        if let Some(reward) = &task.reward {
            info!("Reward: {}", reward);
        }
        if let Some(limit) = &task.time_limit {
            info!("Time limit: {}", limit);
        }
        if let Some(level) = &task.difficulty {
            info!("Enemy level: {}", level);
        }
        if let Some(rect) = task.accept_box {
            info!("Accept button: {:?} click {:?}", rect, rect.center());
        }
        if let Some(rect) = task.abandon_box {
            info!("Abandon button: {:?} click {:?}", rect, rect.center());
        }
        info!("{}", "-".repeat(50));
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ingest::read_tokens;
    use crate::parser::tokens::Rect;
    use crate::store::MemoryStore;
    use std::path::Path;

    fn tok(text: &str, y: u32) -> Token {
        Token::new(text, Rect::new(20, y, 80, 24))
    }

    fn extractor(blacklist: &[&str]) -> TaskExtractor {
        let vocab = VocabularyStore::load(Box::new(MemoryStore::default()), &[]);
        TaskExtractor::new(
            Tunables::default(),
            vocab,
            blacklist.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn names(records: &[TaskRecord]) -> Vec<&str> {
        records.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn empty_input() {
        let mut ex = extractor(&[]);
        assert!(ex.extract_tasks(&[]).is_empty());
        assert!(ex.vocabulary().is_empty());
    }

    #[test]
    fn single_bounty_panel() {
        let accept = Token::new("接受", Rect::new(600, 370, 80, 30));
        let tokens = vec![
            tok("讨伐", 310),
            tok("有一名悍匪…", 340),
            tok("奖励：", 360),
            tok("x328", 365),
            accept.clone(),
        ];
        let mut ex = extractor(&[]);
        let records = ex.extract_tasks(&tokens);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.name, "讨伐");
        assert_eq!(r.description, "有一名悍匪…");
        assert_eq!(r.reward.as_deref(), Some("x328"));
        assert_eq!(r.accept_box, Some(accept.rect));
        assert!(r.abandon_box.is_none());
        assert!(ex.vocabulary().contains("讨伐"));
    }

    #[test]
    fn repeated_header_yields_two_records() {
        let tokens = vec![
            tok("讨伐", 310),
            tok("有一名悍匪在城外作乱", 340),
            tok("讨伐", 500),
            tok("还声称要血洗村庄", 530),
        ];
        let records = extractor(&[]).extract_tasks(&tokens);
        assert_eq!(names(&records), ["讨伐", "讨伐"]);
        assert_eq!(records[1].description, "还声称要血洗村庄");
    }

    #[test]
    fn blacklisted_names_are_learned_but_hidden() {
        let tokens = vec![
            tok("外来者", 310),
            tok("一支从远方来的旅人", 340),
            tok("护送", 420),
            tok("必须安全抵达王都", 450),
        ];
        let mut ex = extractor(&["外来者"]);
        let records = ex.extract_tasks(&tokens);
        assert_eq!(names(&records), ["护送"]);
        assert!(ex.vocabulary().contains("外来者"));
    }

    #[test]
    fn unordered_input_is_sorted_and_blank_text_dropped() {
        let tokens = vec![
            tok("x10", 365),
            tok("   ", 320),
            tok("奖励", 360),
            tok("讨伐", 310),
            Token::new(" 接受 ", Rect::new(600, 362, 80, 30)),
        ];
        let records = extractor(&[]).extract_tasks(&tokens);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].reward.as_deref(), Some("x10"));
        assert_eq!(records[0].accept_box.map(|b| b.y), Some(362));
    }

    #[test]
    fn button_goes_to_first_containing_record() {
        // Spans [310, 384] and [420, 474]; the button at 440 belongs to the second.
        let tokens = vec![
            tok("讨伐", 310),
            tok("有一名悍匪在城外作乱", 360),
            tok("护送", 420),
            tok("一支从北方来的商队", 450),
            Token::new("接受", Rect::new(600, 330, 80, 30)),
            Token::new("接受", Rect::new(600, 440, 80, 30)),
            Token::new("放弃", Rect::new(600, 400, 80, 30)),
        ];
        let records = extractor(&[]).extract_tasks(&tokens);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].accept_box.map(|b| b.y), Some(330));
        assert_eq!(records[1].accept_box.map(|b| b.y), Some(440));
        // 400 falls in the gap between the two spans.
        assert!(records.iter().all(|r| r.abandon_box.is_none()));
    }

    #[test]
    fn segmentation_is_stable_after_warm_up() {
        let tokens = read_tokens(Path::new("tests/fixtures/city_panel.json")).unwrap();
        let mut ex = extractor(&[]);
        let first = ex.extract_tasks(&tokens);
        let second = ex.extract_tasks(&tokens);
        let third = ex.extract_tasks(&tokens);
        assert_eq!(second, third);
        assert_eq!(names(&first), names(&second));
    }

    #[test]
    fn city_panel_fixture() {
        let tokens = read_tokens(Path::new("tests/fixtures/city_panel.json")).unwrap();
        let records = extractor(&[]).extract_tasks(&tokens);
        assert_eq!(names(&records), ["讨伐", "护送", "收集"]);

        let bounty = &records[0];
        assert!(bounty.description.starts_with("有一名"));
        assert_eq!(bounty.reward.as_deref(), Some("x328 + 1500"));
        assert_eq!(bounty.time_limit.as_deref(), Some("3天"));
        assert_eq!(bounty.difficulty.as_deref(), Some("12"));
        assert!(bounty.accept_box.is_some());
        assert!(bounty.abandon_box.is_some());

        let escort = &records[1];
        assert!(escort.description.starts_with("一支从"));
        assert_eq!(escort.reward.as_deref(), Some("x120"));
        assert!(escort.accept_box.is_some());

        let gather = &records[2];
        assert!(gather.reward.is_none());
        assert_eq!(gather.time_limit.as_deref(), Some("7天"));
        assert_eq!(gather.accept_box.map(|b| b.y), Some(850));
    }

    #[test]
    fn every_record_is_named_and_allowed() {
        let tokens = read_tokens(Path::new("tests/fixtures/city_panel.json")).unwrap();
        let records = extractor(&["护送"]).extract_tasks(&tokens);
        assert!(records.iter().all(|r| !r.name.is_empty() && r.name != "护送"));
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn persisted_vocabulary_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExtractorConfig {
            seed_headers: Vec::new(),
            data_dir: dir.path().to_path_buf(),
            ..ExtractorConfig::default()
        };
        let mut ex = TaskExtractor::open(&config);
        ex.extract_tasks(&[tok("讨伐", 310)]);

        // Outside the content band only a known name is still a header.
        let mut restarted = TaskExtractor::open(&config);
        let records = restarted.extract_tasks(&[tok("讨伐", 100)]);
        assert_eq!(names(&records), ["讨伐"]);

        let mut dry = TaskExtractor::open_dry_run(&config);
        dry.extract_tasks(&[tok("护送", 310)]);
        assert!(!TaskExtractor::open(&config).vocabulary().contains("护送"));
    }

    #[test]
    fn blacklist_file_is_honored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blacklist.txt"), "讨伐\n").unwrap();
        let config = ExtractorConfig {
            data_dir: dir.path().to_path_buf(),
            ..ExtractorConfig::default()
        };
        let records = TaskExtractor::open(&config).extract_tasks(&[tok("讨伐", 310)]);
        assert!(records.is_empty());
    }
}
