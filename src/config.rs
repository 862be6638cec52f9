use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DATA_DIR: &str = "data";
const VOCABULARY_FILE: &str = "vocabulary.json";
const BLACKLIST_FILE: &str = "blacklist.txt";
const DB_FILE: &str = "tasks.sqlite";

/// Header names the agent shipped with before any vocabulary was learned.
const SEED_HEADERS: &[&str] = &[
    "侠盗", "外来者", "讨伐", "探索", "护送", "收集", "消灭", "击败",
];

/// Heuristic thresholds. All values are empirically tuned screen-pixel or
/// code-point counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tunables {
    pub min_header_len: usize,
    pub max_header_len: usize,
    /// Content band (inclusive) where unknown headers may appear.
    pub band_top: u32,
    pub band_bottom: u32,
    /// Vertical gap (px) a header must exceed to start a new segment.
    pub gap_threshold: u32,
    /// Radius (in tokens) searched around a reward candidate for the label.
    pub reward_window: usize,
    /// Text at least this long is treated as description.
    pub long_text_len: usize,
}

impl Default for Tunables {
    fn default() -> Self {
        Tunables {
            min_header_len: 2,
            max_header_len: 10,
            band_top: 300,
            band_bottom: 1200,
            gap_threshold: 50,
            reward_window: 5,
            long_text_len: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub tunables: Tunables,
    pub seed_headers: Vec<String>,
    pub data_dir: PathBuf,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        ExtractorConfig {
            tunables: Tunables::default(),
            seed_headers: SEED_HEADERS.iter().map(|s| s.to_string()).collect(),
            data_dir: PathBuf::from(DATA_DIR),
        }
    }
}

impl ExtractorConfig {
    /// Read a JSON config file; missing keys fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn vocabulary_path(&self) -> PathBuf {
        self.data_dir.join(VOCABULARY_FILE)
    }

    pub fn blacklist_path(&self) -> PathBuf {
        self.data_dir.join(BLACKLIST_FILE)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE)
    }
}
