mod config;
mod db;
mod parser;
mod store;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

use config::ExtractorConfig;
use parser::extract::TaskRecord;
use parser::ingest::read_tokens;
use parser::TaskExtractor;
use store::{JsonFileStore, KeySetStore, LineFileStore, VocabularyStore};

#[derive(Parser)]
#[command(name = "task_extractor", about = "Turn OCR'd task panels into task records")]
struct Cli {
    /// JSON config file (tunables, seed headers, data dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding vocabulary, blacklist and history
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract tasks from one recognizer dump
    Extract {
        file: PathBuf,
        /// Print records as JSON
        #[arg(long)]
        json: bool,
        /// Store records in the history database
        #[arg(long)]
        save: bool,
        /// Keep newly seen headers in memory only
        #[arg(long)]
        no_learn: bool,
    },
    /// Extract every *.json dump in a directory, in name order
    Batch {
        dir: PathBuf,
        #[arg(long)]
        save: bool,
        #[arg(long)]
        no_learn: bool,
    },
    /// Show how each token of a dump is classified
    Inspect { file: PathBuf },
    /// List known header names
    Vocab,
    /// Suppress a task name from future output
    Block { name: String },
    /// Recently saved records
    History {
        /// Only records with this name
        #[arg(long)]
        name: Option<String>,
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Show history statistics
    Stats,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut config = ExtractorConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    let result = match cli.command {
        Commands::Extract {
            file,
            json,
            save,
            no_learn,
        } => {
            let mut extractor = build_extractor(&config, no_learn);
            let tokens = read_tokens(&file)?;
            let records = extractor.extract_tasks(&tokens);
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                parser::log_task_details(&records);
                print_records(&records);
            }
            if save {
                let conn = db::connect(&config.db_path())?;
                db::init_schema(&conn)?;
                let saved = db::save_records(&conn, &new_run_id(), &frame_name(&file), &records)?;
                println!("Saved {} records.", saved);
            }
            Ok(())
        }
        Commands::Batch {
            dir,
            save,
            no_learn,
        } => {
            let files = list_dumps(&dir)?;
            if files.is_empty() {
                println!("No *.json dumps in {}.", dir.display());
                return Ok(());
            }
            println!("Extracting {} dumps...", files.len());
            let mut extractor = build_extractor(&config, no_learn);
            let conn = if save {
                let conn = db::connect(&config.db_path())?;
                db::init_schema(&conn)?;
                Some(conn)
            } else {
                None
            };
            let counts = process_dumps(&mut extractor, &files, conn.as_ref())?;
            counts.print();
            Ok(())
        }
        Commands::Inspect { file } => {
            let extractor = TaskExtractor::open_dry_run(&config);
            let mut tokens = read_tokens(&file)?;
            tokens.sort_by_key(|t| t.y());
            println!("{:>5} | {:<7} | Text", "Y", "Kind");
            println!("{}", "-".repeat(48));
            for token in &tokens {
                let kind =
                    parser::tokens::classify(token, extractor.vocabulary(), extractor.tunables());
                println!("{:>5} | {:<7} | {}", token.y(), kind.label(), token.text);
            }
            Ok(())
        }
        Commands::Vocab => {
            let vocab = VocabularyStore::load(
                Box::new(JsonFileStore::new(config.vocabulary_path())),
                &config.seed_headers,
            );
            if vocab.is_empty() {
                println!("No known names yet.");
                return Ok(());
            }
            for name in vocab.iter() {
                println!("{}", name);
            }
            println!("\n{} known names", vocab.len());
            Ok(())
        }
        Commands::Block { name } => {
            let name = name.trim().to_string();
            if name.is_empty() {
                anyhow::bail!("Name must not be empty");
            }
            let store = LineFileStore::new(config.blacklist_path());
            let mut names = store.load()?;
            if names.insert(name.clone()) {
                store.save(&names)?;
                println!("Blocked {} ({} names blocked).", name, names.len());
            } else {
                println!("{} is already blocked.", name);
            }
            Ok(())
        }
        Commands::History { name, limit } => {
            let conn = db::connect(&config.db_path())?;
            db::init_schema(&conn)?;
            let rows = db::fetch_history(&conn, name.as_deref(), limit)?;
            if rows.is_empty() {
                println!("No saved records.");
                return Ok(());
            }
            println!(
                "{:<19} | {:<20} | {:<10} | {:<20} | {:<8}",
                "Extracted", "Frame", "Task", "Reward", "Limit"
            );
            println!("{}", "-".repeat(88));
            for r in &rows {
                println!(
                    "{:<19} | {:<20} | {:<10} | {:<20} | {:<8}",
                    r.extracted_at,
                    truncate(&r.frame, 20),
                    truncate(&r.record.name, 10),
                    truncate(r.record.reward.as_deref().unwrap_or("-"), 20),
                    r.record.time_limit.as_deref().unwrap_or("-"),
                );
            }
            println!("\n{} records | latest run: {}", rows.len(), rows[0].run_id);
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&config.db_path())?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Records: {}", s.records);
            println!("Frames:  {}", s.frames);
            println!("Runs:    {}", s.runs);
            println!("Names:   {}", s.names);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn build_extractor(config: &ExtractorConfig, no_learn: bool) -> TaskExtractor {
    if no_learn {
        TaskExtractor::open_dry_run(config)
    } else {
        TaskExtractor::open(config)
    }
}

struct BatchCounts {
    dumps: usize,
    records: usize,
    empty: usize,
    errors: usize,
}

impl BatchCounts {
    fn print(&self) {
        println!(
            "Processed {} dumps: {} records, {} without tasks, {} unreadable.",
            self.dumps, self.records, self.empty, self.errors,
        );
    }
}

/// Sequential on purpose: every dump can grow the vocabulary the next one sees.
fn process_dumps(
    extractor: &mut TaskExtractor,
    files: &[PathBuf],
    conn: Option<&rusqlite::Connection>,
) -> Result<BatchCounts> {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let run_id = new_run_id();
    let mut counts = BatchCounts {
        dumps: 0,
        records: 0,
        empty: 0,
        errors: 0,
    };

    for file in files {
        counts.dumps += 1;
        let tokens = match read_tokens(file) {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!("Skipping {}: {:#}", file.display(), e);
                counts.errors += 1;
                pb.inc(1);
                continue;
            }
        };
        let records = extractor.extract_tasks(&tokens);
        if records.is_empty() {
            counts.empty += 1;
        }
        counts.records += records.len();
        if let Some(conn) = conn {
            db::save_records(conn, &run_id, &frame_name(file), &records)?;
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(counts)
}

fn list_dumps(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn print_records(records: &[TaskRecord]) {
    if records.is_empty() {
        println!("No tasks found.");
        return;
    }
    println!(
        "{:>3} | {:<10} | {:<20} | {:<8} | {:<6} | {:<12} | {:<12}",
        "#", "Task", "Reward", "Limit", "Level", "Accept", "Abandon"
    );
    println!("{}", "-".repeat(90));
    for (i, r) in records.iter().enumerate() {
        println!(
            "{:>3} | {:<10} | {:<20} | {:<8} | {:<6} | {:<12} | {:<12}",
            i + 1,
            truncate(&r.name, 10),
            truncate(r.reward.as_deref().unwrap_or("-"), 20),
            r.time_limit.as_deref().unwrap_or("-"),
            r.difficulty.as_deref().unwrap_or("-"),
            click_point(r.accept_box),
            click_point(r.abandon_box),
        );
    }
    println!("\n{} tasks", records.len());
}

fn click_point(rect: Option<parser::tokens::Rect>) -> String {
    rect.map(|r| {
        let (x, y) = r.center();
        format!("({}, {})", x, y)
    })
    .unwrap_or_else(|| "-".into())
}

fn frame_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn new_run_id() -> String {
    chrono::Local::now().format("%Y%m%d-%H%M%S").to_string()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
