mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use zandalee_memory::config::MemoryConfig;
use zandalee_memory::core_memory::{CoreMemoryFile, CoreSection};
use zandalee_memory::crypto::Secret;
use zandalee_memory::diary::Diary;
use zandalee_memory::memory::types::{MemoryKind, RecallQuery, Salience};
use zandalee_memory::memory::MemoryStore;

#[derive(Parser)]
#[command(name = "zandalee-memory", version, about = "Zandalee Memory Manager")]
struct Cli {
    /// Base directory for the store (overrides config and environment)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a memory
    Learn {
        text: String,
        #[arg(long, default_value = "semantic")]
        kind: MemoryKind,
        /// Comma list
        #[arg(long, default_value = "")]
        tags: String,
        #[arg(long, default_value_t = 0.5)]
        importance: f64,
        #[arg(long, default_value_t = 0.5)]
        relevance: f64,
        #[arg(long, default_value_t = 0.0)]
        emotion: f64,
        #[arg(long, default_value_t = 0.0)]
        effort: f64,
        #[arg(long, default_value_t = 0.0)]
        novelty: f64,
        #[arg(long, default_value_t = 0.5)]
        confidence: f64,
        #[arg(long)]
        pinned: bool,
    },
    /// Recall memories
    Search {
        query: Option<String>,
        #[arg(long)]
        k: Option<usize>,
        /// Comma list
        #[arg(long, default_value = "")]
        kinds: String,
        /// Comma list
        #[arg(long, default_value = "")]
        tags: String,
    },
    /// Show stats
    Stats,
    /// Write snapshot
    Snapshot,
    /// Import snapshot
    Import { path: PathBuf },
    /// Pin memory id
    Pin { id: i64 },
    /// Unpin memory id
    Unpin { id: i64 },
    /// Create/refresh monthly rollup
    Rollup {
        /// YYYY-MM, defaults to the current month
        #[arg(long)]
        period: Option<String>,
    },
    /// Upsert procedural version
    Proc {
        subject_tag: String,
        /// JSON array of step strings
        #[arg(long)]
        steps: String,
        #[arg(long, default_value = "")]
        notes: String,
        /// JSON array of memory ids
        #[arg(long, default_value = "[]")]
        sources: String,
    },
    /// List every version of a procedure
    History { subject_tag: String },
    /// Show one memory in full
    Show { id: i64 },
    /// Delete a memory
    Forget { id: i64 },
    /// Print recent working-log entries
    Log {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Personal or project diary
    Diary {
        /// Use {PROJECT}/diary/diary.log instead of the personal diary
        #[arg(long, global = true)]
        project: Option<PathBuf>,
        #[command(subcommand)]
        action: DiaryAction,
    },
    /// Permanent core memory (family, laws, skills, events)
    Core {
        #[command(subcommand)]
        action: CoreAction,
    },
    /// Run database diagnostics
    Doctor,
}

#[derive(Subcommand)]
enum CoreAction {
    /// Print the whole document
    Show,
    /// Append to laws, skills or events
    Add { section: CoreSection, entry: String },
    /// Set a family entry; JSON values are stored as JSON
    Family { key: String, value: String },
}

#[derive(Subcommand)]
enum DiaryAction {
    /// Append an entry
    Add { entry: String },
    /// Print the last N entries (0 for all)
    Read {
        #[arg(long, default_value_t = 20)]
        last: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = MemoryConfig::load()?;
    if let Some(root) = &cli.root {
        config.storage.root = Some(root.display().to_string());
    }

    // Log to stderr so stdout stays clean for command output.
    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let secret = Secret::from_env();

    // The diary does not need the database.
    if let Command::Diary { project, action } = cli.command {
        let diary = match project {
            Some(dir) => Diary::for_project(dir, secret),
            None => Diary::new(config.storage_paths().diary, secret),
        };
        return match action {
            DiaryAction::Add { entry } => cli::diary::add(&diary, &entry),
            DiaryAction::Read { last } => cli::diary::read(&diary, last),
        };
    }

    if let Command::Core { action } = cli.command {
        let file = CoreMemoryFile::new(config.storage_paths().core_memory, secret);
        return match action {
            CoreAction::Show => cli::core::show(&file),
            CoreAction::Add { section, entry } => cli::core::add(&file, section, &entry),
            CoreAction::Family { key, value } => cli::core::set_family(&file, &key, &value),
        };
    }

    let store = MemoryStore::from_config(&config, secret)?;

    match cli.command {
        Command::Learn {
            text,
            kind,
            tags,
            importance,
            relevance,
            emotion,
            effort,
            novelty,
            confidence,
            pinned,
        } => cli::learn::learn(
            &store,
            cli::learn::LearnArgs {
                text,
                kind,
                tags: cli::parse_list(&tags),
                salience: Salience {
                    importance,
                    relevance,
                    emotion,
                    effort,
                    novelty,
                    confidence: Some(confidence),
                },
                pinned,
            },
        )?,
        Command::Search { query, k, kinds, tags } => cli::search::search(
            &store,
            RecallQuery {
                query,
                k: k.unwrap_or(config.recall.default_k),
                kinds: cli::parse_list(&kinds),
                tags_any: cli::parse_list(&tags),
                sort_by_salience: true,
            },
        )?,
        Command::Stats => cli::stats::stats(&store)?,
        Command::Snapshot => cli::snapshot::snapshot(&store)?,
        Command::Import { path } => cli::snapshot::import(&store, &path)?,
        Command::Pin { id } => cli::set_pinned(&store, id, true)?,
        Command::Unpin { id } => cli::set_pinned(&store, id, false)?,
        Command::Rollup { period } => cli::procedural::rollup(&store, period.as_deref())?,
        Command::Proc {
            subject_tag,
            steps,
            notes,
            sources,
        } => cli::procedural::upsert(&store, &subject_tag, &steps, &notes, &sources)?,
        Command::History { subject_tag } => cli::procedural::history(&store, &subject_tag)?,
        Command::Show { id } => cli::inspect::show(&store, id)?,
        Command::Forget { id } => cli::forget(&store, id)?,
        Command::Log { limit } => {
            for entry in store.working_log(limit) {
                println!("{}", serde_json::to_string(&entry)?);
            }
        }
        Command::Doctor => cli::doctor::doctor(&store)?,
        Command::Diary { .. } | Command::Core { .. } => {}
    }

    Ok(())
}
