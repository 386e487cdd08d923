use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use favlink_core::config::load_config;
use favlink_core::models::{Category, FavoriteRecord, FavoriteRef};
use favlink_core::providers::{LessonCatalog, SessionAggregator};
use favlink_core::{spawn_configured, Collaborators, FavoriteStore, ToggleOutcome};
use std::collections::BTreeSet;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "favlink")]
#[command(about = "Manage lesson favorites", long_about = None)]
struct Cli {
    /// Config file, created with defaults when missing
    #[arg(long, env = "FAVLINK_CONFIG", default_value = "favlink.toml")]
    config: PathBuf,

    /// Override the database path from the config
    #[arg(long, env = "FAVLINK_DB")]
    db: Option<PathBuf>,

    /// Lesson catalog: a course JSON file or a directory of them
    #[arg(long, env = "FAVLINK_CATALOG")]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List favorites, newest first
    List {
        /// Only one category: course, card or hack
        #[arg(long)]
        category: Option<String>,
    },
    /// Add a favorite, or remove it if already present
    Toggle {
        /// Id in any known spelling (may be empty with --course/--lesson)
        #[arg(default_value = "")]
        reference: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        course: Option<String>,
        #[arg(long)]
        lesson: Option<String>,
        /// Zero-based item position within the lesson
        #[arg(long)]
        position: Option<usize>,
        /// Primary display text of the item
        #[arg(long)]
        text: Option<String>,
        /// Secondary text (translation, or a tip's body)
        #[arg(long)]
        secondary: Option<String>,
    },
    /// Remove every favorite matching a reference
    Remove { reference: String },
    /// Check whether a reference is a favorite
    Contains { reference: String },
    /// Rewrite stored favorites to canonical ids
    Migrate,
    /// Show the courses and lessons of the catalog
    Catalog,
}

/// Aggregator for a one-shot process: reports the sets it would publish.
struct LoggingAggregator;

impl SessionAggregator for LoggingAggregator {
    fn set_favorites(&self, courses: BTreeSet<String>, cards: BTreeSet<String>, hacks: BTreeSet<String>) {
        debug!(
            courses = courses.len(),
            cards = cards.len(),
            hacks = hacks.len(),
            "Session favorites updated"
        );
    }
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    if let Some(db) = cli.db {
        config.storage.db_path = db;
    }

    let catalog = match &cli.catalog {
        Some(path) => LessonCatalog::load_path(path)
            .with_context(|| format!("Failed to load catalog {}", path.display()))?,
        None => LessonCatalog::new(),
    };
    let catalog = Arc::new(catalog);

    if let Commands::Catalog = cli.command {
        print_catalog(&catalog);
        return Ok(());
    }

    let store = FavoriteStore::open_with_config(
        &config,
        Collaborators {
            content: catalog.clone(),
            titles: catalog,
            aggregator: Arc::new(LoggingAggregator),
        },
    )
    .context("Failed to open favorites")?;
    let store = Arc::new(store);
    let flusher = spawn_configured(Arc::clone(&store), &config.flusher)
        .context("Failed to start the favorites flusher")?;

    match cli.command {
        Commands::List { category } => {
            let records = match category {
                Some(name) => store.view(parse_category(&name)?),
                None => store.records(),
            };
            if records.is_empty() {
                println!("No favorites");
            }
            for record in &records {
                print_record(record);
            }
        }
        Commands::Toggle {
            reference,
            category,
            course,
            lesson,
            position,
            text,
            secondary,
        } => {
            let mut favorite = FavoriteRef::new(&reference);
            if let Some(name) = category {
                favorite = favorite.with_category(parse_category(&name)?);
            }
            favorite.course_hint = course;
            favorite.lesson_hint = lesson;
            favorite.position_hint = position;
            if text.is_some() || secondary.is_some() {
                favorite = favorite.with_content(
                    text.as_deref().unwrap_or_default(),
                    secondary.as_deref().unwrap_or_default(),
                );
            }

            match store.toggle(favorite) {
                ToggleOutcome::Inserted(id) => println!("Added {id}"),
                ToggleOutcome::Removed(id) => println!("Removed {id}"),
                ToggleOutcome::Unresolved => println!("Could not resolve '{reference}'"),
            }
        }
        Commands::Remove { reference } => {
            let removed = store.remove(reference.as_str());
            println!("Removed {removed} favorite(s)");
        }
        Commands::Contains { reference } => {
            println!("{}", store.contains(reference.as_str()));
        }
        Commands::Migrate => {
            let report = store.migrate_now();
            println!(
                "rewritten={} unresolved={} coalesced={} titles_filled={}",
                report.rewritten, report.unresolved, report.coalesced, report.titles_filled
            );
        }
        Commands::Catalog => unreachable!("handled before the store is opened"),
    }

    let outcome = flusher.stop();
    if outcome.save_failed || store.has_pending_work() {
        return Err(anyhow!("Failed to save favorites to {}", config.storage.db_path.display()));
    }
    info!(total = store.len(), saved = outcome.saved, "Done");
    Ok(())
}

fn init_logging() {
    let debug_enabled = env::var("FAVLINK_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_category(name: &str) -> Result<Category> {
    Category::from_str(name).ok_or_else(|| anyhow!("Unknown category '{name}'"))
}

fn print_record(record: &FavoriteRecord) {
    let added = record.created_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M");
    let title = record.lesson_title.as_deref().unwrap_or("-");
    println!(
        "{added}  {:<40} {} / {}  [{title}]",
        record.canonical_id, record.primary_text, record.secondary_text
    );
}

fn print_catalog(catalog: &LessonCatalog) {
    use favlink_core::providers::{LessonContentProvider, LessonTitleProvider};

    let courses = catalog.course_ids();
    if courses.is_empty() {
        println!("Catalog is empty");
    }
    for course_id in courses {
        let title = catalog.course_title(&course_id).unwrap_or_default();
        println!("{course_id}  {title}");
        for lesson_id in catalog.lessons(&course_id) {
            let items = catalog.items(&course_id, &lesson_id);
            let lesson_title = catalog.title(&course_id, &lesson_id).unwrap_or_default();
            println!("  {lesson_id}  {lesson_title} ({} items)", items.len());
        }
    }
}
