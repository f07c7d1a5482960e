//! Binary entrypoint for the chattyd CLI.
//!
//! Commands:
//! - `init` - write a default `chattyd.toml`
//! - `start [--posts <file>]` - seed the post store, build the search index, run the dispatcher until Ctrl-C
//! - `search --posts <file> [--terms ..] [--author ..] ...` - one-off query against a JSON post dump
//!
//! See the library crate docs for module-level details: `chattyd::`.
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use chattyd::config::Config;
use chattyd::dispatch::Dispatcher;
use chattyd::event::ModerationFlag;
use chattyd::metrics;
use chattyd::search::{SearchIndex, SearchQuery, DEFAULT_LIMIT};
use chattyd::store::MemoryPostStore;

#[derive(Parser)]
#[command(name = "chattyd")]
#[command(about = "Event dispatcher and search index for a threaded discussion board")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "chattyd.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Build the index and run the dispatcher until interrupted
    Start {
        /// JSON array of posts to seed the post store (overrides storage.posts_file)
        #[arg(short, long)]
        posts: Option<String>,
    },
    /// Run a single search against a JSON post dump
    Search {
        /// JSON array of posts
        #[arg(short, long)]
        posts: String,
        #[arg(long)]
        terms: Option<String>,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        parent_author: Option<String>,
        /// ontopic, nws, stupid, political, tangent, informative
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,
        #[arg(long)]
        oldest_first: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A missing config file is fine for everything but explicit loads; fall back to defaults.
    let config = match cli.command {
        Commands::Init => None,
        _ => match Config::load(&cli.config).await {
            Ok(cfg) => Some(cfg),
            Err(e) => {
                eprintln!("{} (using defaults)", e);
                None
            }
        },
    };
    init_logging(&config, cli.verbose);
    let config = config.unwrap_or_default();

    match cli.command {
        Commands::Init => {
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Start { posts } => {
            config.validate()?;
            info!("Starting {} v{}", config.server.name, env!("CARGO_PKG_VERSION"));
            run_server(config, posts).await?;
        }
        Commands::Search {
            posts,
            terms,
            author,
            parent_author,
            category,
            offset,
            limit,
            oldest_first,
        } => {
            config.validate()?;
            let store = MemoryPostStore::detached();
            let loaded = store.load_json_file(&posts).await?;
            info!("Loaded {} posts from {}", loaded, posts);
            let index = SearchIndex::new(config.search.clone())?;
            index.start(&store)?;

            let mut query = SearchQuery::default().page(offset, limit).oldest_first(oldest_first);
            if let Some(terms) = terms {
                query = query.with_terms(&terms);
            }
            if let Some(author) = author {
                query = query.with_author(&author);
            }
            if let Some(parent_author) = parent_author {
                query = query.with_parent_author(&parent_author);
            }
            if let Some(category) = category {
                let flag: ModerationFlag = category.parse().map_err(|e: String| anyhow!(e))?;
                query = query.with_category(flag);
            }
            query.validate()?;

            let results = index.search(&query);
            println!("{}", serde_json::json!({ "posts": results }));
        }
    }

    Ok(())
}

async fn run_server(config: Config, posts_override: Option<String>) -> Result<()> {
    let dispatcher = Dispatcher::new(config.dispatcher.clone())?;
    let store = MemoryPostStore::new(dispatcher.clone());

    if let Some(path) = posts_override.or_else(|| config.storage.posts_file.clone()) {
        match store.load_json_file(&path).await {
            Ok(n) => info!("Loaded {} posts from {}", n, path),
            Err(e) => warn!("Failed to load posts from {}: {} (starting empty)", path, e),
        }
    }

    let index = Arc::new(SearchIndex::new(config.search.clone())?);
    index.start(&store)?;
    dispatcher.subscribe(index.clone());
    dispatcher.start()?;

    let stats_every = config.server.stats_interval_ms;
    let mut ticker = tokio::time::interval(Duration::from_millis(stats_every.max(1000)));
    loop {
        tokio::select! {
            _ = ticker.tick(), if stats_every > 0 => {
                if let Some(stats) = dispatcher.stats().await {
                    let m = metrics::snapshot();
                    info!(
                        "stats: events retained={} newest=#{} processed={} subscriber_failures={} waiters={} indexed_posts={} searches={} reindexes={}",
                        stats.retained,
                        dispatcher.newest_event_id(),
                        stats.processed_total,
                        stats.subscriber_failures,
                        stats.pending_waiters,
                        index.len(),
                        m.searches,
                        m.reindexes
                    );
                }
            }
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
                break;
            }
        }
    }

    info!("Shutting down...");
    dispatcher.shutdown().await;
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity wins over the configured level
    let base_level = match (verbosity, config) {
        (0, Some(cfg)) => cfg.logging.level_filter(),
        (0, None) => log::LevelFilter::Info,
        (1, _) => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.clone())
        .and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| eprintln!("Cannot open log file {}: {}", path, e))
                .ok()
        });

    if let Some(f) = log_file {
        let file = std::sync::Mutex::new(f);
        // Foreground runs also echo to the console; redirected output only goes to the file.
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = file.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
