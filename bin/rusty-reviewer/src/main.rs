//! # Rusty-Reviewer Binary
//!
//! The entry point that assembles the reviewer based on compile-time features
//! and the layered settings.

mod config;
mod rules;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use rr_core::{DedupStore, PermissionStore};
use rr_forum_snapshot::SnapshotForum;
use rr_review::Pipeline;
use rr_store_memory::MemoryStore;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Settings;

// Feature-gated imports: the binary is compiled to order
#[cfg(feature = "db-sqlite")]
use rr_db_sqlite::SqliteStore;

#[derive(Debug, Parser)]
#[command(name = "rusty-reviewer", version, about = "Automated forum content review")]
struct Cli {
    /// Settings file name, without extension
    #[arg(long, short, env = "REVIEWER_CONFIG", default_value = "reviewer")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Review the forum
    Run {
        /// Apply punishments instead of only logging them
        #[arg(long)]
        no_test: bool,
        /// Sweep the configured pages once, without dedup, then exit
        #[arg(long, conflicts_with = "page")]
        once: bool,
        /// With --once, only review replies created at or after this unix timestamp
        #[arg(long, requires = "once")]
        since: Option<i64>,
        /// Review a single page once, then exit
        #[arg(long)]
        page: Option<u32>,
    },
    /// Set a user's permission level (0 clears it)
    Permit {
        user_id: u64,
        #[arg(allow_hyphen_values = true)]
        level: i32,
        #[arg(long, default_value = "")]
        note: String,
    },
    /// Forget dedup records older than `days`
    Truncate { days: u32 },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rusty_reviewer=info,rr_review=info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// How `run` walks the forum.
struct Sweep {
    no_test: bool,
    once: bool,
    since: Option<i64>,
    page: Option<u32>,
}

struct Stores {
    permissions: Arc<dyn PermissionStore>,
    dedup: Arc<dyn DedupStore>,
    #[cfg(feature = "db-sqlite")]
    sqlite: Option<Arc<SqliteStore>>,
}

async fn open_stores(settings: &Settings) -> anyhow::Result<Stores> {
    #[cfg(feature = "db-sqlite")]
    if let Some(url) = &settings.database_url {
        let store = Arc::new(SqliteStore::new(url).await.with_context(|| format!("opening {url}"))?);
        let permissions: Arc<dyn PermissionStore> = store.clone();
        let dedup: Arc<dyn DedupStore> = store.clone();
        return Ok(Stores {
            permissions,
            dedup,
            sqlite: Some(store),
        });
    }

    if settings.database_url.is_some() {
        warn!("database_url is set but sqlite support is not compiled in, using memory");
    }
    let store = Arc::new(MemoryStore::new());
    let permissions: Arc<dyn PermissionStore> = store.clone();
    let dedup: Arc<dyn DedupStore> = store;
    Ok(Stores {
        permissions,
        dedup,
        #[cfg(feature = "db-sqlite")]
        sqlite: None,
    })
}

#[cfg(feature = "db-sqlite")]
fn persistent(stores: &Stores) -> anyhow::Result<&Arc<SqliteStore>> {
    stores
        .sqlite
        .as_ref()
        .context("this command needs a persistent store, set database_url")
}

async fn run(settings: &Settings, stores: Stores, sweep: Sweep) -> anyhow::Result<()> {
    let Some(path) = &settings.snapshot_path else {
        bail!("snapshot_path is required to run a review");
    };
    let forum = Arc::new(
        SnapshotForum::load(path)
            .await
            .with_context(|| format!("loading snapshot {}", path.display()))?,
    );

    let pipeline = Pipeline::builder()
        .client(forum.clone())
        .permissions(stores.permissions)
        .dedup(stores.dedup)
        .thresholds(settings.thresholds())
        .fan_out_window(settings.fan_out_window)
        .build()?;

    let installed = rules::install(&pipeline, &settings.rules)?;
    if installed == 0 {
        warn!("no rules configured, the review will not look at anything");
    }
    if sweep.no_test {
        pipeline.enable_production();
    }
    info!(forum = %settings.forum, executor = pipeline.executor_name(), rules = installed, "reviewer starting");

    match (sweep.page, sweep.once) {
        (Some(page), _) => pipeline.run_once(&settings.forum, page).await?,
        (None, true) => {
            let pages = if settings.pages.is_empty() { vec![1] } else { settings.pages.clone() };
            match sweep.since {
                Some(since) => pipeline.run_pages_since(&settings.forum, &pages, since).await?,
                None => pipeline.run_pages(&settings.forum, &pages).await?,
            }
        }
        (None, false) => {
            tokio::select! {
                _ = pipeline.run_loop(&settings.forum, settings.interval()) => {}
                _ = tokio::signal::ctrl_c() => info!("interrupted, shutting down"),
            }
        }
    }

    let summary = pipeline.page_perf();
    info!(
        actions = forum.actions().await.len(),
        pages = summary.samples,
        "reviewer stopped"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let settings = Settings::load(&cli.config).with_context(|| format!("loading settings {:?}", cli.config))?;
    init_tracing(settings.log_json);

    let result = dispatch(cli.command, &settings).await;
    if let Err(e) = &result {
        error!(error = ?e, "reviewer failed");
    }
    result
}

async fn dispatch(command: Command, settings: &Settings) -> anyhow::Result<()> {
    let stores = open_stores(settings).await?;

    match command {
        Command::Run {
            no_test,
            once,
            since,
            page,
        } => {
            let sweep = Sweep {
                no_test,
                once,
                since,
                page,
            };
            run(settings, stores, sweep).await
        }
        #[cfg(feature = "db-sqlite")]
        Command::Permit { user_id, level, note } => {
            let store = persistent(&stores)?;
            if level == 0 {
                store.remove(user_id).await?;
            } else {
                store.set(rr_core::PermissionRecord::new(user_id, level, note)).await?;
            }
            info!(user_id, level, "permission updated");
            Ok(())
        }
        #[cfg(feature = "db-sqlite")]
        Command::Truncate { days } => {
            let removed = persistent(&stores)?.truncate_dedup(days).await?;
            info!(days, removed, "dedup records truncated");
            Ok(())
        }
        #[cfg(not(feature = "db-sqlite"))]
        Command::Permit { .. } | Command::Truncate { .. } => {
            bail!("this command needs sqlite support, rebuild with the db-sqlite feature")
        }
    }
}
