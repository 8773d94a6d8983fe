//! # Fair Price CLI (`fairprice`)
//!
//! ## Usage
//!
//! ```bash
//! fairprice --config ./config/fairprice.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fairprice init` | Create the SQLite database and run schema migrations |
//! | `fairprice check "<query>"` | Judge a quoted price (`--deep`, `--json`) |
//! | `fairprice entries list\|add\|delete\|vote` | Curate the price history |
//! | `fairprice sources list\|add\|remove` | Manage trusted sources |
//! | `fairprice blacklist list\|add\|remove` | Manage blacklist rules |
//! | `fairprice report <url>` | Flag a page that showed a wrong price |
//! | `fairprice reports` | List flagged pages |
//! | `fairprice logs` | Show recent requests |
//! | `fairprice serve` | Start the HTTP API |
//!
//! Logs go to stderr; set `RUST_LOG` to change the default `fairprice=info`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use fairprice::{check_cmd, config, entries, logs, migrate, server, sources};

/// Fair Price: is this a good price?
#[derive(Parser)]
#[command(
    name = "fairprice",
    about = "Fair Price: check a quoted price against price history and live web evidence",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/fairprice.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Check a price query, e.g. `"iphone 12 for 12000 rs in pune"`.
    ///
    /// A query that is just a URL reads that product page instead.
    Check {
        query: String,

        /// Read the top result pages instead of relying on search snippets.
        #[arg(long)]
        deep: bool,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Manage recorded price entries.
    Entries {
        #[command(subcommand)]
        action: EntriesAction,
    },

    /// Manage trusted sources searched preferentially.
    Sources {
        #[command(subcommand)]
        action: SourcesAction,
    },

    /// Manage rules that exclude web results.
    Blacklist {
        #[command(subcommand)]
        action: BlacklistAction,
    },

    /// Report a URL that showed a misleading price.
    Report {
        url: String,

        #[arg(long)]
        reason: Option<String>,
    },

    /// List reported URLs.
    Reports {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show recent price requests.
    Logs {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum EntriesAction {
    /// List the most recent entries.
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Record a price by hand.
    Add {
        item: String,
        /// Price in rupees.
        price: i64,
        #[arg(long)]
        location: Option<String>,
    },
    /// Delete an entry and its embedding.
    Delete { id: String },
    /// Up- or down-vote an entry.
    Vote {
        id: String,
        #[arg(long, conflicts_with = "up")]
        down: bool,
        #[arg(long)]
        up: bool,
    },
}

#[derive(Subcommand)]
enum SourcesAction {
    List,
    /// Add or update a trusted source (keyed by URL).
    Add {
        name: String,
        url: String,
        #[arg(long, default_value = "general")]
        category: String,
        /// CSS selector for the price element on this site's pages.
        #[arg(long)]
        selector: Option<String>,
    },
    Remove { id: String },
}

#[derive(Subcommand)]
enum BlacklistAction {
    List,
    Add {
        pattern: String,
        /// `domain` or `regex`.
        #[arg(long, default_value = "domain")]
        kind: String,
        #[arg(long)]
        description: Option<String>,
    },
    Remove { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fairprice=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Check { query, deep, json } => {
            check_cmd::run_check(&cfg, &query, deep, json).await?;
        }
        Commands::Entries { action } => match action {
            EntriesAction::List { limit } => entries::run_list(&cfg, limit).await?,
            EntriesAction::Add {
                item,
                price,
                location,
            } => entries::run_add(&cfg, &item, price, location.as_deref()).await?,
            EntriesAction::Delete { id } => entries::run_delete(&cfg, &id).await?,
            EntriesAction::Vote { id, down, .. } => entries::run_vote(&cfg, &id, !down).await?,
        },
        Commands::Sources { action } => match action {
            SourcesAction::List => sources::list_sources(&cfg).await?,
            SourcesAction::Add {
                name,
                url,
                category,
                selector,
            } => sources::add_source(&cfg, &name, &url, &category, selector.as_deref()).await?,
            SourcesAction::Remove { id } => sources::remove_source(&cfg, &id).await?,
        },
        Commands::Blacklist { action } => match action {
            BlacklistAction::List => sources::list_rules(&cfg).await?,
            BlacklistAction::Add {
                pattern,
                kind,
                description,
            } => sources::add_rule(&cfg, &pattern, &kind, description.as_deref()).await?,
            BlacklistAction::Remove { id } => sources::remove_rule(&cfg, &id).await?,
        },
        Commands::Report { url, reason } => {
            logs::run_report(&cfg, &url, reason.as_deref()).await?;
        }
        Commands::Reports { limit } => logs::list_reports(&cfg, limit).await?,
        Commands::Logs { limit } => logs::run_logs(&cfg, limit).await?,
        Commands::Serve => server::run_server(&cfg).await?,
    }

    Ok(())
}
