//! # Site Indexer CLI (`sidx`)
//!
//! ## Usage
//!
//! ```bash
//! sidx --config ./config/sidx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sidx init` | Create the SQLite database and run schema migrations |
//! | `sidx domain add <domain>` | Register a domain for crawling |
//! | `sidx domain list` | List registered domains and their crawl status |
//! | `sidx filter add <domain> <type> <value>` | Add an indexing filter |
//! | `sidx subdomains add <domain>` | Treat subdomains of a domain as distinct sites |
//! | `sidx sweep` | Reset stuck crawls, expire unverified registrations |
//! | `sidx schedule` | Run a scheduling cycle and print the plan |
//! | `sidx ingest <domain> --plan <file>` | Index fetched pages read from stdin |
//! | `sidx extract <file> --url <url>` | Extract one saved page |
//! | `sidx get <url>` | Print an indexed record |
//! | `sidx inlinks <domain>` | Print pages on other domains linking in |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use site_indexer::config;
use site_indexer::domains::{self, AddDomainArgs};
use site_indexer::extract_cmd::{self, ExtractArgs};
use site_indexer::progress::ProgressMode;
use site_indexer::{get, ingest, migrate, schedule_cmd};

/// Site Indexer: crawl admission and page extraction for a small-web
/// search index.
#[derive(Parser)]
#[command(name = "sidx", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/sidx.toml")]
    config: PathBuf,

    /// Log filter (e.g. `info`, `site_indexer=debug`). Overrides `RUST_LOG`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Manage registered domains.
    Domain {
        #[command(subcommand)]
        action: DomainAction,
    },

    /// Manage indexing filters.
    Filter {
        #[command(subcommand)]
        action: FilterAction,
    },

    /// Manage domains whose subdomains are distinct sites (e.g. `github.io`).
    Subdomains {
        #[command(subcommand)]
        action: SubdomainsAction,
    },

    /// Reset crawls stuck in RUNNING and disable lapsed unverified domains.
    Sweep,

    /// Run a scheduling cycle: sweep, select, admit. Prints the plan as JSON.
    Schedule {
        /// Print the due batch without sweeping or admitting anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Index one admitted site from fetched pages (JSON lines on stdin).
    Ingest {
        /// Domain to ingest; must be admitted in the plan.
        domain: String,

        /// Plan file written by `sidx schedule`.
        #[arg(long)]
        plan: PathBuf,

        /// Progress output on stderr: `off`, `human`, or `json`.
        /// Defaults to human when stderr is a terminal.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Extract a saved page and print its record as JSON.
    Extract {
        /// Saved page body.
        file: PathBuf,

        /// URL the page was fetched from.
        #[arg(long)]
        url: String,

        /// Owning domain. Derived from the URL when omitted.
        #[arg(long)]
        domain: Option<String>,

        /// Value of the Content-Type header.
        #[arg(long)]
        content_type: Option<String>,

        /// Treat the file as an XML document (feeds, sitemaps).
        #[arg(long)]
        xml: bool,
    },

    /// Print the indexed record for a URL.
    Get { url: String },

    /// Print pages on other indexed domains that link into a domain.
    Inlinks { domain: String },
}

#[derive(Subcommand)]
enum DomainAction {
    /// Register a domain as PENDING, or update an existing registration.
    Add {
        domain: String,
        #[arg(long)]
        home_page: Option<String>,
        #[arg(long)]
        page_limit: Option<u32>,
        #[arg(long)]
        frequency_days: Option<i64>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        indexing_type: Option<String>,
        #[arg(long)]
        verified: bool,
        #[arg(long)]
        verification_required: bool,
        #[arg(long)]
        api_enabled: bool,
        /// Exclude the site's pages from public search.
        #[arg(long)]
        private: bool,
    },
    /// List registered domains.
    List,
}

#[derive(Subcommand)]
enum FilterAction {
    /// Add a filter row. Only `exclude` filters of type `type` affect extraction.
    Add {
        domain: String,
        filter_type: String,
        value: String,
        #[arg(long, default_value = "exclude")]
        action: String,
    },
}

#[derive(Subcommand)]
enum SubdomainsAction {
    Add { domain: String },
}

fn parse_progress(value: Option<&str>) -> anyhow::Result<ProgressMode> {
    match value {
        None => Ok(ProgressMode::default_for_tty()),
        Some("off") => Ok(ProgressMode::Off),
        Some("human") => Ok(ProgressMode::Human),
        Some("json") => Ok(ProgressMode::Json),
        Some(other) => anyhow::bail!(
            "Unknown progress mode: '{}'. Available: off, human, json",
            other
        ),
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(l) => EnvFilter::new(l),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    // Commands that don't require config
    if let Commands::Extract {
        file,
        url,
        domain,
        content_type,
        xml,
    } = &cli.command
    {
        let cfg = config::load_config(&cli.config).ok();
        extract_cmd::run_extract(
            cfg.as_ref(),
            ExtractArgs {
                file,
                url,
                domain: domain.as_deref(),
                content_type: content_type.as_deref(),
                xml: *xml,
            },
        )
        .await?;
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Domain { action } => match action {
            DomainAction::Add {
                domain,
                home_page,
                page_limit,
                frequency_days,
                category,
                indexing_type,
                verified,
                verification_required,
                api_enabled,
                private,
            } => {
                domains::run_domain_add(
                    &cfg,
                    AddDomainArgs {
                        domain,
                        home_page,
                        page_limit,
                        frequency_days,
                        category,
                        indexing_type,
                        owner_verified: verified,
                        verification_required,
                        api_enabled,
                        private,
                    },
                )
                .await?;
            }
            DomainAction::List => {
                domains::run_domain_list(&cfg).await?;
            }
        },
        Commands::Filter { action } => match action {
            FilterAction::Add {
                domain,
                filter_type,
                value,
                action,
            } => {
                domains::run_filter_add(&cfg, &domain, &action, &filter_type, &value).await?;
            }
        },
        Commands::Subdomains { action } => match action {
            SubdomainsAction::Add { domain } => {
                domains::run_subdomains_add(&cfg, &domain).await?;
            }
        },
        Commands::Sweep => {
            schedule_cmd::run_sweep(&cfg).await?;
        }
        Commands::Schedule { dry_run } => {
            schedule_cmd::run_schedule(&cfg, dry_run).await?;
        }
        Commands::Ingest {
            domain,
            plan,
            progress,
        } => {
            let mode = parse_progress(progress.as_deref())?;
            ingest::run_ingest(&cfg, &domain, &plan, mode).await?;
        }
        Commands::Get { url } => {
            get::run_get(&cfg, &url).await?;
        }
        Commands::Inlinks { domain } => {
            get::run_inlinks(&cfg, &domain).await?;
        }
        Commands::Extract { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
