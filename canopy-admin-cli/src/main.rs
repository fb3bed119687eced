//! Canopy Administration CLI

mod config;

use anyhow::{bail, Result};
use canopy_core::{Acl, Principal, Privilege, Resource, ResourcePath};
use canopy_store::{DiskContentStore, ResourceTreeStore};
use clap::{Parser, Subcommand};
use config::CanopyConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "canopy-admin")]
#[command(author = "Canopy Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Canopy resource store administration tool")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "canopy.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the schema and the root collection
    Init {
        /// Owner of the root collection
        #[arg(short, long, default_value = "root")]
        owner: String,
    },

    /// List a resource and everything below it
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },

    /// Delete expired locks
    SweepLocks,

    /// Change log access
    Changelog {
        #[command(subcommand)]
        command: ChangelogCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ChangelogCommands {
    /// Print entries after an id, oldest first
    Tail {
        #[arg(short, long, default_value_t = 0)]
        after: i64,
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
        /// One JSON object per line
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(debug: bool) {
    let env_filter = if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

async fn open(config: &CanopyConfig) -> Result<ResourceTreeStore> {
    let content = Arc::new(DiskContentStore::new(&config.content.root));
    Ok(ResourceTreeStore::open(&config.database, content).await?)
}

fn root_acl(owner: &Principal) -> Acl {
    let mut acl = Acl::new();
    acl.add_entry(Privilege::All, owner.clone());
    acl.add_entry(Privilege::Read, Principal::all());
    acl
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config = CanopyConfig::load(&cli.config)?;
    let store = open(&config).await?;

    match cli.command {
        Commands::Init { owner } => {
            let root = ResourcePath::root();
            if store.load(&root).await?.is_some() {
                println!("Root collection already exists");
                return Ok(());
            }
            let owner = Principal::user(owner);
            let resource = Resource::new(root, true, owner.clone()).with_acl(root_acl(&owner));
            let id = store.store(&resource).await?;
            info!("Created root collection (id {}) owned by {}", id, owner.name());
            println!("Store initialized at {}", config.database.url);
        }

        Commands::Ls { path } => {
            let path = ResourcePath::parse(&path)?;
            let paths = store.list_sub_tree(&path).await?;
            if paths.is_empty() {
                bail!("no resource at {}", path);
            }
            for p in paths {
                println!("{}", p);
            }
        }

        Commands::SweepLocks => {
            let removed = store.delete_expired_locks().await?;
            println!("Removed {} expired locks", removed);
        }

        Commands::Changelog { command: ChangelogCommands::Tail { after, limit, json } } => {
            for entry in store.read_change_log(after, limit).await? {
                if json {
                    println!("{}", serde_json::to_string(&entry)?);
                } else {
                    println!(
                        "{}\t{}\t{}/{}\t{}\t{}",
                        entry.id,
                        entry.timestamp.to_rfc3339(),
                        entry.logger_id,
                        entry.logger_type,
                        entry.operation,
                        entry.path
                    );
                }
            }
        }
    }

    Ok(())
}
