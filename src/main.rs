//! Command line front end: store nested JSON documents as nested-set trees and read them back
//! as of any instant.
//!
//! Settings come from `canopy.json` (or the file given with `--config`) and
//! `CANOPY_*` environment variables; logging is controlled by `RUST_LOG`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use canopy::construct::Node;
use canopy::engine::Engine;
use canopy::error::{CanopyError, Result};
use canopy::render;
use canopy::server;
use canopy::settings::Settings;
use canopy::validate;

#[derive(Parser)]
#[command(name = "canopy")]
#[command(about = "Nested-set trees with bitemporal leaf values")]
struct Cli {
    /// Settings file, with or without extension
    #[arg(short, long, default_value = "canopy")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Insert a JSON document as a new tree
    Insert {
        tree_type: String,
        file: PathBuf,
        /// Instant the leaf values become valid (defaults to the configured instant)
        #[arg(long)]
        at: Option<i64>,
    },
    /// Print a tree as JSON, or the flat rows as an HTML table
    Get {
        tree_type: String,
        #[arg(long)]
        as_of: Option<i64>,
        #[arg(long)]
        html: bool,
    },
    /// Check the stored intervals of a tree
    Verify { tree_type: String },
    /// Serve trees over HTTP
    Serve,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(&cli.config)?;
    let mut engine = Engine::from_settings(&settings)?;
    match cli.command {
        Command::Insert { tree_type, file, at } => {
            let tree_type = validate::parse_id(&tree_type, "tree_type_id")?;
            let text = std::fs::read_to_string(&file).map_err(|e| {
                CanopyError::Validation(format!("cannot read {}: {}", file.display(), e))
            })?;
            let document: serde_json::Value = serde_json::from_str(&text)?;
            let valid_from = at.unwrap_or(engine.query_instant());
            let inserted = engine.insert_tree_at(tree_type, &Node::from_json(&document), valid_from)?;
            info!(tree_type, inserted, "inserted {}", file.display());
        }
        Command::Get { tree_type, as_of, html } => {
            let tree_type = validate::parse_id(&tree_type, "tree_type_id")?;
            let snapshot = engine.get_tree_as_of(tree_type, as_of.unwrap_or(engine.query_instant()))?;
            if html {
                println!("{}", render::rows_to_table(&snapshot.rows));
            } else {
                println!("{}", serde_json::to_string_pretty(&snapshot.tree)?);
            }
        }
        Command::Verify { tree_type } => {
            let tree_type = validate::parse_id(&tree_type, "tree_type_id")?;
            engine.verify(tree_type)?;
            let (nodes, values) = engine.row_counts(tree_type)?;
            println!("tree type {}: {} nodes, {} values, consistent", tree_type, nodes, values);
        }
        Command::Serve => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|e| CanopyError::Config(e.to_string()))?;
            let shared = Arc::new(Mutex::new(engine));
            runtime.block_on(server::serve(shared, &settings.listen))?;
        }
    }
    Ok(())
}
