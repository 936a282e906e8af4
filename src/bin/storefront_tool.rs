use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storefront_core::live_list::pagination::{clamp_page, total_pages};
use storefront_core::store::generate_id;
use storefront_core::{
    Collection, CounterService, Document, DocumentStore, LifecycleEvent, MemoryDocumentStore,
    MemorySearchIndex, StorefrontConfig,
};

#[derive(Parser)]
#[command(name = "storefront-tool")]
#[command(about = "Developer tooling for storefront counters and pagination")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Applies a JSON array of lifecycle events to an empty in-memory store
    /// and prints the resulting aggregate counts.
    Replay {
        #[arg(long)]
        events: PathBuf,
    },
    /// Prints the page actually shown and the page count.
    Paginate {
        #[arg(long)]
        total: u64,
        #[arg(long)]
        per_page: usize,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Replay { events } => replay(&events).await,
        Command::Paginate {
            total,
            per_page,
            page,
        } => {
            if per_page == 0 {
                bail!("--per-page must be greater than zero");
            }
            let pages = total_pages(total, per_page);
            let shown = clamp_page(page, pages);
            println!("{}", json!({ "page": shown, "totalPages": pages }));
            Ok(())
        }
    }
}

fn load_events(path: &Path) -> Result<Vec<LifecycleEvent>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read events file '{}'", path.display()))?;
    let mut events: Vec<LifecycleEvent> = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid lifecycle events in '{}'", path.display()))?;

    for event in &mut events {
        if let LifecycleEvent::Created { document, .. } = event {
            if document.id.is_empty() {
                *document = Document::new(generate_id(), document.created_at, document.data.clone());
            }
        }
    }
    Ok(events)
}

async fn replay(path: &Path) -> Result<()> {
    let config = StorefrontConfig::new();
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    let events = load_events(path)?;
    let store = MemoryDocumentStore::shared();
    let mut feed = store.lifecycle_events().await?;
    let counters = CounterService::new(
        Arc::clone(&store),
        Arc::new(MemorySearchIndex::new()),
        config.counter_retry,
    );

    for (position, event) in events.into_iter().enumerate() {
        let applied = match event {
            LifecycleEvent::Created {
                collection,
                document,
            } => store.insert(collection, document).await,
            LifecycleEvent::Updated {
                collection, after, ..
            } => store.update(collection, after).await,
            LifecycleEvent::Deleted {
                collection,
                document,
            } => store.delete(collection, &document.id).await,
        };
        applied.with_context(|| format!("Event #{} could not be applied", position + 1))?;
        counters.process_pending(&mut feed).await?;
    }

    let mut report = Map::new();
    for collection in Collection::ALL {
        let counts = counters.counts(collection).await?;
        report.insert(collection.name().to_string(), serde_json::to_value(counts)?);
    }
    println!("{}", serde_json::to_string_pretty(&Value::Object(report))?);
    Ok(())
}
