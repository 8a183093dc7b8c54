//! This example collects facts for a handful of public Docker Hub images and prints the
//! resulting `facts.json` document.
//!
//! The example will:
//! 1. Create a collection engine with best-effort fallback
//! 2. Collect facts for three well-known images
//! 3. Write the bundle artifacts into a temporary directory and print them
//!
//! To run the example:
//! ```bash
//! cargo run --example collect_facts
//! ```

use std::sync::Arc;

use imagefacts::{
    bundle::{BundleCollector, DirectoryWriter, FACTS_FILENAME, STATS_FILENAME},
    collect::{CollectorEngine, FallbackMode},
    config::CollectionConfig,
};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let temp_dir = tempdir()?;
    println!("\nWriting artifacts to: {}", temp_dir.path().display());

    let config = CollectionConfig::builder()
        .fallback_mode(FallbackMode::BestEffort)
        .build();
    let engine = CollectorEngine::new(config)?;
    let collector = BundleCollector::new(engine, Arc::new(DirectoryWriter::new(temp_dir.path())));

    let references = vec![
        "alpine:latest".to_string(),
        "nginx:latest".to_string(),
        "busybox:latest".to_string(),
    ];

    println!("\nCollecting facts for {} images...", references.len());
    let result = collector
        .collect_references(&references, &CancellationToken::new())
        .await?;

    println!(
        "\nCollected {} of {} images in {:?}",
        result.statistics.successful_images,
        result.statistics.total_images,
        result.duration,
    );

    println!("\n{}:", FACTS_FILENAME);
    println!("{}", std::fs::read_to_string(temp_dir.path().join(FACTS_FILENAME))?);

    println!("\n{}:", STATS_FILENAME);
    println!("{}", std::fs::read_to_string(temp_dir.path().join(STATS_FILENAME))?);

    Ok(())
}
