// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use anyhow::{bail, Context, Result};
use knowledge_store::storage::FileStorage;
use knowledge_store::store::persistence::read_manifest;
use knowledge_store::{KnowledgeStore, StoreConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "knowledge_store=info,kg_inspect=info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(dir), Some(snapshot)) = (args.next(), args.next()) else {
        bail!("usage: kg-inspect <storage-dir> <snapshot-path>");
    };

    let storage = FileStorage::new(&dir);
    let manifest = read_manifest(&storage, &snapshot)
        .await
        .with_context(|| format!("reading manifest of {} in {}", snapshot, dir))?;
    info!(
        "Snapshot v{} from {}: {} objects, dimension {}",
        manifest.version, manifest.created_at, manifest.object_count, manifest.dimension
    );

    // The snapshot dictates the dimension; everything else comes from the environment
    let config = StoreConfig {
        dimension: manifest.dimension,
        ..StoreConfig::from_env()
    };
    let store = KnowledgeStore::load(&storage, &snapshot, config)
        .await
        .context("loading snapshot")?;

    let stats = store.stats().await;
    for (name, counts) in &stats.collections {
        let graph = store.index_stats(name).await?;
        info!(
            "{:<10} active={} superseded={} archived={} indexed={} edges={} layers={}",
            name,
            counts.active,
            counts.superseded,
            counts.archived,
            counts.indexed,
            graph.total_edges,
            graph.max_layer + 1
        );
    }
    info!(
        "{} objects, {} reference edges",
        stats.total_objects, stats.reference_edges
    );

    Ok(())
}
