// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic tree-sync usage example.
//!
//! Demonstrates:
//! 1. Opening a SQLite-backed engine and loading the tree
//! 2. Building a small folder/file tree
//! 3. Listing, searching and path queries
//! 4. A write from "another process" picked up by polling
//! 5. Move and cascade delete
//! 6. Displaying captured metrics
//! 7. Clean shutdown
//!
//! # Run
//!
//! ```bash
//! RUST_LOG=tree_sync=debug cargo run --example basic_usage
//! ```

use std::sync::Arc;

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use tracing_subscriber::EnvFilter;
use tree_sync::{FileNode, FolderNode, Node, NodeStore, SqlNodeStore, TreeSyncConfig, TreeSyncEngine};
use uuid::Uuid;

const DB_PATH: &str = "./tree_sync_demo.db";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tree_sync=info")))
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║             tree-sync: Basic Usage Example                    ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Open the store, seed a root, start the engine
    // ─────────────────────────────────────────────────────────────────────────
    let url = format!("sqlite://{}?mode=rwc", DB_PATH);
    let store = Arc::new(SqlNodeStore::connect(&url).await?);
    if store.count_nodes().await? == 0 {
        store.insert_folder(&FolderNode::root(Uuid::new_v4(), "C:")).await?;
        println!("🌱 Seeded root folder C:");
    }

    let config = TreeSyncConfig {
        change_poll_interval_ms: 200,
        ..TreeSyncConfig::new(url.clone())
    };
    let engine = TreeSyncEngine::new(config, store.clone());
    engine.start().await?;
    println!("✅ Engine {} with {} nodes", engine.state(), engine.node_count());

    let root = engine.root_id().ok_or("store has no root folder")?;

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Build a tree
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📁 Building C:\\Users ...");
    let users = engine.add_subfolder("Users", root).await?;
    let public = engine.add_subfolder("Public", users).await?;
    let ryan = engine.add_subfolder("Ryan", users).await?;
    let docs = engine.add_subfolder("Documents", ryan).await?;
    let record = engine.add_file("record20220315.docx", b"minutes".to_vec(), docs).await?;
    engine.add_file("some_note.3.txt", b"three".to_vec(), public).await?;
    engine.add_file(".bash_history", b"ls -la".to_vec(), ryan).await?;

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Queries
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔍 Queries:");
    println!("   ├─ Path of record: {}", engine.full_path(record).await?);
    for child in engine.list_children(ryan).await? {
        let kind = if child.is_folder() { "folder" } else { "file" };
        println!("   ├─ Ryan/{} ({})", child.full_name(), kind);
    }
    let threes = engine.search_files(root, |f| f.full_name().contains('3')).await?;
    for file in &threes {
        println!("   └─ Match for '3': {}", engine.full_path(file.id).await?);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Another writer on the same database
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔄 External write through a second connection...");
    let other = SqlNodeStore::connect(&url).await?;
    let shared = FileNode::new("shared.txt", b"from elsewhere".to_vec(), public);
    other.insert_file(&shared).await?;
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    match engine.get_node(shared.id).await? {
        Some(Node::File(file)) => println!("   └─ Picked up {} at version {}", file.full_name(), engine.change_version()),
        _ => println!("   └─ Not picked up yet (poll interval not elapsed)"),
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Move and delete
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🚚 Moving Ryan under Public...");
    engine.move_node(ryan, public).await?;
    println!("   └─ {}", engine.full_path(record).await?);

    println!("\n🗑️  Deleting Users...");
    engine.delete_folder(users).await?;
    println!("   └─ Nodes left: {}", engine.node_count());

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Metrics:");
    dump_metrics(&snapshotter);

    // ─────────────────────────────────────────────────────────────────────────
    // 7. Shutdown
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🛑 Shutting down...");
    engine.shutdown().await;
    println!("   ✅ State: {}", engine.state());

    for suffix in ["", "-shm", "-wal"] {
        let _ = std::fs::remove_file(format!("{DB_PATH}{suffix}"));
    }
    Ok(())
}

fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines: Vec<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, value)| {
            let (_, key) = composite_key.into_parts();
            let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
            let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };
            let rendered = match value {
                DebugValue::Counter(v) => v.to_string(),
                DebugValue::Gauge(v) => v.into_inner().to_string(),
                DebugValue::Histogram(samples) => format!("{} samples", samples.len()),
            };
            format!("{}{} = {}", key.name(), label_str, rendered)
        })
        .collect();
    lines.sort();
    for line in lines {
        println!("   └─ {line}");
    }
}
