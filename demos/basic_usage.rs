// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic revision-store usage example.
//!
//! Demonstrates:
//! 1. Opening a database and writing documents
//! 2. Updating against the current revision (and what a conflict looks like)
//! 3. Deleting and reading back the tombstone
//! 4. Following the change feed
//! 5. Displaying metrics (OTEL-compatible)
//! 6. Destroying the database
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde_json::json;

use rev_store::{ChangesOptions, Database, GetOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install metrics recorder (captures all metrics for OTEL export)
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    // Simple logging (no filter for simplicity)
    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           rev-store: Basic Usage Example                      ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Open a database and write some documents
    // ─────────────────────────────────────────────────────────────────────────
    println!("📦 Opening database 'demo'...");
    let db = Database::open("demo")?;
    println!("   └─ instance_id: {}", db.id());

    let entries = vec![
        ("user.alice", json!({"name": "Alice", "role": "admin"})),
        ("user.bob", json!({"name": "Bob", "role": "user"})),
        ("user.carol", json!({"name": "Carol", "role": "user"})),
        ("config.app", json!({"theme": "dark", "version": "2.0"})),
        ("stats.daily", json!({"requests": 42000, "latency_p99": 12})),
    ];

    println!("\n📝 Writing {} documents (timing each .await)...", entries.len());
    let mut first_revs = Vec::new();
    for (id, data) in &entries {
        let mut doc = data.clone();
        doc["_id"] = json!(id);
        let start = std::time::Instant::now();
        let written = db.put(&doc).await?;
        println!("   └─ {} → rev {} ({:?})", id, written.rev, start.elapsed());
        first_revs.push(written.rev);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Update with the current revision; show what a stale write gets
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n✏️  Updating user.alice against its current revision...");
    let updated = db
        .put(&json!({
            "_id": "user.alice",
            "_rev": first_revs[0],
            "name": "Alice",
            "role": "owner",
        }))
        .await?;
    println!("   └─ user.alice → rev {}", updated.rev);

    println!("\n⚔️  Re-submitting the stale revision (optimistic concurrency)...");
    let stale = db
        .put(&json!({
            "_id": "user.alice",
            "_rev": first_revs[0],
            "name": "Alice",
            "role": "intruder",
        }))
        .await;
    match stale {
        Err(err) => {
            let body = err.body();
            println!(
                "   └─ rejected: status={} error={} reason={:?}",
                body.status, body.error, body.reason
            );
        }
        Ok(_) => unreachable!("stale writes must conflict"),
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Delete one and read the tombstone back
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🪦 Deleting user.bob and reading the tombstone...");
    let bob = db.get("user.bob").await?;
    let removed = db.remove(&bob).await?;
    println!("   └─ tombstone rev: {}", removed.rev);

    let stub = db
        .get_with("user.bob", &GetOptions::default().with_rev(&removed.rev))
        .await?;
    println!("   └─ explicit read: {}", stub);
    println!("   └─ winner read:   {:?}", db.get("user.bob").await.err().map(|e| e.reason()));

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Walk the change feed
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📡 Replaying the change feed from the beginning...");
    let mut feed = db.changes(&ChangesOptions::default())?;
    while let Some(event) = feed.next().await {
        let marker = if event.deleted { "✗" } else { "✓" };
        println!("   └─ seq {:>2} {} {} @ {}", event.seq, marker, event.id, event.rev);
    }

    let info = db.info().await?;
    println!("\n📊 Database info:");
    println!("   └─ doc_count:  {}", info.doc_count);
    println!("   └─ update_seq: {}", info.update_seq);

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Dump raw metrics (OTEL-compatible)
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Raw Metrics (OTEL export format):");
    dump_metrics(&snapshotter);

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Destroy the database
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🛑 Destroying database 'demo'...");
    Database::destroy("demo").await?;
    println!("   └─ all handles invalidated, state dropped");

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Dump all captured metrics, grouped by kind.
fn dump_metrics(snapshotter: &Snapshotter) {
    let snapshot = snapshotter.snapshot();
    let mut lines = Vec::new();

    for (composite_key, _, _, value) in snapshot.into_vec() {
        let (_kind, key) = composite_key.into_parts();
        let labels: Vec<_> = key
            .labels()
            .map(|l| format!("{}={}", l.key(), l.value()))
            .collect();
        let label_str = if labels.is_empty() {
            String::new()
        } else {
            format!("{{{}}}", labels.join(","))
        };

        let rendered = match value {
            DebugValue::Counter(v) => format!("counter    {}{} = {}", key.name(), label_str, v),
            DebugValue::Gauge(v) => {
                format!("gauge      {}{} = {}", key.name(), label_str, v.into_inner())
            }
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                format!(
                    "histogram  {}{} = count {}, sum {:.6}s",
                    key.name(),
                    label_str,
                    count,
                    sum
                )
            }
        };
        lines.push(rendered);
    }

    lines.sort();
    for line in lines {
        println!("   └─ {}", line);
    }
}
