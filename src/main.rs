use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::env;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use reconflow::engine::PageData;
use reconflow::guidance::{GuidanceService, HttpGuidanceClient, NullGuidance};
use reconflow::sync::{SyncDispatcher, SyncTask};
use reconflow::{
    ingest, HttpSyncTarget, ProjectSeed, ReconEngine, SnapshotVault, SourceKind, SyncError,
};

/// Dispatcher for offline runs: logs the push instead of sending it.
struct LoggingDispatcher;

#[async_trait]
impl SyncDispatcher for LoggingDispatcher {
    async fn dispatch(&self, task: &SyncTask) -> Result<(), SyncError> {
        debug!(target_id = %task.target_id, "sync (offline mode, not sent)");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    let csv_path = args.get(1).map(|p| p.as_str());

    let dispatcher: Arc<dyn SyncDispatcher> = match env::var("RECONFLOW_SYNC_URL") {
        Ok(url) => Arc::new(HttpSyncTarget::new(&url)),
        Err(_) => Arc::new(LoggingDispatcher),
    };
    let guidance: Arc<dyn GuidanceService> = match env::var("RECONFLOW_GUIDANCE_URL") {
        Ok(url) => Arc::new(HttpGuidanceClient::new(&url)),
        Err(_) => Arc::new(NullGuidance),
    };
    let vault = SnapshotVault::new(reconflow::SqliteStore::open("reconflow.db", None)?);

    let mut engine = ReconEngine::new(dispatcher, guidance, vault);
    engine.start_sync_worker();

    println!("📊 ReconFlow - Cross-Stage Reconciliation Pipeline");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Create a project
    let project = engine.create_project(ProjectSeed::named("Demo Reconciliation"));
    println!("\n📁 Project: {} ({})", project.name, project.id);

    // 2. Ingest
    println!("\n📥 Ingesting records...");
    let records = match csv_path {
        Some(path) => ingest::load_csv(Path::new(path), SourceKind::Expenses)
            .with_context(|| format!("Failed to ingest {}", path))?,
        None => sample_records(),
    };
    let ingestion = ingest::assemble(records, Utc::now());
    println!(
        "✓ {} records, quality {:.0}%",
        ingestion.records.len(),
        ingestion.quality.overall() * 100.0
    );
    engine.update_cross_page_data(&project.id, PageData::Ingestion(ingestion))?;

    // 3. Reconcile
    println!("\n🔍 Reconciling...");
    let reconciled = engine.reconcile(&project.id)?;
    let metrics = &reconciled.reconciliation.metrics;
    println!(
        "✓ {} records, avg confidence {:.1}%, match rate {:.1}%",
        metrics.total_records, metrics.average_confidence, metrics.match_rate
    );

    // 4. Analyze cashflow
    println!("\n💰 Analyzing cashflow...");
    let analyzed = engine.analyze(&project.id)?;
    let cashflow = &analyzed.cashflow;
    println!(
        "✓ {} categories, total reported {:.0}, discrepancy {:.0}",
        cashflow.categories.len(),
        cashflow.metrics.total_reported,
        cashflow.metrics.total_discrepancy
    );
    for category in &cashflow.categories {
        println!(
            "   • {}: reported {:.0}, cashflow {:.0}",
            category.name, category.total_reported, category.total_cashflow
        );
    }
    if !cashflow.discrepancies.is_empty() {
        println!("⚠️  {} discrepancies flagged for review", cashflow.discrepancies.len());
    }

    // 5. Flush pending syncs and shut down
    println!("\n🔄 Flushing sync queue...");
    engine.flush_sync().await;

    let notices = engine.notifications();
    let unread = notices.lock().map(|c| c.unread_count()).unwrap_or(0);
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("🎉 Pipeline complete ({} notifications)", unread);

    engine.shutdown().await;
    Ok(())
}

fn sample_records() -> Vec<reconflow::IngestionRecord> {
    let rows = vec![
        json!({"description": "Biaya operasional lapangan", "amount": 2_500_000}),
        json!({"description": "Deposit lelang proyek", "amount": 15_000_000}),
        json!({"description": "Pulsa dan e-money tim", "amount": 350_000}),
        json!({"description": "Keperluan keluarga", "amount": 1_200_000}),
        json!({"description": "Lain-lain"}),
    ];
    rows.into_iter()
        .map(|row| ingest::ingest_row(row, "sample", SourceKind::Expenses, Utc::now()))
        .collect()
}
