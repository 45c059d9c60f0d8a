//! CLI `doctor` command: run database diagnostics and print a health report.

use anyhow::{Context, Result};

use zandalee_memory::memory::MemoryStore;

pub fn doctor(store: &MemoryStore) -> Result<()> {
    let paths = store.paths();
    let file_size = std::fs::metadata(&paths.db).map(|m| m.len()).unwrap_or(0);

    let report = store.health().context("failed to run health check")?;

    println!("Zandalee Memory Health Report");
    println!("=============================");
    println!();
    println!("Base directory:    {}", paths.root.display());
    println!("Database:          {}", paths.db.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!(
        "Encryption:        {}",
        if store.is_encrypted() { "on" } else { "off (no token set)" }
    );
    println!();
    println!("Row counts:");
    println!("  Memories:        {}", report.memory_count);
    println!("  Rollups:         {}", report.rollup_count);
    println!("  Playbook versions: {}", report.procedural_version_count);
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery steps:");
        println!("  1. Restore mem.db from a backup copy.");
        println!("  2. Or import the newest file from {}:", paths.snapshots_dir.display());
        println!("     zandalee-memory --root NEW_DIR import SNAPSHOT");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
