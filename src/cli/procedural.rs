//! CLI `rollup` and `proc` commands.

use anyhow::Result;

use zandalee_memory::memory::MemoryStore;

/// Build or refresh the monthly rollup.
pub fn rollup(store: &MemoryStore, period: Option<&str>) -> Result<()> {
    let outcome = store.rollup_month(period)?;
    let rollup_id = outcome
        .rollup_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "None".to_string());
    println!("sources: {}, rollup_id: {rollup_id}", outcome.source_count);
    Ok(())
}

/// Record a new playbook version. `steps` and `sources` are JSON arrays.
///
/// Malformed JSON is reported on stdout and is not an error exit.
pub fn upsert(
    store: &MemoryStore,
    subject_tag: &str,
    steps: &str,
    notes: &str,
    sources: &str,
) -> Result<()> {
    let parsed = serde_json::from_str::<Vec<String>>(steps)
        .and_then(|steps| Ok((steps, serde_json::from_str::<Vec<i64>>(sources)?)));
    let (steps, sources) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => {
            println!("Invalid JSON for steps/sources: {e}");
            return Ok(());
        }
    };

    let notes = Some(notes).filter(|n| !n.is_empty());
    let outcome = store.upsert_procedural(subject_tag, &steps, notes, &sources)?;
    println!("{}", serde_json::to_string(&outcome)?);
    Ok(())
}

/// Print every stored version of a playbook.
pub fn history(store: &MemoryStore, subject_tag: &str) -> Result<()> {
    let versions = store.procedural_history(subject_tag)?;
    if versions.is_empty() {
        println!("No versions for '{subject_tag}'.");
        return Ok(());
    }
    for version in versions {
        println!("v{} ({})", version.version, version.created_at);
        for (i, step) in version.steps.iter().enumerate() {
            println!("  {}. {}", i + 1, step);
        }
        if !version.notes.is_empty() {
            println!("  notes: {}", version.notes);
        }
    }
    Ok(())
}
