use anyhow::Result;
use std::path::Path;

use zandalee_memory::memory::MemoryStore;

pub fn snapshot(store: &MemoryStore) -> Result<()> {
    let path = store.snapshot()?;
    println!("snapshot: {}", path.display());
    Ok(())
}

/// Import a snapshot file. Ids in the file are not preserved.
pub fn import(store: &MemoryStore, path: &Path) -> Result<()> {
    let inserted = store.import_snapshot(path)?;
    println!("imported: {inserted}");
    Ok(())
}
