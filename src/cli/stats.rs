use anyhow::Result;

use zandalee_memory::memory::MemoryStore;

/// Print store statistics as pretty JSON.
pub fn stats(store: &MemoryStore) -> Result<()> {
    let response = store.stats()?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
