pub mod core;
pub mod diary;
pub mod doctor;
pub mod inspect;
pub mod learn;
pub mod procedural;
pub mod search;
pub mod snapshot;
pub mod stats;

use anyhow::Result;

use zandalee_memory::memory::MemoryStore;

/// Split a comma list, trimming entries and dropping blanks.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Pin or unpin a memory, printing `ok` or `not found`.
pub fn set_pinned(store: &MemoryStore, id: i64, pinned: bool) -> Result<()> {
    let found = if pinned { store.pin(id)? } else { store.unpin(id)? };
    println!("{}", if found { "ok" } else { "not found" });
    Ok(())
}

/// Hard-delete a memory.
pub fn forget(store: &MemoryStore, id: i64) -> Result<()> {
    println!("{}", if store.delete(id)? { "ok" } else { "not found" });
    Ok(())
}
