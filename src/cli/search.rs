use anyhow::Result;

use zandalee_memory::memory::types::{Memory, RecallQuery};
use zandalee_memory::memory::MemoryStore;

/// Recall memories and print one line per hit.
pub fn search(store: &MemoryStore, query: RecallQuery) -> Result<()> {
    for memory in store.recall(&query)? {
        println!("{}", format_hit(&memory));
    }
    Ok(())
}

/// `[YYYY-MM-DD HH:MM:SS] #id (kind) tag/tag :: content`
pub fn format_hit(memory: &Memory) -> String {
    let ts: String = memory.created_at.chars().take(19).collect::<String>().replace('T', " ");
    format!(
        "[{ts}] #{} ({}) {} :: {}",
        memory.id,
        memory.kind,
        memory.tags.join("/"),
        memory.content
    )
}
