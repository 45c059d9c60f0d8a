use anyhow::Result;

use zandalee_memory::memory::types::{MemoryKind, NewMemory, Salience};
use zandalee_memory::memory::MemoryStore;

/// Flags accepted by `learn`, already parsed.
pub struct LearnArgs {
    pub text: String,
    pub kind: MemoryKind,
    pub tags: Vec<String>,
    pub salience: Salience,
    pub pinned: bool,
}

/// Store a memory and print its id.
pub fn learn(store: &MemoryStore, args: LearnArgs) -> Result<()> {
    let memory = NewMemory::new(args.text)
        .kind(args.kind)
        .tags(args.tags)
        .salience(args.salience)
        .provenance(serde_json::json!({"kind": "system"}))
        .pinned(args.pinned);

    let id = store.remember(&memory)?;
    println!("id: {id}");
    Ok(())
}
