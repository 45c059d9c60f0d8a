//! CLI `show` command: display full details for a single memory.

use anyhow::Result;

use zandalee_memory::memory::MemoryStore;

pub fn show(store: &MemoryStore, id: i64) -> Result<()> {
    let Some(m) = store.get(id)? else {
        println!("not found");
        return Ok(());
    };

    println!("Memory: {}", m.id);
    println!("{}", "=".repeat(50));
    println!("  Kind:           {}", m.kind);
    println!("  Tags:           {}", m.tags.join(", "));
    println!("  Salience:       {:.3}", m.salience.score());
    if let Some(confidence) = m.salience.confidence {
        println!("  Confidence:     {confidence:.2}");
    }
    println!("  Pinned:         {}", if m.pinned { "yes" } else { "no" });
    println!("  Created:        {}", m.created_at);
    println!("  Updated:        {}", m.updated_at);
    println!("  Provenance:     {}", m.provenance);
    println!();
    println!("Content:");
    println!("  {}", m.content);

    Ok(())
}
