use anyhow::Result;

use zandalee_memory::diary::Diary;

pub fn add(diary: &Diary, entry: &str) -> Result<()> {
    diary.append(entry)?;
    println!("ok");
    Ok(())
}

/// Print the last `last` entries (`0` for all).
pub fn read(diary: &Diary, last: usize) -> Result<()> {
    for line in diary.read(last)? {
        println!("{line}");
    }
    Ok(())
}
