use anyhow::Result;
use serde_json::Value;

use zandalee_memory::core_memory::{CoreMemoryFile, CoreSection};

pub fn show(file: &CoreMemoryFile) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&file.load()?)?);
    Ok(())
}

pub fn add(file: &CoreMemoryFile, section: CoreSection, entry: &str) -> Result<()> {
    file.append(section, entry)?;
    println!("ok");
    Ok(())
}

/// `value` is stored as JSON when it parses, otherwise as a string.
pub fn set_family(file: &CoreMemoryFile, key: &str, value: &str) -> Result<()> {
    file.set_family(key, family_value(value))?;
    println!("ok");
    Ok(())
}

fn family_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
